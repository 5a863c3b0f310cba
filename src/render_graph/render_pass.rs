//! Pass descriptors.

use glam::{Mat3, Vec2};

use super::graph::PassId;
use crate::backend::Blend;
use crate::pipeline::{PingPongPair, TargetKey};
use crate::shader::ProgramKey;

/// A rectangle in normalized device coordinates.
///
/// `(x, y)` is the center, `(w, h)` the half extents, so `full()` covers the screen
/// with `x = y = 0`, `w = h = 1`. The rotation (radians, counter-clockwise) turns the
/// quad about its center without turning its texture coordinates, which is how the blur
/// passes change direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub rotation: f32,
}

impl Default for ScreenRect {
    fn default() -> Self {
        Self::full()
    }
}

impl ScreenRect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            rotation: 0.0,
        }
    }

    /// The whole output.
    pub const fn full() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    pub fn rotated(mut self, radians: f32) -> Self {
        self.rotation = radians;
        self
    }

    /// `translate * scale * rotate`, applied to the unit quad corners.
    pub fn matrix(&self) -> Mat3 {
        Mat3::from_translation(Vec2::new(self.x, self.y))
            * Mat3::from_scale(Vec2::new(self.w, self.h))
            * Mat3::from_angle(self.rotation)
    }

    /// True when the NDC point lies inside the unrotated rectangle.
    pub fn contains(&self, ndc: Vec2) -> bool {
        (ndc.x - self.x).abs() <= self.w && (ndc.y - self.y).abs() <= self.h
    }
}

/// What a pass draws besides its optional screen quad.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawMode {
    /// Every mesh in the scene through the main camera.
    FullScene,
    /// The scene's active light(s). With `light_space`, the shadow matrix for the
    /// current light camera is uploaded instead.
    LightsOnly { light_space: bool },
    /// Only the screen quad, if any. Without a quad the pass just clears its target.
    NoGeometry,
    /// Every mesh through the current light camera.
    CustomCamera,
    /// The HUD's quads.
    Hud,
}

impl DrawMode {
    pub fn draws_meshes(self) -> bool {
        matches!(self, DrawMode::FullScene | DrawMode::CustomCamera)
    }
}

/// Depth-test state change applied before a pass. `NoChange` inherits the previous pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DepthTestSwitch {
    #[default]
    NoChange,
    Enable,
    Disable,
}

/// Which half of a ping-pong pair, relative to the counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// `counter % 2`.
    Current,
    /// `(counter + 1) % 2`.
    Other,
}

impl Side {
    /// Index into the pair for a counter value.
    pub fn index(self, counter: u64) -> usize {
        match self {
            Side::Current => (counter % 2) as usize,
            Side::Other => ((counter + 1) % 2) as usize,
        }
    }
}

/// The counter a ping-pong reference follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Index of the light being accumulated.
    Light,
    /// Frames drawn so far.
    Frame,
}

/// A target a pass writes or samples, resolved at execution time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetRef {
    Screen,
    Fixed(TargetKey),
    PingPong {
        pair: PingPongPair,
        side: Side,
        counter: Counter,
    },
}

impl TargetRef {
    pub const fn ping_pong(pair: PingPongPair, side: Side, counter: Counter) -> Self {
        TargetRef::PingPong {
            pair,
            side,
            counter,
        }
    }

    /// The target key for the given counter values.
    pub fn key(self, light_counter: u64, frame_counter: u64) -> Option<TargetKey> {
        match self {
            TargetRef::Screen => None,
            TargetRef::Fixed(key) => Some(key),
            TargetRef::PingPong {
                pair,
                side,
                counter,
            } => {
                let n = match counter {
                    Counter::Light => light_counter,
                    Counter::Frame => frame_counter,
                };
                Some(pair.keys()[side.index(n)])
            }
        }
    }

    /// True when both references always resolve to the same target.
    pub fn aliases(self, other: TargetRef) -> bool {
        match (self, other) {
            (TargetRef::Fixed(a), TargetRef::Fixed(b)) => a == b,
            (TargetRef::Fixed(key), pp @ TargetRef::PingPong { .. })
            | (pp @ TargetRef::PingPong { .. }, TargetRef::Fixed(key)) => {
                pp.key(0, 0) == Some(key) && pp.key(1, 1) == Some(key)
            }
            (a @ TargetRef::PingPong { .. }, b @ TargetRef::PingPong { .. }) => {
                a.key(0, 0) == b.key(0, 0) && a.key(1, 1) == b.key(1, 1)
            }
            _ => false,
        }
    }
}

/// Constant textures bound where a tier has no real input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Full visibility: no shadow, no occlusion.
    White,
    Black,
    /// Random rotations for ambient occlusion.
    Random,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSource {
    /// First attachment of a target.
    Target(TargetRef),
    Placeholder(Placeholder),
}

/// A texture bound to a unit for one pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureInput {
    pub source: TextureSource,
    pub unit: u32,
}

/// One stage of a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPass {
    pub label: &'static str,
    pub program: Option<ProgramKey>,
    pub target: Option<TargetRef>,
    pub draw_mode: DrawMode,
    pub depth_test: DepthTestSwitch,
    pub inputs: Vec<TextureInput>,
    pub dependencies: Vec<PassId>,
    /// Draws one quad covering this rectangle after the mode's own draws.
    pub screen_rect: Option<ScreenRect>,
    /// Clear color. `None` draws over the previous contents.
    pub clear: Option<[f32; 4]>,
    pub blend: Blend,
}

impl RenderPass {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            program: None,
            target: None,
            draw_mode: DrawMode::NoGeometry,
            depth_test: DepthTestSwitch::NoChange,
            inputs: Vec::new(),
            dependencies: Vec::new(),
            screen_rect: None,
            clear: None,
            blend: Blend::Replace,
        }
    }

    pub fn program(mut self, program: ProgramKey) -> Self {
        self.program = Some(program);
        self
    }

    pub fn target(mut self, target: TargetRef) -> Self {
        self.target = Some(target);
        self
    }

    pub fn mode(mut self, mode: DrawMode) -> Self {
        self.draw_mode = mode;
        self
    }

    pub fn depth_test(mut self, switch: DepthTestSwitch) -> Self {
        self.depth_test = switch;
        self
    }

    /// Samples `source` on `unit`.
    pub fn input(mut self, source: TextureSource, unit: u32) -> Self {
        self.inputs.push(TextureInput { source, unit });
        self
    }

    /// Samples the first attachment of `target` on `unit`.
    pub fn read(self, target: TargetRef, unit: u32) -> Self {
        self.input(TextureSource::Target(target), unit)
    }

    pub fn after(mut self, pass: PassId) -> Self {
        self.dependencies.push(pass);
        self
    }

    pub fn rect(mut self, rect: ScreenRect) -> Self {
        self.screen_rect = Some(rect);
        self
    }

    pub fn clear(mut self, color: [f32; 4]) -> Self {
        self.clear = Some(color);
        self
    }

    pub fn blend(mut self, blend: Blend) -> Self {
        self.blend = blend;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn full_rect_is_identity() {
        assert!(ScreenRect::full().matrix().abs_diff_eq(Mat3::IDENTITY, 1e-6));
    }

    #[test]
    fn rect_scales_then_translates() {
        let rect = ScreenRect::new(0.625, -0.625, 0.125, 0.125);
        let corner = rect.matrix() * Vec3::new(1.0, 1.0, 1.0);
        assert!((corner.x - 0.75).abs() < 1e-6);
        assert!((corner.y + 0.5).abs() < 1e-6);
        assert!(rect.contains(Vec2::new(0.7, -0.7)));
        assert!(!rect.contains(Vec2::ZERO));
    }

    #[test]
    fn rotation_turns_the_quad() {
        let rect = ScreenRect::full().rotated(FRAC_PI_2);
        let p = rect.matrix() * Vec3::new(1.0, 0.0, 1.0);
        assert!(p.x.abs() < 1e-6 && (p.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sides_alternate_with_the_counter() {
        for n in 0..4u64 {
            assert_eq!(Side::Current.index(n), (n % 2) as usize);
            assert_eq!(Side::Other.index(n), ((n + 1) % 2) as usize);
            assert_ne!(Side::Current.index(n), Side::Other.index(n));
        }
    }

    #[test]
    fn ping_pong_resolves_per_counter() {
        let current = TargetRef::ping_pong(PingPongPair::LightAccum, Side::Current, Counter::Light);
        let other = TargetRef::ping_pong(PingPongPair::LightAccum, Side::Other, Counter::Light);
        assert_eq!(current.key(0, 7), Some(TargetKey::LightAccumPing));
        assert_eq!(current.key(1, 7), Some(TargetKey::LightAccumPong));
        assert_eq!(other.key(0, 7), Some(TargetKey::LightAccumPong));
        assert!(!current.aliases(other));
        assert!(current.aliases(current));
        assert!(!TargetRef::Fixed(TargetKey::LightAccumPing).aliases(current));
        assert_eq!(TargetRef::Screen.key(0, 0), None);
    }
}
