//! Assembly of the deferred pass list for a quality tier.

use std::f32::consts::FRAC_PI_2;

use super::targets::{PingPongPair, TargetKey};
use crate::compositor::Compositor;
use crate::config::PipelineConfig;
use crate::render_graph::{
    Counter, DepthTestSwitch, DrawMode, PassGraph, PassId, Placeholder, RenderPass, ScreenRect,
    Side, TargetRef, TextureSource,
};
use crate::shader::ProgramKey;

/// Tier at which ambient occlusion is computed.
pub const AMBIENT_OCCLUSION_LEVEL: i32 = 1;
/// Tier at which shadows are computed.
pub const SHADOW_LEVEL: i32 = 2;

const CLEAR_BLACK: [f32; 4] = [0.0; 4];
const CLEAR_WHITE: [f32; 4] = [1.0; 4];
/// Depth moments of a texel that sees nothing: far plane, far plane squared.
const CLEAR_FAR_MOMENTS: [f32; 4] = [1.0, 1.0, 0.0, 0.0];

const fn fixed(key: TargetKey) -> TargetRef {
    TargetRef::Fixed(key)
}

/// The light-accumulation buffer written for the current light.
pub const ACCUM_WRITE: TargetRef =
    TargetRef::ping_pong(PingPongPair::LightAccum, Side::Current, Counter::Light);
/// The light-accumulation buffer holding everything before the current light. After the
/// loop, with the counter at the light count, it holds the finished sum.
pub const ACCUM_READ: TargetRef =
    TargetRef::ping_pong(PingPongPair::LightAccum, Side::Other, Counter::Light);
/// This frame's tone-mapped image.
pub const TONEMAP_WRITE: TargetRef =
    TargetRef::ping_pong(PingPongPair::Tonemap, Side::Current, Counter::Frame);

/// The top-level passes of one tier, in frame order.
#[derive(Clone, Debug)]
pub(crate) struct DeferredPlan {
    /// Geometry buffers and the accumulation clear.
    pub prepass: PassId,
    /// Shadow factor for the current light, with its clear and light-space depth.
    pub shadow: Option<PassId>,
    pub lighting: PassId,
    /// Occlusion estimate with both blur directions.
    pub ambient_occlusion: Option<PassId>,
    pub tonemap: PassId,
    pub compositor: Compositor,
}

fn geometry(label: &'static str, program: ProgramKey, key: TargetKey, clear: [f32; 4]) -> RenderPass {
    RenderPass::new(label)
        .program(program)
        .target(fixed(key))
        .mode(DrawMode::FullScene)
        .depth_test(DepthTestSwitch::Enable)
        .clear(clear)
}

/// A pass that only clears `key`. Blit needs one input, so it samples black and draws
/// nothing.
fn clear_only(label: &'static str, key: TargetKey, color: [f32; 4]) -> RenderPass {
    RenderPass::new(label)
        .program(ProgramKey::Blit)
        .target(fixed(key))
        .mode(DrawMode::NoGeometry)
        .input(TextureSource::Placeholder(Placeholder::Black), 0)
        .clear(color)
}

fn screen_pass(label: &'static str, program: ProgramKey, target: TargetRef) -> RenderPass {
    RenderPass::new(label)
        .program(program)
        .target(target)
        .mode(DrawMode::NoGeometry)
        .depth_test(DepthTestSwitch::Disable)
        .rect(ScreenRect::full())
        .clear(CLEAR_BLACK)
}

/// Builds the pass list for `level`. Lower tiers bind placeholders where the skipped
/// passes' outputs would go, so every program sees the same units at every tier.
pub(crate) fn build_deferred(level: i32, config: &PipelineConfig) -> (PassGraph, DeferredPlan) {
    let mut graph = PassGraph::new();

    let normal_depth = graph.add(geometry(
        "normal depth",
        ProgramKey::NormalDepth,
        TargetKey::NormalDepth,
        CLEAR_BLACK,
    ));
    let world_position = graph.add(geometry(
        "world position",
        ProgramKey::WorldPosition,
        TargetKey::WorldPosition,
        CLEAR_BLACK,
    ));
    let color_specular = graph.add(geometry(
        "color specular",
        ProgramKey::ColorSpecular,
        TargetKey::ColorSpecular,
        config.clear_color,
    ));
    let object_id = graph.add(geometry(
        "object id",
        ProgramKey::ObjectId,
        TargetKey::ObjectId,
        CLEAR_BLACK,
    ));
    // Light 0 reads side `Other` of counter 0.
    let prepass = graph.add(
        clear_only("accumulation clear", TargetKey::LightAccumPong, CLEAR_BLACK)
            .after(normal_depth)
            .after(world_position)
            .after(color_specular)
            .after(object_id),
    );

    let shadow = (level >= SHADOW_LEVEL).then(|| {
        let mask = graph.add(clear_only("shadow clear", TargetKey::ShadowPong, CLEAR_WHITE));
        let light_space = graph.add(
            RenderPass::new("light space depth")
                .program(ProgramKey::LightSpaceDepth)
                .target(fixed(TargetKey::LightSpaceNormal))
                .mode(DrawMode::CustomCamera)
                .depth_test(DepthTestSwitch::Enable)
                .clear(CLEAR_FAR_MOMENTS),
        );
        graph.add(
            screen_pass("shadow map", ProgramKey::ShadowMap, fixed(TargetKey::ShadowPing))
                .mode(DrawMode::LightsOnly { light_space: true })
                .read(fixed(TargetKey::WorldPosition), 0)
                .read(fixed(TargetKey::LightSpaceNormal), 1)
                .read(fixed(TargetKey::ShadowPong), 2)
                .after(mask)
                .after(light_space),
        )
    });

    let shadow_input = match shadow {
        Some(_) => TextureSource::Target(fixed(TargetKey::ShadowPing)),
        None => TextureSource::Placeholder(Placeholder::White),
    };
    let lighting = graph.add(
        screen_pass("lighting", ProgramKey::Lighting, ACCUM_WRITE)
            .mode(DrawMode::LightsOnly { light_space: false })
            .read(fixed(TargetKey::NormalDepth), 0)
            .read(fixed(TargetKey::WorldPosition), 1)
            .input(shadow_input, 2)
            .read(ACCUM_READ, 3),
    );

    let ambient_occlusion = (level >= AMBIENT_OCCLUSION_LEVEL).then(|| {
        let estimate = graph.add(
            screen_pass("ssao", ProgramKey::Ssao, fixed(TargetKey::AmbientOcclusion))
                .read(fixed(TargetKey::NormalDepth), 0)
                .read(fixed(TargetKey::WorldPosition), 1)
                .input(TextureSource::Placeholder(Placeholder::Random), 2),
        );
        let horizontal = graph.add(
            screen_pass("blur horizontal", ProgramKey::Blur, fixed(TargetKey::AoBlurPing))
                .rect(ScreenRect::full().rotated(FRAC_PI_2))
                .read(fixed(TargetKey::AmbientOcclusion), 0)
                .after(estimate),
        );
        graph.add(
            screen_pass("blur vertical", ProgramKey::Blur, fixed(TargetKey::AmbientOcclusion))
                .rect(ScreenRect::full().rotated(-FRAC_PI_2))
                .read(fixed(TargetKey::AoBlurPing), 0)
                .after(horizontal),
        )
    });

    let ambient_input = match ambient_occlusion {
        Some(_) => TextureSource::Target(fixed(TargetKey::AmbientOcclusion)),
        None => TextureSource::Placeholder(Placeholder::White),
    };
    let tonemap = graph.add(
        screen_pass("tonemap", ProgramKey::Tonemap, TONEMAP_WRITE)
            .read(fixed(TargetKey::ColorSpecular), 0)
            .read(ACCUM_READ, 1)
            .input(ambient_input, 2),
    );

    let debug_sources = [
        fixed(TargetKey::NormalDepth),
        fixed(TargetKey::WorldPosition),
        fixed(TargetKey::ColorSpecular),
        fixed(TargetKey::AmbientOcclusion),
    ];
    let compositor = Compositor::build(&mut graph, TONEMAP_WRITE, &debug_sources, config);

    log::debug!("deferred passes rebuilt for level {}: {} passes", level, graph.len());
    debug_assert!(graph.check_all(), "deferred pass list is miswired");

    (
        graph,
        DeferredPlan {
            prepass,
            shadow,
            lighting,
            ambient_occlusion,
            tonemap,
            compositor,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tier_is_well_formed() {
        for level in 0..=SHADOW_LEVEL {
            let config = PipelineConfig::new().debug_views(true);
            let (graph, plan) = build_deferred(level, &config);
            assert!(graph.check_all(), "level {}", level);
            assert_eq!(plan.shadow.is_some(), level >= SHADOW_LEVEL);
            assert_eq!(plan.ambient_occlusion.is_some(), level >= AMBIENT_OCCLUSION_LEVEL);
        }
    }

    #[test]
    fn lighting_units_are_fixed_across_tiers() {
        let config = PipelineConfig::new();
        let units: Vec<Vec<u32>> = (0..=SHADOW_LEVEL)
            .map(|level| {
                let (graph, plan) = build_deferred(level, &config);
                let lighting = graph.get(plan.lighting).unwrap();
                lighting.inputs.iter().map(|i| i.unit).collect()
            })
            .collect();
        assert_eq!(units[0], vec![0, 1, 2, 3]);
        assert!(units.iter().all(|u| *u == units[0]));
    }

    #[test]
    fn disabled_tiers_bind_white() {
        let (graph, plan) = build_deferred(0, &PipelineConfig::new());
        let lighting = graph.get(plan.lighting).unwrap();
        assert_eq!(
            lighting.inputs[2].source,
            TextureSource::Placeholder(Placeholder::White)
        );
        let tonemap = graph.get(plan.tonemap).unwrap();
        assert_eq!(
            tonemap.inputs[2].source,
            TextureSource::Placeholder(Placeholder::White)
        );
    }

    #[test]
    fn blur_passes_rotate_there_and_back() {
        let (graph, plan) = build_deferred(1, &PipelineConfig::new());
        let vertical = graph.get(plan.ambient_occlusion.unwrap()).unwrap();
        let horizontal = graph.get(vertical.dependencies[0]).unwrap();
        let a = horizontal.screen_rect.unwrap().rotation;
        let b = vertical.screen_rect.unwrap().rotation;
        assert!(((a - b).abs() - std::f32::consts::PI).abs() < 1e-6);
        assert_eq!(horizontal.program, vertical.program);
    }
}
