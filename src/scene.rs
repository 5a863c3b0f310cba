//! The collaborators a strategy renders: a [`Scene`] of meshes and lights, and a [`Hud`]
//! of screen-space quads.
//!
//! Both draw through a [`ProgramBinding`]: the strategy activates a program, hands the
//! binding over, and the collaborator records whatever draws make sense for that program.
//! A binding silently ignores uniforms its program does not declare, so collaborators
//! never branch on which pass is running.

use glam::{Mat4, Vec3};

use crate::backend::{MeshId, TextureId};
use crate::camera::Camera;
use crate::config::MAX_LIGHTS;
use crate::object_id::ObjectId;
use crate::render_graph::ScreenRect;
use crate::shader::ProgramBinding;

/// A point light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub color: Vec3,
}

impl Light {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            color: Vec3::ONE,
        }
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }
}

/// Surface colors. `specular.r` doubles as the specular intensity in the deferred
/// color buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: [0.8, 0.8, 0.8, 1.0],
            specular: [0.5, 0.5, 0.5, 1.0],
        }
    }
}

impl Material {
    pub fn new(diffuse: [f32; 4], specular: [f32; 4]) -> Self {
        Self { diffuse, specular }
    }
}

/// One placement of an uploaded mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshInstance {
    pub mesh: MeshId,
    pub transform: Mat4,
    pub material: Material,
    pub object_id: ObjectId,
}

impl MeshInstance {
    /// Creates an instance with a freshly allocated object id.
    pub fn new(mesh: MeshId, transform: Mat4) -> Self {
        Self {
            mesh,
            transform,
            material: Material::default(),
            object_id: ObjectId::next(),
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }
}

/// A screen-space rectangle drawn by the HUD.
#[derive(Clone, Debug, PartialEq)]
pub struct HudQuad {
    pub rect: ScreenRect,
    pub color: [f32; 4],
    /// Sampled texture; `None` draws the neutral white placeholder.
    pub texture: Option<TextureId>,
    pub object_id: ObjectId,
}

impl HudQuad {
    /// Creates a quad with a freshly allocated object id.
    pub fn new(rect: ScreenRect, color: [f32; 4]) -> Self {
        Self {
            rect,
            color,
            texture: None,
            object_id: ObjectId::next(),
        }
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }
}

/// What a strategy needs from the scene graph.
pub trait Scene {
    /// Records every mesh draw. The camera the pass renders through is available from
    /// [`ProgramBinding::camera`].
    fn draw_geometry(&self, program: &mut ProgramBinding);

    /// Lights in a stable order.
    fn lights(&self) -> &[Light];

    /// Restricts [`draw_lights`](Self::draw_lights) to one light, or to all with `None`.
    fn set_active_light_index(&mut self, index: Option<usize>);

    fn active_light_index(&self) -> Option<usize>;

    fn camera(&self) -> &Camera;

    /// Uploads the active light into slot 0, or every light (up to [`MAX_LIGHTS`]) when
    /// none is active.
    fn draw_lights(&self, program: &mut ProgramBinding) {
        match self.active_light_index() {
            Some(index) => {
                if let Some(light) = self.lights().get(index) {
                    program.set_light(0, light);
                }
            }
            None => {
                for (slot, light) in self.lights().iter().take(MAX_LIGHTS).enumerate() {
                    program.set_light(slot, light);
                }
            }
        }
    }
}

/// What a strategy needs from the heads-up overlay.
pub trait Hud {
    fn draw(&self, program: &mut ProgramBinding);
}

/// A flat list of mesh instances and lights.
#[derive(Clone, Debug, Default)]
pub struct BasicScene {
    pub camera: Camera,
    pub instances: Vec<MeshInstance>,
    pub lights: Vec<Light>,
    active_light: Option<usize>,
}

impl BasicScene {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            ..Default::default()
        }
    }

    pub fn add(&mut self, instance: MeshInstance) -> ObjectId {
        let id = instance.object_id;
        self.instances.push(instance);
        id
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn instance(&self, id: ObjectId) -> Option<&MeshInstance> {
        self.instances.iter().find(|i| i.object_id == id)
    }
}

impl Scene for BasicScene {
    fn draw_geometry(&self, program: &mut ProgramBinding) {
        for instance in &self.instances {
            program.draw_mesh(instance);
        }
    }

    fn lights(&self) -> &[Light] {
        &self.lights
    }

    fn set_active_light_index(&mut self, index: Option<usize>) {
        self.active_light = index;
    }

    fn active_light_index(&self) -> Option<usize> {
        self.active_light
    }

    fn camera(&self) -> &Camera {
        &self.camera
    }
}

/// A HUD made of independent quads.
#[derive(Clone, Debug, Default)]
pub struct QuadHud {
    pub quads: Vec<HudQuad>,
}

impl QuadHud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, quad: HudQuad) -> ObjectId {
        let id = quad.object_id;
        self.quads.push(quad);
        id
    }

    pub fn quad(&self, id: ObjectId) -> Option<&HudQuad> {
        self.quads.iter().find(|q| q.object_id == id)
    }
}

impl Hud for QuadHud {
    fn draw(&self, program: &mut ProgramBinding) {
        for quad in &self.quads {
            program.draw_quad(quad);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PassUniforms;
    use crate::camera::CameraView;
    use crate::shader::ProgramKey;

    fn scene_with_lights(n: usize) -> BasicScene {
        let mut scene = BasicScene::new(Camera::new());
        for i in 0..n {
            scene.add_light(Light::new(Vec3::new(i as f32, 1.0, 0.0)));
        }
        scene
    }

    fn binding(scene: &BasicScene) -> ProgramBinding {
        let view = CameraView::new(scene.camera(), 1.0);
        ProgramBinding::new(ProgramKey::Lighting, view, PassUniforms::default())
    }

    #[test]
    fn active_light_goes_to_slot_zero() {
        let mut scene = scene_with_lights(3);
        scene.set_active_light_index(Some(2));
        let mut program = binding(&scene);
        scene.draw_lights(&mut program);
        assert_eq!(program.light_count(), 1);
    }

    #[test]
    fn all_lights_are_bounded() {
        let scene = scene_with_lights(MAX_LIGHTS + 3);
        let mut program = binding(&scene);
        scene.draw_lights(&mut program);
        assert_eq!(program.light_count(), MAX_LIGHTS as u32);
    }

    #[test]
    fn drawables_get_distinct_ids() {
        let a = MeshInstance::new(MeshId(1), Mat4::IDENTITY);
        let b = MeshInstance::new(MeshId(1), Mat4::IDENTITY);
        let quad = HudQuad::new(ScreenRect::full(), [1.0; 4]);
        assert_ne!(a.object_id, b.object_id);
        assert_ne!(a.object_id, quad.object_id);
        assert!(!quad.object_id.is_none());
    }
}
