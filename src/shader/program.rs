//! Program keys, their uniform/attribute/sampler contracts, and the binding handed to
//! scene and HUD collaborators.

use glam::{Mat3, Mat4, Vec4};

use crate::backend::{DrawCommand, DrawKind, DrawUniforms, PassUniforms};
use crate::camera::CameraView;
use crate::config::MAX_LIGHTS;
use crate::scene::{HudQuad, Light, MeshInstance};

/// Every GPU program the strategies compile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgramKey {
    NormalDepth,
    WorldPosition,
    ColorSpecular,
    ObjectId,
    LightSpaceDepth,
    ShadowMap,
    Lighting,
    Ssao,
    Blur,
    Tonemap,
    Fxaa,
    Overlay,
    ObjectIdOverlay,
    Blit,
    Phong,
}

impl ProgramKey {
    pub const ALL: [ProgramKey; 15] = [
        ProgramKey::NormalDepth,
        ProgramKey::WorldPosition,
        ProgramKey::ColorSpecular,
        ProgramKey::ObjectId,
        ProgramKey::LightSpaceDepth,
        ProgramKey::ShadowMap,
        ProgramKey::Lighting,
        ProgramKey::Ssao,
        ProgramKey::Blur,
        ProgramKey::Tonemap,
        ProgramKey::Fxaa,
        ProgramKey::Overlay,
        ProgramKey::ObjectIdOverlay,
        ProgramKey::Blit,
        ProgramKey::Phong,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProgramKey::NormalDepth => "normal_depth",
            ProgramKey::WorldPosition => "world_position",
            ProgramKey::ColorSpecular => "color_specular",
            ProgramKey::ObjectId => "object_id",
            ProgramKey::LightSpaceDepth => "light_space_depth",
            ProgramKey::ShadowMap => "shadow_map",
            ProgramKey::Lighting => "lighting",
            ProgramKey::Ssao => "ssao",
            ProgramKey::Blur => "blur",
            ProgramKey::Tonemap => "tonemap",
            ProgramKey::Fxaa => "fxaa",
            ProgramKey::Overlay => "overlay",
            ProgramKey::ObjectIdOverlay => "object_id_overlay",
            ProgramKey::Blit => "blit",
            ProgramKey::Phong => "phong",
        }
    }

    /// Source file holding this program's entry points.
    pub fn file_name(self) -> String {
        format!("{}.wgsl", self.name())
    }

    pub fn contract(self) -> &'static ProgramContract {
        use Attribute as A;
        use Sampler as S;
        use Uniform as U;

        const MESH_XFORM: [Uniform; 3] = [U::Projection, U::View, U::Model];

        match self {
            ProgramKey::NormalDepth => &ProgramContract {
                attributes: &[A::Position, A::Normal],
                uniforms: &[U::Projection, U::View, U::Model, U::NormalMatrix],
                samplers: &[],
            },
            ProgramKey::WorldPosition | ProgramKey::LightSpaceDepth => &ProgramContract {
                attributes: &[A::Position],
                uniforms: &MESH_XFORM,
                samplers: &[],
            },
            ProgramKey::ColorSpecular => &ProgramContract {
                attributes: &[A::Position, A::Normal, A::TexCoord],
                uniforms: &[
                    U::Projection,
                    U::View,
                    U::Model,
                    U::DiffuseColor,
                    U::SpecularColor,
                ],
                samplers: &[],
            },
            ProgramKey::ObjectId => &ProgramContract {
                attributes: &[A::Position],
                uniforms: &[U::Projection, U::View, U::Model, U::ObjectId],
                samplers: &[],
            },
            ProgramKey::ShadowMap => &ProgramContract {
                attributes: &[],
                uniforms: &[U::ScreenRect, U::ShadowMatrix, U::Resolution],
                samplers: &[S::Position, S::LightSpace, S::LightMask],
            },
            ProgramKey::Lighting => &ProgramContract {
                attributes: &[],
                uniforms: &[
                    U::ScreenRect,
                    U::LightPositions,
                    U::LightColors,
                    U::LightCount,
                ],
                samplers: &[S::Normal, S::Position, S::Shadow, S::Accumulation],
            },
            ProgramKey::Ssao => &ProgramContract {
                attributes: &[],
                uniforms: &[U::ScreenRect, U::Resolution],
                samplers: &[S::Normal, S::Position, S::Random],
            },
            ProgramKey::Blur | ProgramKey::Blit => &ProgramContract {
                attributes: &[],
                uniforms: &[U::ScreenRect],
                samplers: &[S::Color],
            },
            ProgramKey::Tonemap => &ProgramContract {
                attributes: &[],
                uniforms: &[U::ScreenRect],
                samplers: &[S::Color, S::Accumulation, S::Ambient],
            },
            ProgramKey::Fxaa => &ProgramContract {
                attributes: &[],
                uniforms: &[U::ScreenRect, U::Resolution, U::Tint],
                samplers: &[S::Color],
            },
            ProgramKey::Overlay => &ProgramContract {
                attributes: &[],
                uniforms: &[U::ScreenRect, U::DiffuseColor],
                samplers: &[S::Color],
            },
            ProgramKey::ObjectIdOverlay => &ProgramContract {
                attributes: &[],
                uniforms: &[U::ScreenRect, U::ObjectId],
                samplers: &[],
            },
            ProgramKey::Phong => &ProgramContract {
                attributes: &[A::Position, A::Normal, A::TexCoord],
                uniforms: &[
                    U::Projection,
                    U::View,
                    U::Model,
                    U::NormalMatrix,
                    U::DiffuseColor,
                    U::SpecularColor,
                    U::LightPositions,
                    U::LightColors,
                    U::LightCount,
                ],
                samplers: &[],
            },
        }
    }
}

/// Named vertex inputs. The discriminant is the shader location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    Position = 0,
    Normal = 1,
    TexCoord = 2,
    SkinWeights = 3,
}

/// Named uniform slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Uniform {
    Projection,
    View,
    Model,
    NormalMatrix,
    ScreenRect,
    LightPositions,
    LightColors,
    LightCount,
    DiffuseColor,
    SpecularColor,
    ObjectId,
    ShadowMatrix,
    Resolution,
    Tint,
}

/// Whether a uniform lives in the per-pass block or the per-draw block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformScope {
    Pass,
    Draw,
}

impl Uniform {
    pub fn scope(self) -> UniformScope {
        match self {
            Uniform::Model
            | Uniform::NormalMatrix
            | Uniform::ScreenRect
            | Uniform::DiffuseColor
            | Uniform::SpecularColor
            | Uniform::ObjectId => UniformScope::Draw,
            _ => UniformScope::Pass,
        }
    }
}

/// Named texture inputs. A program's sampler list order is its texture-unit order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sampler {
    Color,
    Normal,
    Position,
    Shadow,
    Accumulation,
    Ambient,
    Random,
    LightSpace,
    LightMask,
}

/// What a program reads.
#[derive(Debug, PartialEq)]
pub struct ProgramContract {
    pub attributes: &'static [Attribute],
    pub uniforms: &'static [Uniform],
    pub samplers: &'static [Sampler],
}

impl ProgramContract {
    pub fn declares(&self, uniform: Uniform) -> bool {
        self.uniforms.contains(&uniform)
    }

    /// Programs without vertex attributes draw screen-rectangle quads.
    pub fn draws_meshes(&self) -> bool {
        !self.attributes.is_empty()
    }

    pub fn unit_of(&self, sampler: Sampler) -> Option<u32> {
        self.samplers
            .iter()
            .position(|s| *s == sampler)
            .map(|i| i as u32)
    }
}

/// A value for [`ProgramBinding::set_uniform`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Mat4(Mat4),
    Mat3(Mat3),
    Vec4(Vec4),
    Count(u32),
}

/// The active program as seen by a scene or HUD while a pass records its draws.
///
/// Uniform writes behave like GL program state: pass-scope values apply to the whole
/// pass, draw-scope values persist into every later draw until overwritten. Writes to a
/// uniform the program does not declare are skipped and reported with `false`.
pub struct ProgramBinding {
    key: ProgramKey,
    contract: &'static ProgramContract,
    camera: CameraView,
    pass: PassUniforms,
    current: DrawUniforms,
    draws: Vec<DrawCommand>,
}

impl ProgramBinding {
    pub(crate) fn new(key: ProgramKey, camera: CameraView, pass: PassUniforms) -> Self {
        Self {
            key,
            contract: key.contract(),
            camera,
            pass,
            current: DrawUniforms::default(),
            draws: Vec::new(),
        }
    }

    pub fn program(&self) -> ProgramKey {
        self.key
    }

    pub fn contract(&self) -> &'static ProgramContract {
        self.contract
    }

    pub fn declares(&self, uniform: Uniform) -> bool {
        self.contract.declares(uniform)
    }

    /// The camera this pass renders through.
    pub fn camera(&self) -> &CameraView {
        &self.camera
    }

    pub fn set_uniform(&mut self, uniform: Uniform, value: UniformValue) -> bool {
        if !self.declares(uniform) {
            return false;
        }

        match (uniform, value) {
            (Uniform::Projection, UniformValue::Mat4(m)) => {
                self.pass.projection = m.to_cols_array_2d()
            }
            (Uniform::View, UniformValue::Mat4(m)) => self.pass.view = m.to_cols_array_2d(),
            (Uniform::ShadowMatrix, UniformValue::Mat4(m)) => {
                self.pass.shadow_matrix = m.to_cols_array_2d()
            }
            (Uniform::LightCount, UniformValue::Count(n)) => {
                self.pass.light_count[0] = n.min(MAX_LIGHTS as u32)
            }
            (Uniform::Resolution, UniformValue::Vec4(v)) => self.pass.resolution = v.to_array(),
            (Uniform::Tint, UniformValue::Vec4(v)) => self.pass.tint = v.to_array(),
            (Uniform::Model, UniformValue::Mat4(m)) => self.current.model = m.to_cols_array_2d(),
            (Uniform::NormalMatrix, UniformValue::Mat4(m)) => {
                self.current.normal_matrix = m.to_cols_array_2d()
            }
            (Uniform::ScreenRect, UniformValue::Mat3(m)) => self.current.rect = pad_mat3(m),
            (Uniform::DiffuseColor, UniformValue::Vec4(v)) => self.current.diffuse = v.to_array(),
            (Uniform::SpecularColor, UniformValue::Vec4(v)) => {
                self.current.specular = v.to_array()
            }
            (Uniform::ObjectId, UniformValue::Vec4(v)) => self.current.object_id = v.to_array(),
            (uniform, value) => {
                log::warn!(
                    "{}: {:?} cannot take a {:?}",
                    self.key.name(),
                    uniform,
                    value
                );
                return false;
            }
        }
        true
    }

    /// Uploads one light into `slot`, in the camera's view space, and grows the light
    /// count to cover it.
    pub fn set_light(&mut self, slot: usize, light: &Light) -> bool {
        if slot >= MAX_LIGHTS || !self.declares(Uniform::LightPositions) {
            return false;
        }

        let position = self.camera.view.transform_point3(light.position);
        self.pass.light_positions[slot] = position.extend(1.0).to_array();
        if self.declares(Uniform::LightColors) {
            self.pass.light_colors[slot] = light.color.extend(1.0).to_array();
        }
        let count = &mut self.pass.light_count[0];
        *count = (*count).max(slot as u32 + 1);
        true
    }

    /// Records an indexed mesh draw. Skipped on quad-only programs.
    pub fn draw_mesh(&mut self, instance: &MeshInstance) -> bool {
        if !self.contract.draws_meshes() {
            return false;
        }

        let model = instance.transform;
        let normal = (self.camera.view * model).inverse().transpose();
        self.set_uniform(Uniform::Model, UniformValue::Mat4(model));
        self.set_uniform(Uniform::NormalMatrix, UniformValue::Mat4(normal));
        self.set_uniform(
            Uniform::DiffuseColor,
            UniformValue::Vec4(Vec4::from_array(instance.material.diffuse)),
        );
        self.set_uniform(
            Uniform::SpecularColor,
            UniformValue::Vec4(Vec4::from_array(instance.material.specular)),
        );
        self.set_uniform(
            Uniform::ObjectId,
            UniformValue::Vec4(Vec4::from_array(instance.object_id.to_color())),
        );

        self.draws.push(DrawCommand {
            kind: DrawKind::Mesh(instance.mesh),
            uniforms: self.current,
            texture: None,
        });
        true
    }

    /// Records a screen-rectangle quad. Skipped on mesh programs.
    pub fn draw_quad(&mut self, quad: &HudQuad) -> bool {
        if self.contract.draws_meshes() {
            return false;
        }

        self.set_uniform(Uniform::ScreenRect, UniformValue::Mat3(quad.rect.matrix()));
        self.set_uniform(
            Uniform::DiffuseColor,
            UniformValue::Vec4(Vec4::from_array(quad.color)),
        );
        self.set_uniform(
            Uniform::ObjectId,
            UniformValue::Vec4(Vec4::from_array(quad.object_id.to_color())),
        );

        self.draws.push(DrawCommand {
            kind: DrawKind::Quad,
            uniforms: self.current,
            texture: quad.texture,
        });
        true
    }

    pub fn draw_count(&self) -> usize {
        self.draws.len()
    }

    #[cfg(test)]
    pub(crate) fn light_count(&self) -> u32 {
        self.pass.light_count[0]
    }

    pub(crate) fn into_parts(self) -> (PassUniforms, Vec<DrawCommand>) {
        (self.pass, self.draws)
    }
}

/// Column-major 3x3 padded to the 16-byte column stride WGSL expects.
pub(crate) fn pad_mat3(m: Mat3) -> [[f32; 4]; 3] {
    let c = m.to_cols_array_2d();
    [
        [c[0][0], c[0][1], c[0][2], 0.0],
        [c[1][0], c[1][1], c[1][2], 0.0],
        [c[2][0], c[2][1], c[2][2], 0.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MeshId;
    use crate::camera::Camera;
    use crate::object_id::ObjectId;
    use crate::render_graph::ScreenRect;
    use crate::scene::Material;
    use glam::Vec3;

    fn binding(key: ProgramKey) -> ProgramBinding {
        let view = CameraView::new(&Camera::new(), 1.0);
        ProgramBinding::new(key, view, PassUniforms::default())
    }

    #[test]
    fn undeclared_uniforms_are_skipped() {
        let mut b = binding(ProgramKey::Blur);
        assert!(!b.set_uniform(Uniform::ShadowMatrix, UniformValue::Mat4(Mat4::IDENTITY)));
        assert!(b.set_uniform(Uniform::ScreenRect, UniformValue::Mat3(Mat3::IDENTITY)));
    }

    #[test]
    fn lights_are_counted_and_bounded() {
        let mut b = binding(ProgramKey::Lighting);
        let light = Light::new(Vec3::new(1.0, 2.0, 3.0));
        assert!(b.set_light(2, &light));
        assert_eq!(b.light_count(), 3);
        assert!(!b.set_light(MAX_LIGHTS, &light));

        let mut no_lights = binding(ProgramKey::Tonemap);
        assert!(!no_lights.set_light(0, &light));
    }

    #[test]
    fn draws_respect_program_kind() {
        let instance = MeshInstance {
            mesh: MeshId(0),
            transform: Mat4::IDENTITY,
            material: Material::default(),
            object_id: ObjectId::NONE,
        };
        let quad = HudQuad::new(ScreenRect::full(), [1.0; 4]);

        let mut mesh_program = binding(ProgramKey::NormalDepth);
        assert!(mesh_program.draw_mesh(&instance));
        assert!(!mesh_program.draw_quad(&quad));

        let mut quad_program = binding(ProgramKey::Overlay);
        assert!(!quad_program.draw_mesh(&instance));
        assert!(quad_program.draw_quad(&quad));
        assert_eq!(quad_program.draw_count(), 1);
    }

    #[test]
    fn sampler_units_follow_declaration_order() {
        let contract = ProgramKey::Lighting.contract();
        assert_eq!(contract.unit_of(Sampler::Normal), Some(0));
        assert_eq!(contract.unit_of(Sampler::Shadow), Some(2));
        assert_eq!(contract.unit_of(Sampler::Random), None);
    }

    #[test]
    fn every_program_has_a_distinct_file() {
        let mut names: Vec<String> = ProgramKey::ALL.iter().map(|k| k.file_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ProgramKey::ALL.len());
    }
}
