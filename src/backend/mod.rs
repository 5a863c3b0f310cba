//! GPU backends.
//!
//! The pipelines never touch wgpu directly. They create resources and submit one
//! [`PassCommand`] per render pass through the [`GpuBackend`] trait:
//!
//! - [`WgpuBackend`] renders through a real device and window surface.
//! - [`HeadlessBackend`] records commands and simulates target contents, so pass
//!   ordering, parity and picking can be exercised without a GPU.
//!
//! # Bindings
//!
//! Every program sees the same three bind groups:
//! - **Group 0**: [`PassUniforms`] (camera, lights, shadow matrix, resolution)
//! - **Group 1**: [`DrawUniforms`] (model, normal matrix, screen rectangle, material, id)
//! - **Group 2**: [`TEXTURE_UNITS`] input textures plus a clamp and a repeat sampler

mod headless;
mod wgpu_backend;

pub use headless::{HeadlessBackend, RecordedPass};
pub use wgpu_backend::WgpuBackend;

use crate::config::MAX_LIGHTS;
use crate::error::PipelineError;
use crate::mesh::MeshData;
use crate::texture::TextureData;

/// Number of texture units a pass can bind.
pub const TEXTURE_UNITS: usize = 6;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// An offscreen render target owned by a backend.
    TargetId
);
handle!(
    /// A compiled (or failed) program.
    ProgramId
);
handle!(
    /// A sampled texture uploaded from CPU data.
    TextureId
);
handle!(
    /// Uploaded mesh geometry.
    MeshId
);

/// Texel precision of a color attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Precision {
    /// 8-bit unsigned normalized RGBA.
    Byte,
    /// 16-bit float RGBA.
    Float,
}

impl Precision {
    pub fn format(self) -> wgpu::TextureFormat {
        match self {
            Precision::Byte => wgpu::TextureFormat::Rgba8Unorm,
            Precision::Float => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttachmentDesc {
    pub name: &'static str,
    pub precision: Precision,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TargetDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Color attachments in attachment-point order. A depth attachment is always added.
    pub attachments: Vec<AttachmentDesc>,
}

#[derive(Clone, Debug)]
pub struct ProgramDesc {
    pub label: &'static str,
    pub source: String,
    /// Mesh programs read [`Vertex`](crate::mesh::Vertex) buffers; the rest draw quads.
    pub uses_vertices: bool,
}

/// Where a pass writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Output {
    Screen,
    Target(TargetId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Blend {
    #[default]
    Replace,
    /// `src * a + dst * (1 - a)`.
    Alpha,
}

/// A texture a pass samples from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureRef {
    Attachment { target: TargetId, index: usize },
    Texture(TextureId),
}

impl TextureRef {
    pub fn target(self) -> Option<TargetId> {
        match self {
            TextureRef::Attachment { target, .. } => Some(target),
            TextureRef::Texture(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundTexture {
    pub texture: TextureRef,
    pub unit: u32,
}

/// Per-pass uniform block (group 0).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    /// Maps a view-space position into the active light's clip space.
    pub shadow_matrix: [[f32; 4]; 4],
    /// Camera position in world space.
    pub eye: [f32; 4],
    /// View-space light positions.
    pub light_positions: [[f32; 4]; MAX_LIGHTS],
    pub light_colors: [[f32; 4]; MAX_LIGHTS],
    /// `x` holds the number of valid lights.
    pub light_count: [u32; 4],
    /// Output width, height and their reciprocals.
    pub resolution: [f32; 4],
    pub tint: [f32; 4],
}

impl Default for PassUniforms {
    fn default() -> Self {
        let identity = glam::Mat4::IDENTITY.to_cols_array_2d();
        Self {
            view: identity,
            projection: identity,
            shadow_matrix: identity,
            eye: [0.0, 0.0, 0.0, 1.0],
            light_positions: [[0.0; 4]; MAX_LIGHTS],
            light_colors: [[1.0; 4]; MAX_LIGHTS],
            light_count: [0; 4],
            resolution: [1.0; 4],
            tint: [1.0; 4],
        }
    }
}

/// Per-draw uniform block (group 1, dynamic offset).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of `view * model`.
    pub normal_matrix: [[f32; 4]; 4],
    /// Screen-rectangle transform for quads, columns padded to 16 bytes.
    pub rect: [[f32; 4]; 3],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub object_id: [f32; 4],
}

impl Default for DrawUniforms {
    fn default() -> Self {
        let identity = glam::Mat4::IDENTITY.to_cols_array_2d();
        Self {
            model: identity,
            normal_matrix: identity,
            rect: crate::shader::pad_mat3(glam::Mat3::IDENTITY),
            diffuse: [1.0; 4],
            specular: [0.0; 4],
            object_id: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawKind {
    Mesh(MeshId),
    /// Six vertices generated in the vertex shader, transformed by `DrawUniforms::rect`.
    Quad,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCommand {
    pub kind: DrawKind,
    pub uniforms: DrawUniforms,
    /// Replaces unit 0 for this draw only.
    pub texture: Option<TextureId>,
}

/// Everything needed to record one render pass.
#[derive(Clone, Debug, PartialEq)]
pub struct PassCommand {
    pub label: &'static str,
    pub program: ProgramId,
    pub output: Output,
    /// Clears color (and depth, for targets) before drawing.
    pub clear: Option<[f32; 4]>,
    pub depth_test: bool,
    pub blend: Blend,
    pub inputs: Vec<BoundTexture>,
    pub uniforms: PassUniforms,
    pub draws: Vec<DrawCommand>,
}

impl PassCommand {
    /// True when the output target is also sampled by this pass.
    pub fn has_feedback(&self) -> bool {
        match self.output {
            Output::Screen => false,
            Output::Target(out) => self.inputs.iter().any(|b| b.texture.target() == Some(out)),
        }
    }
}

/// The operations the pipelines need from a GPU.
///
/// Creation never fails outright: invalid targets and programs are logged and handed
/// back as usable handles whose output is undefined, so a partially supported device
/// degrades visually instead of aborting the session.
pub trait GpuBackend {
    fn create_target(&mut self, desc: &TargetDesc) -> TargetId;
    fn destroy_target(&mut self, target: TargetId);

    fn create_program(&mut self, desc: &ProgramDesc) -> ProgramId;
    /// False when the program failed to compile; its passes are skipped.
    fn program_ok(&self, program: ProgramId) -> bool;
    fn destroy_program(&mut self, program: ProgramId);

    fn create_texture(&mut self, data: &TextureData) -> TextureId;
    fn create_mesh(&mut self, data: &MeshData) -> MeshId;

    /// Acquires the frame's surface. Returns `false` when nothing can be drawn.
    fn begin_frame(&mut self) -> bool;
    fn submit(&mut self, pass: &PassCommand);
    /// Presents the surface.
    fn end_frame(&mut self);

    /// Synchronous 1x1 readback of a target's first color attachment.
    ///
    /// This stalls until the GPU catches up; call it from input handlers only.
    fn read_pixel(&mut self, target: TargetId, x: u32, y: u32) -> Result<[u8; 4], PipelineError>;

    fn surface_size(&self) -> (u32, u32);
    fn resize(&mut self, width: u32, height: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_blocks_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<PassUniforms>(), 512);
        assert_eq!(std::mem::size_of::<DrawUniforms>(), 224);
    }

    #[test]
    fn feedback_detects_self_sampling() {
        let target = TargetId(3);
        let mut pass = PassCommand {
            label: "test",
            program: ProgramId(0),
            output: Output::Target(target),
            clear: None,
            depth_test: false,
            blend: Blend::Replace,
            inputs: vec![BoundTexture {
                texture: TextureRef::Attachment {
                    target: TargetId(4),
                    index: 0,
                },
                unit: 0,
            }],
            uniforms: PassUniforms::default(),
            draws: Vec::new(),
        };
        assert!(!pass.has_feedback());

        pass.inputs.push(BoundTexture {
            texture: TextureRef::Attachment { target, index: 0 },
            unit: 1,
        });
        assert!(pass.has_feedback());
    }
}
