//! # Deferred Shading
//!
//! **A multi-pass deferred renderer with shadows, ambient occlusion and pixel-exact
//! picking, on top of wgpu.**
//!
//! A strategy turns a [`Scene`] (meshes, lights, camera) and a [`Hud`] (screen-space
//! quads) into a finished frame. The deferred strategy renders geometry attributes into
//! offscreen targets, accumulates lighting one light at a time through a ping-pong pair,
//! adds ambient occlusion and tone mapping, antialiases onto the screen and draws the HUD
//! on top. Scene objects and HUD quads both write their ids into byte targets, so a click
//! can be resolved to a drawable with one pixel readback.
//!
//! ## Quick Start
//!
//! ```no_run
//! use deferred_shading::*;
//!
//! # fn demo(window: std::sync::Arc<winit::window::Window>) -> Result<(), PipelineError> {
//! let backend = WgpuBackend::new(window)?;
//! let mut pipeline = DeferredPipeline::new(backend, PipelineConfig::new());
//!
//! let cube = pipeline.upload_mesh(&MeshData::cube());
//! let mut scene = BasicScene::new(Camera::new().at(0.0, 2.0, 8.0).looking_at(0.0, 0.0, 0.0));
//! scene.add(MeshInstance::new(cube, Mat4::IDENTITY));
//! scene.add_light(Light::new(Vec3::new(-2.0, 3.0, -6.0)));
//!
//! pipeline.draw(&mut scene, &QuadHud::new());
//! let picked = pipeline.object_id_at(400, 300);
//! # Ok(())
//! # }
//! ```
//!
//! ## Quality levels
//!
//! - **0**: color and per-light Phong lighting
//! - **1**: adds screen-space ambient occlusion
//! - **2**: adds variance shadow maps
//!
//! Disabled stages are replaced by neutral placeholder textures, so no program changes
//! its inputs when the level changes.
//!
//! ## Testing without a GPU
//!
//! Every strategy is generic over [`GpuBackend`]. [`HeadlessBackend`] records the submitted
//! passes and simulates target contents, which is what the crate's own tests run against.

pub mod backend;
mod camera;
pub mod compositor;
mod config;
mod error;
mod forward;
mod gpu;
mod light_view;
mod logging;
mod mesh;
mod object_id;
pub mod pipeline;
pub mod render_graph;
mod scene;
pub mod shader;
mod strategy;
mod texture;

pub use backend::{
    Blend, GpuBackend, HeadlessBackend, MeshId, Output, Precision, ProgramId, RecordedPass,
    TargetId, TextureId, WgpuBackend,
};
pub use camera::{Camera, CameraView};
pub use compositor::{Compositor, DEBUG_VIEW_RECTS};
pub use config::{DemoConfig, MAX_LIGHTS, MAX_RENDER_LEVEL, PipelineConfig, TARGET_RESOLUTION};
pub use error::PipelineError;
pub use forward::ForwardPipeline;
pub use gpu::GpuContext;
pub use light_view::{LightViewController, shadow_matrix};
pub use logging::{LoggingConfig, init_logging};
pub use mesh::{MeshData, Transform, Vertex};
pub use object_id::{MAX_OBJECT_ID, ObjectId, decode_object_id};
pub use pipeline::{DeferredPipeline, TargetKey};
pub use render_graph::{RenderPass, RenderTarget, ScreenRect};
pub use scene::{BasicScene, Hud, HudQuad, Light, Material, MeshInstance, QuadHud, Scene};
pub use shader::{ProgramBinding, ProgramKey, ShaderLibrary, Uniform, UniformValue};
pub use strategy::{RenderStrategy, StrategyKind, StrategyLadder};
pub use texture::{AddressMode, TextureData};

// Re-export glam math types for convenience
pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
