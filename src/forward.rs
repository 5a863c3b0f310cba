//! Single-pass forward Phong shading, the cheapest strategy.
//!
//! Every light is uploaded at once and shaded per fragment while the scene is drawn. There
//! are no shadows or ambient occlusion, so the strategy has a single render level. The
//! object-id pass and the compositing steps are the same as the deferred strategy's, which
//! keeps picking and the HUD identical across strategies.

use crate::backend::{GpuBackend, MeshId, TextureId};
use crate::compositor::Compositor;
use crate::config::PipelineConfig;
use crate::mesh::MeshData;
use crate::pipeline::{FORWARD_TARGETS, PipelineCore, Resources, TargetKey};
use crate::render_graph::{
    DepthTestSwitch, DrawMode, FrameContext, PassGraph, PassId, RenderPass, TargetRef,
};
use crate::scene::{Hud, Scene};
use crate::shader::{ProgramKey, ShaderLibrary};
use crate::texture::TextureData;

/// Programs of the forward strategy.
pub const FORWARD_PROGRAMS: [ProgramKey; 6] = [
    ProgramKey::Phong,
    ProgramKey::ObjectId,
    ProgramKey::Fxaa,
    ProgramKey::Blit,
    ProgramKey::Overlay,
    ProgramKey::ObjectIdOverlay,
];

#[derive(Clone, Debug)]
struct ForwardPlan {
    shade: PassId,
    object_id: PassId,
    compositor: Compositor,
}

fn build_forward(config: &PipelineConfig) -> (PassGraph, ForwardPlan) {
    let mut graph = PassGraph::new();
    let shade = graph.add(
        RenderPass::new("forward phong")
            .program(ProgramKey::Phong)
            .target(TargetRef::Fixed(TargetKey::ForwardColor))
            .mode(DrawMode::FullScene)
            .depth_test(DepthTestSwitch::Enable)
            .clear(config.clear_color),
    );
    let object_id = graph.add(
        RenderPass::new("object id")
            .program(ProgramKey::ObjectId)
            .target(TargetRef::Fixed(TargetKey::ObjectId))
            .mode(DrawMode::FullScene)
            .depth_test(DepthTestSwitch::Enable)
            .clear([0.0; 4]),
    );
    let compositor = Compositor::build(
        &mut graph,
        TargetRef::Fixed(TargetKey::ForwardColor),
        &[
            TargetRef::Fixed(TargetKey::ForwardColor),
            TargetRef::Fixed(TargetKey::ObjectId),
        ],
        config,
    );

    debug_assert!(graph.check_all(), "forward pass list is miswired");
    (
        graph,
        ForwardPlan {
            shade,
            object_id,
            compositor,
        },
    )
}

/// Forward Phong with every light in one pass.
pub struct ForwardPipeline<B> {
    core: PipelineCore<B>,
    graph: PassGraph,
    plan: Option<ForwardPlan>,
}

impl<B: GpuBackend> ForwardPipeline<B> {
    pub const NAME: &'static str = "simple_phong";

    pub fn new(backend: B, config: PipelineConfig) -> Self {
        let core = PipelineCore::new(
            Self::NAME,
            backend,
            config,
            &FORWARD_PROGRAMS,
            &FORWARD_TARGETS,
        );
        Self::from_core(core)
    }

    pub fn with_library(backend: B, config: PipelineConfig, library: ShaderLibrary) -> Self {
        let core = PipelineCore::new(
            Self::NAME,
            backend,
            config,
            &FORWARD_PROGRAMS,
            &FORWARD_TARGETS,
        )
        .with_library(library);
        Self::from_core(core)
    }

    fn from_core(core: PipelineCore<B>) -> Self {
        let mut pipeline = Self {
            core,
            graph: PassGraph::new(),
            plan: None,
        };
        pipeline.poll();
        pipeline
    }

    pub fn poll(&mut self) -> bool {
        if self.core.poll() {
            let (graph, plan) = build_forward(&self.core.config);
            self.graph = graph;
            self.plan = Some(plan);
        }
        self.is_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.core.is_ready() && self.plan.is_some()
    }

    pub fn reload(&mut self) {
        self.plan = None;
        self.graph = PassGraph::new();
        self.core.reload();
        self.poll();
    }

    pub fn check_hot_reload(&mut self) -> bool {
        if !self.core.sources_changed() {
            return false;
        }
        self.reload();
        true
    }

    /// Always 0.
    pub fn render_level(&self) -> i32 {
        0
    }

    /// There is only level 0, so this never changes anything.
    pub fn set_render_level(&mut self, level: i32) -> bool {
        if level != 0 {
            log::debug!("{} has no render level {}", Self::NAME, level);
        }
        false
    }

    pub fn draw(&mut self, scene: &mut dyn Scene, hud: &dyn Hud) {
        if !self.is_ready() && !self.poll() {
            return;
        }
        if !self.core.begin_frame() {
            return;
        }
        let Some(plan) = &self.plan else {
            self.core.end_frame();
            return;
        };

        scene.set_active_light_index(None);
        let camera = self.core.camera_view(scene);
        let mut ctx = FrameContext::new(
            &mut self.core.backend,
            &self.core.resources,
            scene,
            hud,
            camera,
            self.core.frame,
        );
        self.graph.run(plan.shade, &mut ctx);
        self.graph.run(plan.object_id, &mut ctx);
        plan.compositor.run(&self.graph, &mut ctx);

        drop(ctx);
        self.core.end_frame();
    }

    pub fn object_id_at(&mut self, x: u32, y: u32) -> Option<u32> {
        self.core.pick(TargetKey::ObjectId, x, y)
    }

    pub fn hud_object_id_at(&mut self, x: u32, y: u32) -> Option<u32> {
        self.core.pick(TargetKey::HudObjectId, x, y)
    }

    pub fn upload_mesh(&mut self, mesh: &MeshData) -> MeshId {
        self.core.backend.create_mesh(mesh)
    }

    pub fn upload_texture(&mut self, texture: &TextureData) -> TextureId {
        self.core.backend.create_texture(texture)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.core.backend.resize(width, height);
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.core.config
    }

    pub fn resources(&self) -> &Resources {
        &self.core.resources
    }

    pub fn backend(&self) -> &B {
        &self.core.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.core.backend
    }

    pub fn into_backend(self) -> B {
        self.core.into_backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, Output};
    use crate::camera::Camera;
    use crate::config::MAX_LIGHTS;
    use crate::scene::{BasicScene, Light, MeshInstance, QuadHud};
    use glam::{Mat4, Vec3};

    fn pipeline() -> ForwardPipeline<HeadlessBackend> {
        ForwardPipeline::new(
            HeadlessBackend::new(320, 240),
            PipelineConfig::new().resolution(32),
        )
    }

    #[test]
    fn single_level() {
        let mut pipeline = pipeline();
        assert!(pipeline.is_ready());
        assert_eq!(pipeline.render_level(), 0);
        assert!(!pipeline.set_render_level(0));
        assert!(!pipeline.set_render_level(1));
        assert_eq!(pipeline.render_level(), 0);
    }

    #[test]
    fn all_lights_in_one_pass() {
        let mut pipeline = pipeline();
        let cube = pipeline.upload_mesh(&MeshData::cube());
        let mut scene = BasicScene::new(Camera::new());
        scene.add(MeshInstance::new(cube, Mat4::IDENTITY));
        for i in 0..3 {
            scene.add_light(Light::new(Vec3::new(i as f32, 2.0, 0.0)));
        }
        scene.set_active_light_index(Some(1));
        pipeline.draw(&mut scene, &QuadHud::new());

        let passes = pipeline.backend().passes();
        let labels: Vec<&str> = passes.iter().map(|p| p.label).collect();
        assert_eq!(
            labels,
            vec!["forward phong", "object id", "antialias", "hud overlay", "hud object id"]
        );
        assert_eq!(passes[0].uniforms.light_count[0], 3);
        assert_eq!(passes[0].draw_count, 1);
        assert_eq!(passes[1].uniforms.light_count[0], 0);
        assert_eq!(passes[2].output, Output::Screen);
    }

    #[test]
    fn light_count_is_capped() {
        let mut pipeline = pipeline();
        let mut scene = BasicScene::new(Camera::new());
        for _ in 0..MAX_LIGHTS + 2 {
            scene.add_light(Light::new(Vec3::Y));
        }
        pipeline.draw(&mut scene, &QuadHud::new());
        let shade = &pipeline.backend().passes()[0];
        assert_eq!(shade.uniforms.light_count[0], MAX_LIGHTS as u32);
    }

    #[test]
    fn picking_reads_the_scene_ids() {
        let mut pipeline = pipeline();
        let mut scene = BasicScene::new(Camera::new());
        pipeline.draw(&mut scene, &QuadHud::new());

        let Some(Output::Target(ids)) = pipeline
            .resources()
            .target(TargetKey::ObjectId)
            .and_then(|t| t.output())
        else {
            panic!("object id target missing")
        };
        pipeline.backend_mut().poke(ids, 16, 16, [0, 1, 0, 255]);
        assert_eq!(pipeline.object_id_at(160, 120), Some(256));
    }

    #[test]
    fn into_backend_releases_everything() {
        let mut pipeline = pipeline();
        pipeline.upload_mesh(&MeshData::cube());
        let backend = pipeline.into_backend();
        assert_eq!(backend.live_targets(), 0);
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(backend.mesh_count(), 1);
    }
}
