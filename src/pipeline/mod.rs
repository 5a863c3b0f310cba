//! The deferred-shading strategy.
//!
//! Each frame runs, in order:
//!
//! 1. **Geometry prepass**: normals with linear depth, view-space positions, color with
//!    specular intensity and object ids, each into its own target; the accumulation
//!    buffer light 0 reads is cleared.
//! 2. **Per light** `i`: the light is made active on the scene and a light camera is
//!    built at its position. At level 2 the light-space depth moments are rendered and
//!    turned into a shadow factor. The lighting pass then adds this light's contribution
//!    to the sum held in accumulation buffer `(i + 1) % 2`, writing buffer `i % 2`.
//! 3. **Ambient occlusion** (level 1 and up): an occlusion estimate and a separable blur.
//! 4. **Tone map**: color, the finished accumulation (buffer `(n + 1) % 2` after `n`
//!    lights) and occlusion into a low-dynamic-range image.
//! 5. **Composite**: antialias onto the screen, then the HUD on top and into its own
//!    object-id target.
//!
//! Levels below 2 (or 1) bind a white placeholder where the shadow (or occlusion)
//! texture would be, so no program changes its inputs between levels.

mod lifecycle;
mod passes;
mod resources;
mod targets;

pub(crate) use lifecycle::PipelineCore;
pub use passes::{ACCUM_READ, ACCUM_WRITE, AMBIENT_OCCLUSION_LEVEL, SHADOW_LEVEL, TONEMAP_WRITE};
pub use resources::{Placeholders, Resources};
pub use targets::{
    COLOR_ATTACHMENT, DEFERRED_TARGETS, FORWARD_TARGETS, PingPongPair, TargetKey, TargetRegistry,
};

use passes::{DeferredPlan, build_deferred};

use crate::backend::{GpuBackend, MeshId, TextureId};
use crate::config::{MAX_RENDER_LEVEL, PipelineConfig};
use crate::light_view::LightViewController;
use crate::mesh::MeshData;
use crate::render_graph::{FrameContext, PassGraph};
use crate::scene::{Hud, Scene};
use crate::shader::{ProgramKey, ShaderLibrary};
use crate::texture::TextureData;

/// Programs of the deferred strategy.
pub const DEFERRED_PROGRAMS: [ProgramKey; 14] = [
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
];

/// Deferred shading with per-light shadows, ambient occlusion and tone mapping.
///
/// # Example
///
/// ```ignore
/// let mut pipeline = DeferredPipeline::new(backend, PipelineConfig::new());
/// let cube = pipeline.upload_mesh(&MeshData::cube());
/// scene.add(MeshInstance::new(cube, Mat4::IDENTITY));
///
/// // every frame
/// pipeline.draw(&mut scene, &hud);
///
/// // on click
/// if let Some(id) = pipeline.object_id_at(x, y) { /* ... */ }
/// ```
pub struct DeferredPipeline<B> {
    core: PipelineCore<B>,
    level: i32,
    light_view: LightViewController,
    graph: PassGraph,
    plan: Option<DeferredPlan>,
}

impl<B: GpuBackend> DeferredPipeline<B> {
    pub const NAME: &'static str = "deferred_phong";

    /// Creates the pipeline and starts acquiring shader sources. Embedded sources are
    /// available immediately, so with the default config the pipeline is ready on return.
    pub fn new(backend: B, config: PipelineConfig) -> Self {
        let level = config.initial_level.clamp(0, MAX_RENDER_LEVEL);
        let core = PipelineCore::new(
            Self::NAME,
            backend,
            config,
            &DEFERRED_PROGRAMS,
            &DEFERRED_TARGETS,
        );
        Self::from_core(core, level)
    }

    /// Like [`new`](Self::new), with sources from `library`.
    pub fn with_library(backend: B, config: PipelineConfig, library: ShaderLibrary) -> Self {
        let level = config.initial_level.clamp(0, MAX_RENDER_LEVEL);
        let core = PipelineCore::new(
            Self::NAME,
            backend,
            config,
            &DEFERRED_PROGRAMS,
            &DEFERRED_TARGETS,
        )
        .with_library(library);
        Self::from_core(core, level)
    }

    fn from_core(core: PipelineCore<B>, level: i32) -> Self {
        let mut pipeline = Self {
            core,
            level,
            light_view: LightViewController::new(),
            graph: PassGraph::new(),
            plan: None,
        };
        pipeline.poll();
        pipeline
    }

    /// Replaces the light camera controller (direction and up vector of every shadow).
    pub fn set_light_view(&mut self, light_view: LightViewController) {
        self.light_view = light_view;
    }

    pub fn light_view(&self) -> &LightViewController {
        &self.light_view
    }

    /// Drains shader sources; compiles and builds the pass list once all have arrived.
    pub fn poll(&mut self) -> bool {
        if self.core.poll() {
            self.build_passes();
        }
        self.is_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.core.is_ready() && self.plan.is_some()
    }

    /// Destroys every program and target and starts over.
    pub fn reload(&mut self) {
        self.plan = None;
        self.graph = PassGraph::new();
        self.core.reload();
        self.poll();
    }

    /// Reloads when a watched shader file changed. Returns `true` if it did.
    pub fn check_hot_reload(&mut self) -> bool {
        if !self.core.sources_changed() {
            return false;
        }
        self.reload();
        true
    }

    fn build_passes(&mut self) {
        let (graph, plan) = build_deferred(self.level, &self.core.config);
        self.graph = graph;
        self.plan = Some(plan);
    }

    pub fn render_level(&self) -> i32 {
        self.level
    }

    /// Switches tiers. Out-of-range and unchanged levels are ignored and return `false`.
    /// Passes are rebuilt; targets are kept.
    pub fn set_render_level(&mut self, level: i32) -> bool {
        if !(0..=MAX_RENDER_LEVEL).contains(&level) || level == self.level {
            return false;
        }
        log::info!("{}: render level {} -> {}", Self::NAME, self.level, level);
        self.level = level;
        if self.plan.is_some() {
            self.build_passes();
        }
        true
    }

    pub fn increase_render_level(&mut self) -> bool {
        self.set_render_level(self.level + 1)
    }

    pub fn decrease_render_level(&mut self) -> bool {
        self.set_render_level(self.level - 1)
    }

    /// Draws one frame. Does nothing until the pipeline is ready.
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

        self.light_view.bind_to_context(scene.camera());
        let camera = self.core.camera_view(scene);
        let light_count = scene.lights().len();

        let mut ctx = FrameContext::new(
            &mut self.core.backend,
            &self.core.resources,
            scene,
            hud,
            camera,
            self.core.frame,
        );

        self.graph.run(plan.prepass, &mut ctx);

        for index in 0..light_count {
            ctx.scene.set_active_light_index(Some(index));
            let Some(position) = ctx.scene.lights().get(index).map(|l| l.position) else {
                break;
            };
            ctx.light_counter = index as u64;
            ctx.light_camera = Some(self.light_view.view_for(position));

            if let Some(shadow) = plan.shadow {
                self.graph.run(shadow, &mut ctx);
            }
            self.graph.run(plan.lighting, &mut ctx);
        }
        ctx.scene.set_active_light_index(None);
        ctx.light_camera = None;
        ctx.light_counter = light_count as u64;

        if let Some(ambient) = plan.ambient_occlusion {
            self.graph.run(ambient, &mut ctx);
        }
        self.graph.run(plan.tonemap, &mut ctx);
        plan.compositor.run(&self.graph, &mut ctx);

        drop(ctx);
        self.core.end_frame();
    }

    /// Id of the scene object under surface pixel `(x, y)`; `0` for background.
    ///
    /// Stalls until the GPU has finished the last frame. Call from input handlers only.
    pub fn object_id_at(&mut self, x: u32, y: u32) -> Option<u32> {
        self.core.pick(TargetKey::ObjectId, x, y)
    }

    /// Id of the HUD quad under surface pixel `(x, y)`; `0` where no quad was drawn.
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

    /// Frames drawn so far.
    pub fn frame_count(&self) -> u64 {
        self.core.frame
    }

    pub fn backend(&self) -> &B {
        &self.core.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.core.backend
    }

    /// Releases programs and targets and returns the backend, with uploaded meshes and
    /// textures intact.
    pub fn into_backend(self) -> B {
        self.core.into_backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, Output, RecordedPass, TextureRef};
    use crate::camera::Camera;
    use crate::scene::{BasicScene, HudQuad, Light, MeshInstance, QuadHud};
    use crate::shader::{EmbeddedShaders, ShaderSourceProvider};
    use crate::render_graph::ScreenRect;
    use glam::{Mat4, Vec3};

    fn pipeline(level: i32) -> DeferredPipeline<HeadlessBackend> {
        DeferredPipeline::new(
            HeadlessBackend::new(640, 480),
            PipelineConfig::new().initial_level(level).resolution(64),
        )
    }

    fn scene(
        pipeline: &mut DeferredPipeline<HeadlessBackend>,
        lights: &[Vec3],
    ) -> BasicScene {
        let cube = pipeline.upload_mesh(&MeshData::cube());
        let mut scene = BasicScene::new(Camera::new().at(0.0, 2.0, 8.0).looking_at(0.0, 0.0, 0.0));
        scene.add(MeshInstance::new(cube, Mat4::IDENTITY));
        scene.add(MeshInstance::new(cube, Mat4::from_translation(Vec3::X * 3.0)));
        for &position in lights {
            scene.add_light(Light::new(position));
        }
        scene
    }

    fn labelled<'a>(
        passes: &'a [RecordedPass],
        label: &'a str,
    ) -> impl Iterator<Item = &'a RecordedPass> + 'a {
        passes.iter().filter(move |p| p.label == label)
    }

    fn target_of(pipeline: &DeferredPipeline<HeadlessBackend>, key: TargetKey) -> Output {
        pipeline.resources().target(key).and_then(|t| t.output()).unwrap()
    }

    #[test]
    fn ready_after_construction() {
        let pipeline = pipeline(2);
        assert!(pipeline.is_ready());
        assert_eq!(pipeline.backend().live_programs(), DEFERRED_PROGRAMS.len());
        assert_eq!(pipeline.backend().live_targets(), DEFERRED_TARGETS.len());
    }

    #[test]
    fn render_level_round_trips() {
        let mut pipeline = pipeline(0);
        for level in [1, 2, 0, 2] {
            assert!(pipeline.set_render_level(level));
            assert_eq!(pipeline.render_level(), level);
        }
        assert!(!pipeline.set_render_level(2));
        assert!(!pipeline.set_render_level(-1));
        assert!(!pipeline.set_render_level(3));
        assert_eq!(pipeline.render_level(), 2);
        assert!(!pipeline.increase_render_level());
        assert!(pipeline.decrease_render_level());
        assert_eq!(pipeline.render_level(), 1);
    }

    #[test]
    fn level_change_keeps_targets() {
        let mut pipeline = pipeline(2);
        let before = target_of(&pipeline, TargetKey::NormalDepth);
        pipeline.set_render_level(0);
        assert_eq!(target_of(&pipeline, TargetKey::NormalDepth), before);
        assert_eq!(pipeline.backend().live_targets(), DEFERRED_TARGETS.len());
    }

    #[test]
    fn tonemap_reads_the_last_accumulation() {
        for lights in 0..5usize {
            let mut pipeline = pipeline(0);
            let positions: Vec<Vec3> = (0..lights).map(|i| Vec3::new(i as f32, 3.0, -6.0)).collect();
            let mut scene = scene(&mut pipeline, &positions);
            pipeline.draw(&mut scene, &QuadHud::new());

            let passes = pipeline.backend().passes();
            let lighting: Vec<&RecordedPass> = labelled(passes, "lighting").collect();
            assert_eq!(lighting.len(), lights);

            let expected = PingPongPair::LightAccum.keys()[(lights + 1) % 2];
            let expected = target_of(&pipeline, expected);
            if let Some(last) = lighting.last() {
                assert_eq!(last.output, expected);
            }

            let tonemap = labelled(passes, "tonemap").next().unwrap();
            let Output::Target(id) = expected else { panic!("screen") };
            assert_eq!(tonemap.inputs[1], TextureRef::Attachment { target: id, index: 0 });
        }
    }

    #[test]
    fn lighting_never_reads_its_output() {
        let mut pipeline = pipeline(2);
        let mut scene = scene(&mut pipeline, &[Vec3::Y, Vec3::X, Vec3::Z, Vec3::ONE]);
        pipeline.draw(&mut scene, &QuadHud::new());

        for pass in pipeline.backend().passes() {
            if let Output::Target(out) = pass.output {
                assert!(
                    pass.inputs.iter().all(|t| t.target() != Some(out)),
                    "'{}' reads its own output",
                    pass.label
                );
            }
        }
    }

    #[test]
    fn lighting_units_are_constant_across_levels() {
        let mut units = Vec::new();
        for level in 0..=MAX_RENDER_LEVEL {
            let mut pipeline = pipeline(level);
            let mut scene = scene(&mut pipeline, &[Vec3::Y]);
            pipeline.draw(&mut scene, &QuadHud::new());
            let lighting = labelled(pipeline.backend().passes(), "lighting").next().unwrap();
            units.push(lighting.units.clone());
        }
        assert!(units.iter().all(|u| *u == vec![0, 1, 2, 3]));
    }

    #[test]
    fn level_zero_without_lights_still_composites() {
        let mut pipeline = pipeline(0);
        let mut scene = scene(&mut pipeline, &[]);
        pipeline.draw(&mut scene, &QuadHud::new());

        let labels: Vec<&str> = pipeline.backend().passes().iter().map(|p| p.label).collect();
        assert_eq!(
            labels,
            vec![
                "normal depth",
                "world position",
                "color specular",
                "object id",
                "accumulation clear",
                "tonemap",
                "antialias",
                "hud overlay",
                "hud object id",
            ]
        );
        assert_eq!(pipeline.backend().frame_signatures().len(), 1);
    }

    #[test]
    fn shadows_follow_each_light() {
        let mut pipeline = pipeline(2);
        let lights = [
            Vec3::new(-2.0, 3.0, -6.0),
            Vec3::new(2.0, 4.0, -6.0),
            Vec3::new(0.0, 5.0, -8.0),
        ];
        let mut scene = scene(&mut pipeline, &lights);
        pipeline.draw(&mut scene, &QuadHud::new());

        let passes = pipeline.backend().passes();
        let shadows: Vec<&RecordedPass> = labelled(passes, "shadow map").collect();
        assert_eq!(shadows.len(), 3);
        for (pass, light) in shadows.iter().zip(lights) {
            assert_eq!(pass.uniforms.eye, light.extend(1.0).to_array());
        }

        let depth: Vec<&RecordedPass> = labelled(passes, "light space depth").collect();
        assert_eq!(depth.len(), 3);
        for (pass, light) in depth.iter().zip(lights) {
            assert_eq!(pass.uniforms.eye, light.extend(1.0).to_array());
            assert_eq!(pass.draw_count, 2);
        }
        assert_eq!(labelled(passes, "shadow clear").count(), 3);
        assert_eq!(scene.active_light_index(), None);
    }

    #[test]
    fn ambient_occlusion_only_from_level_one() {
        for (level, expected) in [(0, 0), (1, 1), (2, 1)] {
            let mut pipeline = pipeline(level);
            let mut scene = scene(&mut pipeline, &[Vec3::Y]);
            pipeline.draw(&mut scene, &QuadHud::new());
            let passes = pipeline.backend().passes();
            assert_eq!(labelled(passes, "ssao").count(), expected);
            assert_eq!(labelled(passes, "blur vertical").count(), expected);
        }
    }

    #[test]
    fn switching_levels_reshapes_the_next_frame() {
        let mut pipeline = pipeline(2);
        let mut scene = scene(&mut pipeline, &[Vec3::new(-2.0, 3.0, -6.0), Vec3::new(2.0, 4.0, -6.0)]);
        let normal_depth = target_of(&pipeline, TargetKey::NormalDepth);

        for level in [2, 0, 1, 2] {
            pipeline.set_render_level(level);
            pipeline.backend_mut().clear_log();
            pipeline.draw(&mut scene, &QuadHud::new());

            let passes = pipeline.backend().passes();
            let shadows = if level >= 2 { 2 } else { 0 };
            let occlusion = if level >= 1 { 1 } else { 0 };
            assert_eq!(labelled(passes, "shadow map").count(), shadows, "level {}", level);
            assert_eq!(labelled(passes, "ssao").count(), occlusion, "level {}", level);

            let lighting: Vec<&RecordedPass> = labelled(passes, "lighting").collect();
            assert_eq!(lighting.len(), 2);
            assert!(lighting.iter().all(|p| p.units == vec![0, 1, 2, 3]));

            assert_eq!(target_of(&pipeline, TargetKey::NormalDepth), normal_depth);
            assert_eq!(pipeline.backend().live_targets(), DEFERRED_TARGETS.len());
        }
    }

    #[test]
    fn repeated_frames_are_identical() {
        let mut pipeline = pipeline(2);
        let mut scene = scene(&mut pipeline, &[Vec3::new(-2.0, 3.0, -6.0), Vec3::Y]);
        let mut hud = QuadHud::new();
        hud.add(HudQuad::new(ScreenRect::new(-0.8, 0.8, 0.1, 0.1), [1.0, 0.0, 0.0, 0.5]));

        for _ in 0..3 {
            pipeline.draw(&mut scene, &hud);
        }
        let frames = pipeline.backend().frame_signatures();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], frames[1]);
        assert_eq!(frames[1], frames[2]);
        assert_ne!(frames[0], 0);
    }

    #[test]
    fn picking_decodes_object_ids() {
        let mut pipeline = pipeline(1);
        let mut scene = scene(&mut pipeline, &[Vec3::Y]);
        pipeline.draw(&mut scene, &QuadHud::new());

        let Output::Target(ids) = target_of(&pipeline, TargetKey::ObjectId) else {
            panic!("object id target missing")
        };
        let Output::Target(hud_ids) = target_of(&pipeline, TargetKey::HudObjectId) else {
            panic!("hud object id target missing")
        };
        // Surface 640x480 over 64x64 targets: (320, 240) lands on texel (32, 32).
        pipeline.backend_mut().poke(ids, 32, 32, [0x00, 0x00, 0x05, 0xFF]);
        pipeline.backend_mut().poke(hud_ids, 0, 0, [0x01, 0x00, 0x00, 0xFF]);

        assert_eq!(pipeline.object_id_at(320, 240), Some(5));
        assert_eq!(pipeline.object_id_at(0, 0), Some(0));
        assert_eq!(pipeline.hud_object_id_at(5, 5), Some(65536));
        assert_eq!(pipeline.object_id_at(640, 10), None);
    }

    #[test]
    fn hud_is_overlaid_and_picked_separately() {
        let mut pipeline = pipeline(0);
        let mut scene = scene(&mut pipeline, &[]);
        let mut hud = QuadHud::new();
        hud.add(HudQuad::new(ScreenRect::new(0.0, 0.0, 0.2, 0.1), [1.0; 4]));
        hud.add(HudQuad::new(ScreenRect::new(0.5, 0.5, 0.2, 0.1), [1.0; 4]));
        pipeline.draw(&mut scene, &hud);

        let passes = pipeline.backend().passes();
        let overlay = labelled(passes, "hud overlay").next().unwrap();
        assert_eq!(overlay.output, Output::Screen);
        assert!(!overlay.cleared);
        assert_eq!(overlay.draw_count, 2);

        let ids = labelled(passes, "hud object id").next().unwrap();
        assert_eq!(ids.output, target_of(&pipeline, TargetKey::HudObjectId));
        assert!(ids.cleared);
        assert_eq!(ids.draw_count, 2);
    }

    #[test]
    fn debug_views_are_drawn_after_antialiasing() {
        let mut pipeline = DeferredPipeline::new(
            HeadlessBackend::new(64, 64),
            PipelineConfig::new().resolution(16).debug_views(true),
        );
        let mut scene = scene(&mut pipeline, &[]);
        pipeline.draw(&mut scene, &QuadHud::new());

        let labels: Vec<&str> = pipeline.backend().passes().iter().map(|p| p.label).collect();
        let present = labels.iter().position(|l| *l == "antialias").unwrap();
        assert_eq!(&labels[present + 1..present + 5], &["debug view"; 4]);
    }

    #[test]
    fn reload_recreates_resources() {
        let mut pipeline = pipeline(2);
        let before = target_of(&pipeline, TargetKey::ObjectId);
        pipeline.reload();
        assert!(pipeline.is_ready());
        assert_ne!(target_of(&pipeline, TargetKey::ObjectId), before);
        assert_eq!(pipeline.backend().live_targets(), DEFERRED_TARGETS.len());
        assert_eq!(pipeline.backend().live_programs(), DEFERRED_PROGRAMS.len());
        assert!(!pipeline.check_hot_reload());
    }

    /// Serves the embedded sources except one program, which loses its fragment stage.
    struct Broken(EmbeddedShaders, &'static str);

    impl ShaderSourceProvider for Broken {
        fn request(&mut self, name: &str) {
            self.0.request(name);
        }

        fn poll(&mut self) -> Vec<(String, String)> {
            self.0
                .poll()
                .into_iter()
                .map(|(name, source)| {
                    if name == self.1 {
                        (name, source.replace("fn fs(", "fn broken("))
                    } else {
                        (name, source)
                    }
                })
                .collect()
        }
    }

    #[test]
    fn broken_program_fails_open() {
        let library = ShaderLibrary::new(Broken(EmbeddedShaders::new(), "ssao.wgsl"));
        let mut pipeline = DeferredPipeline::with_library(
            HeadlessBackend::new(64, 64),
            PipelineConfig::new().initial_level(1).resolution(16),
            library,
        );
        assert!(pipeline.is_ready());

        let mut scene = scene(&mut pipeline, &[Vec3::Y]);
        pipeline.draw(&mut scene, &QuadHud::new());
        let passes = pipeline.backend().passes();
        assert_eq!(labelled(passes, "ssao").count(), 0);
        assert_eq!(labelled(passes, "blur vertical").count(), 1);
        assert_eq!(labelled(passes, "antialias").count(), 1);
    }

    /// Never delivers anything.
    struct Silent;

    impl ShaderSourceProvider for Silent {
        fn request(&mut self, _name: &str) {}

        fn poll(&mut self) -> Vec<(String, String)> {
            Vec::new()
        }
    }

    #[test]
    fn nothing_is_drawn_before_sources_arrive() {
        let mut pipeline = DeferredPipeline::with_library(
            HeadlessBackend::new(64, 64),
            PipelineConfig::new().resolution(16),
            ShaderLibrary::new(Silent),
        );
        assert!(!pipeline.is_ready());

        let mut scene = scene(&mut pipeline, &[Vec3::Y]);
        pipeline.draw(&mut scene, &QuadHud::new());
        assert!(pipeline.backend().passes().is_empty());
        assert_eq!(pipeline.object_id_at(0, 0), None);
        assert!(!pipeline.poll());
    }
}
