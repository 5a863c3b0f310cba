//! Interchangeable render strategies and the quality ladder across them.
//!
//! Strategies are ordered from cheapest to most expensive. [`StrategyLadder`] walks the
//! render levels of the active strategy first and moves to the neighbouring strategy at
//! either end, handing the backend over so uploaded meshes and textures survive.

use crate::backend::{GpuBackend, MeshId, TextureId};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::forward::ForwardPipeline;
use crate::mesh::MeshData;
use crate::pipeline::DeferredPipeline;
use crate::scene::{Hud, Scene};
use crate::texture::TextureData;

/// What the application shell drives every frame.
pub trait RenderStrategy<B: GpuBackend> {
    fn name(&self) -> &'static str;
    fn is_ready(&self) -> bool;
    fn poll(&mut self) -> bool;
    fn reload(&mut self);
    fn check_hot_reload(&mut self) -> bool;

    fn render_level(&self) -> i32;
    fn max_render_level(&self) -> i32;
    fn set_render_level(&mut self, level: i32) -> bool;

    fn increase_render_level(&mut self) -> bool {
        self.set_render_level(self.render_level() + 1)
    }

    fn decrease_render_level(&mut self) -> bool {
        self.set_render_level(self.render_level() - 1)
    }

    fn draw(&mut self, scene: &mut dyn Scene, hud: &dyn Hud);
    fn object_id_at(&mut self, x: u32, y: u32) -> Option<u32>;
    fn hud_object_id_at(&mut self, x: u32, y: u32) -> Option<u32>;

    fn backend(&self) -> &B;
    fn backend_mut(&mut self) -> &mut B;
    fn into_backend(self: Box<Self>) -> B;

    fn upload_mesh(&mut self, mesh: &MeshData) -> MeshId {
        self.backend_mut().create_mesh(mesh)
    }

    fn upload_texture(&mut self, texture: &TextureData) -> TextureId {
        self.backend_mut().create_texture(texture)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.backend_mut().resize(width, height);
    }
}

impl<B: GpuBackend> RenderStrategy<B> for DeferredPipeline<B> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_ready(&self) -> bool {
        DeferredPipeline::is_ready(self)
    }

    fn poll(&mut self) -> bool {
        DeferredPipeline::poll(self)
    }

    fn reload(&mut self) {
        DeferredPipeline::reload(self)
    }

    fn check_hot_reload(&mut self) -> bool {
        DeferredPipeline::check_hot_reload(self)
    }

    fn render_level(&self) -> i32 {
        DeferredPipeline::render_level(self)
    }

    fn max_render_level(&self) -> i32 {
        crate::config::MAX_RENDER_LEVEL
    }

    fn set_render_level(&mut self, level: i32) -> bool {
        DeferredPipeline::set_render_level(self, level)
    }

    fn draw(&mut self, scene: &mut dyn Scene, hud: &dyn Hud) {
        DeferredPipeline::draw(self, scene, hud)
    }

    fn object_id_at(&mut self, x: u32, y: u32) -> Option<u32> {
        DeferredPipeline::object_id_at(self, x, y)
    }

    fn hud_object_id_at(&mut self, x: u32, y: u32) -> Option<u32> {
        DeferredPipeline::hud_object_id_at(self, x, y)
    }

    fn backend(&self) -> &B {
        DeferredPipeline::backend(self)
    }

    fn backend_mut(&mut self) -> &mut B {
        DeferredPipeline::backend_mut(self)
    }

    fn into_backend(self: Box<Self>) -> B {
        DeferredPipeline::into_backend(*self)
    }
}

impl<B: GpuBackend> RenderStrategy<B> for ForwardPipeline<B> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_ready(&self) -> bool {
        ForwardPipeline::is_ready(self)
    }

    fn poll(&mut self) -> bool {
        ForwardPipeline::poll(self)
    }

    fn reload(&mut self) {
        ForwardPipeline::reload(self)
    }

    fn check_hot_reload(&mut self) -> bool {
        ForwardPipeline::check_hot_reload(self)
    }

    fn render_level(&self) -> i32 {
        0
    }

    fn max_render_level(&self) -> i32 {
        0
    }

    fn set_render_level(&mut self, level: i32) -> bool {
        ForwardPipeline::set_render_level(self, level)
    }

    fn draw(&mut self, scene: &mut dyn Scene, hud: &dyn Hud) {
        ForwardPipeline::draw(self, scene, hud)
    }

    fn object_id_at(&mut self, x: u32, y: u32) -> Option<u32> {
        ForwardPipeline::object_id_at(self, x, y)
    }

    fn hud_object_id_at(&mut self, x: u32, y: u32) -> Option<u32> {
        ForwardPipeline::hud_object_id_at(self, x, y)
    }

    fn backend(&self) -> &B {
        ForwardPipeline::backend(self)
    }

    fn backend_mut(&mut self) -> &mut B {
        ForwardPipeline::backend_mut(self)
    }

    fn into_backend(self: Box<Self>) -> B {
        ForwardPipeline::into_backend(*self)
    }
}

/// The registered strategies, cheapest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Forward,
    Deferred,
}

impl StrategyKind {
    pub const SEQUENCE: [StrategyKind; 2] = [StrategyKind::Forward, StrategyKind::Deferred];

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Forward => "simple_phong",
            StrategyKind::Deferred => "deferred_phong",
        }
    }

    pub fn by_name(name: &str) -> Result<Self, PipelineError> {
        Self::SEQUENCE
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| PipelineError::UnknownStrategy(name.to_string()))
    }

    /// The strategy every device can run.
    pub fn best_fit() -> Self {
        StrategyKind::Forward
    }

    fn position(self) -> usize {
        match self {
            StrategyKind::Forward => 0,
            StrategyKind::Deferred => 1,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::SEQUENCE.get(self.position() + 1).copied()
    }

    pub fn previous(self) -> Option<Self> {
        self.position()
            .checked_sub(1)
            .and_then(|i| Self::SEQUENCE.get(i).copied())
    }

    pub fn create<B: GpuBackend + 'static>(
        self,
        backend: B,
        config: PipelineConfig,
    ) -> Box<dyn RenderStrategy<B>> {
        match self {
            StrategyKind::Forward => Box::new(ForwardPipeline::new(backend, config)),
            StrategyKind::Deferred => Box::new(DeferredPipeline::new(backend, config)),
        }
    }
}

/// Raises and lowers quality across render levels and strategies.
pub struct StrategyLadder<B: GpuBackend + 'static> {
    kind: StrategyKind,
    config: PipelineConfig,
    strategy: Option<Box<dyn RenderStrategy<B>>>,
}

impl<B: GpuBackend + 'static> StrategyLadder<B> {
    pub fn new(kind: StrategyKind, backend: B, config: PipelineConfig) -> Self {
        log::info!("render strategy: {}", kind.name());
        Self {
            kind,
            strategy: Some(kind.create(backend, config.clone())),
            config,
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn strategy(&self) -> Option<&dyn RenderStrategy<B>> {
        self.strategy.as_deref()
    }

    pub fn strategy_mut(&mut self) -> Option<&mut (dyn RenderStrategy<B> + 'static)> {
        self.strategy.as_deref_mut()
    }

    pub fn render_level(&self) -> i32 {
        self.strategy.as_ref().map_or(0, |s| s.render_level())
    }

    /// One step up in quality. `false` at the top of the last strategy.
    pub fn raise(&mut self) -> bool {
        if let Some(strategy) = self.strategy.as_deref_mut() {
            if strategy.increase_render_level() {
                return true;
            }
        }
        match self.kind.next() {
            Some(next) => self.switch_to(next, false),
            None => false,
        }
    }

    /// One step down in quality. `false` at the bottom of the first strategy.
    pub fn lower(&mut self) -> bool {
        if let Some(strategy) = self.strategy.as_deref_mut() {
            if strategy.decrease_render_level() {
                return true;
            }
        }
        match self.kind.previous() {
            Some(previous) => self.switch_to(previous, true),
            None => false,
        }
    }

    /// Replaces the active strategy, starting at its top level when `at_top` is set and
    /// at level 0 otherwise.
    pub fn switch_to(&mut self, kind: StrategyKind, at_top: bool) -> bool {
        let Some(old) = self.strategy.take() else {
            return false;
        };
        let backend = old.into_backend();
        let config = self.config.clone().initial_level(0);
        let mut strategy = kind.create(backend, config);
        if at_top {
            while strategy.increase_render_level() {}
        }

        log::info!(
            "render strategy: {} -> {} (level {})",
            self.kind.name(),
            kind.name(),
            strategy.render_level()
        );
        self.kind = kind;
        self.strategy = Some(strategy);
        true
    }

    pub fn draw(&mut self, scene: &mut dyn Scene, hud: &dyn Hud) {
        if let Some(strategy) = self.strategy.as_deref_mut() {
            strategy.draw(scene, hud);
        }
    }

    pub fn object_id_at(&mut self, x: u32, y: u32) -> Option<u32> {
        self.strategy.as_deref_mut()?.object_id_at(x, y)
    }

    pub fn hud_object_id_at(&mut self, x: u32, y: u32) -> Option<u32> {
        self.strategy.as_deref_mut()?.hud_object_id_at(x, y)
    }

    pub fn check_hot_reload(&mut self) -> bool {
        self.strategy
            .as_deref_mut()
            .is_some_and(|s| s.check_hot_reload())
    }

    pub fn reload(&mut self) {
        if let Some(strategy) = self.strategy.as_deref_mut() {
            strategy.reload();
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(strategy) = self.strategy.as_deref_mut() {
            strategy.resize(width, height);
        }
    }

    pub fn upload_mesh(&mut self, mesh: &MeshData) -> Option<MeshId> {
        Some(self.strategy.as_deref_mut()?.upload_mesh(mesh))
    }

    pub fn upload_texture(&mut self, texture: &TextureData) -> Option<TextureId> {
        Some(self.strategy.as_deref_mut()?.upload_texture(texture))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::camera::Camera;
    use crate::config::MAX_RENDER_LEVEL;
    use crate::scene::{BasicScene, MeshInstance, QuadHud};
    use glam::Mat4;

    fn ladder(kind: StrategyKind) -> StrategyLadder<HeadlessBackend> {
        StrategyLadder::new(
            kind,
            HeadlessBackend::new(64, 64),
            PipelineConfig::new().resolution(16),
        )
    }

    #[test]
    fn sequence_navigation() {
        assert_eq!(StrategyKind::Forward.next(), Some(StrategyKind::Deferred));
        assert_eq!(StrategyKind::Deferred.next(), None);
        assert_eq!(StrategyKind::Deferred.previous(), Some(StrategyKind::Forward));
        assert_eq!(StrategyKind::Forward.previous(), None);
        assert_eq!(StrategyKind::best_fit(), StrategyKind::Forward);
    }

    #[test]
    fn lookup_by_name() {
        for kind in StrategyKind::SEQUENCE {
            assert_eq!(StrategyKind::by_name(kind.name()).unwrap(), kind);
        }
        assert!(matches!(
            StrategyKind::by_name("ray_traced"),
            Err(PipelineError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn created_strategies_report_their_names() {
        for kind in StrategyKind::SEQUENCE {
            let strategy = kind.create(HeadlessBackend::new(8, 8), PipelineConfig::new());
            assert_eq!(strategy.name(), kind.name());
            assert!(strategy.is_ready());
        }
    }

    #[test]
    fn raise_walks_levels_then_strategies() {
        let mut ladder = ladder(StrategyKind::Forward);
        assert!(ladder.raise());
        assert_eq!(ladder.kind(), StrategyKind::Deferred);
        assert_eq!(ladder.render_level(), 0);

        for level in 1..=MAX_RENDER_LEVEL {
            assert!(ladder.raise());
            assert_eq!(ladder.render_level(), level);
        }
        assert!(!ladder.raise());
    }

    #[test]
    fn lower_switches_back_at_level_zero() {
        let mut ladder = ladder(StrategyKind::Deferred);
        assert_eq!(ladder.render_level(), MAX_RENDER_LEVEL);
        for _ in 0..MAX_RENDER_LEVEL {
            assert!(ladder.lower());
        }
        assert_eq!(ladder.kind(), StrategyKind::Deferred);
        assert!(ladder.lower());
        assert_eq!(ladder.kind(), StrategyKind::Forward);
        assert!(!ladder.lower());
    }

    #[test]
    fn meshes_survive_a_switch() {
        let mut ladder = ladder(StrategyKind::Forward);
        let cube = ladder.upload_mesh(&MeshData::cube()).unwrap();
        ladder.raise();

        let mut scene = BasicScene::new(Camera::new());
        scene.add(MeshInstance::new(cube, Mat4::IDENTITY));
        ladder.draw(&mut scene, &QuadHud::new());

        let backend = ladder.strategy().unwrap().backend();
        assert_eq!(backend.mesh_count(), 1);
        let geometry = backend
            .passes()
            .iter()
            .find(|p| p.label == "normal depth")
            .unwrap();
        assert_eq!(geometry.draw_count, 1);
        assert_eq!(
            backend.live_targets(),
            crate::pipeline::DEFERRED_TARGETS.len()
        );
    }
}
