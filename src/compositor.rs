//! The last steps of every strategy: antialias the finished image onto the screen,
//! optionally show the intermediate buffers, then draw the HUD on top and into its own
//! object-id target.

use crate::backend::Blend;
use crate::config::PipelineConfig;
use crate::pipeline::TargetKey;
use crate::render_graph::{
    DepthTestSwitch, DrawMode, FrameContext, PassGraph, PassId, Placeholder, RenderPass,
    ScreenRect, TargetRef, TextureSource,
};
use crate::shader::ProgramKey;

/// Picture-in-picture rectangles for the debug views, in the lower-right corner.
pub const DEBUG_VIEW_RECTS: [ScreenRect; 4] = [
    ScreenRect::new(0.625, -0.625, 0.125, 0.125),
    ScreenRect::new(0.875, -0.625, 0.125, 0.125),
    ScreenRect::new(0.625, -0.875, 0.125, 0.125),
    ScreenRect::new(0.875, -0.875, 0.125, 0.125),
];

/// Programs the compositor runs.
pub const COMPOSITOR_PROGRAMS: [ProgramKey; 4] = [
    ProgramKey::Fxaa,
    ProgramKey::Blit,
    ProgramKey::Overlay,
    ProgramKey::ObjectIdOverlay,
];

/// Pass ids of the compositing steps inside a strategy's graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Compositor {
    present: PassId,
    debug_views: Vec<PassId>,
    hud_overlay: PassId,
    hud_object_id: PassId,
}

impl Compositor {
    /// Adds the compositing passes to `graph`.
    ///
    /// `source` is the finished low-dynamic-range image. `debug_sources` are shown in
    /// [`DEBUG_VIEW_RECTS`] order when the config enables debug views; extras are ignored.
    pub fn build(
        graph: &mut PassGraph,
        source: TargetRef,
        debug_sources: &[TargetRef],
        config: &PipelineConfig,
    ) -> Self {
        let present = graph.add(
            RenderPass::new("antialias")
                .program(ProgramKey::Fxaa)
                .target(TargetRef::Screen)
                .mode(DrawMode::NoGeometry)
                .depth_test(DepthTestSwitch::Disable)
                .rect(ScreenRect::full())
                .read(source, 0)
                .clear(config.clear_color),
        );

        let debug_views = if config.debug_views {
            debug_sources
                .iter()
                .zip(DEBUG_VIEW_RECTS)
                .map(|(&view, rect)| {
                    graph.add(
                        RenderPass::new("debug view")
                            .program(ProgramKey::Blit)
                            .target(TargetRef::Screen)
                            .mode(DrawMode::NoGeometry)
                            .rect(rect)
                            .read(view, 0),
                    )
                })
                .collect()
        } else {
            Vec::new()
        };

        // Unit 0 is overridden per quad by the HUD's own textures.
        let hud_overlay = graph.add(
            RenderPass::new("hud overlay")
                .program(ProgramKey::Overlay)
                .target(TargetRef::Screen)
                .mode(DrawMode::Hud)
                .depth_test(DepthTestSwitch::Disable)
                .input(TextureSource::Placeholder(Placeholder::White), 0)
                .blend(Blend::Alpha),
        );

        let hud_object_id = graph.add(
            RenderPass::new("hud object id")
                .program(ProgramKey::ObjectIdOverlay)
                .target(TargetRef::Fixed(TargetKey::HudObjectId))
                .mode(DrawMode::Hud)
                .depth_test(DepthTestSwitch::Disable)
                .clear([0.0; 4]),
        );

        Self {
            present,
            debug_views,
            hud_overlay,
            hud_object_id,
        }
    }

    pub fn run(&self, graph: &PassGraph, ctx: &mut FrameContext<'_>) {
        graph.run(self.present, ctx);
        for &view in &self.debug_views {
            graph.run(view, ctx);
        }
        graph.run(self.hud_overlay, ctx);
        graph.run(self.hud_object_id, ctx);
    }

    pub fn debug_view_count(&self) -> usize {
        self.debug_views.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_are_valid() {
        let mut graph = PassGraph::new();
        let config = PipelineConfig::new().debug_views(true);
        let sources = [
            TargetRef::Fixed(TargetKey::NormalDepth),
            TargetRef::Fixed(TargetKey::WorldPosition),
        ];
        let compositor = Compositor::build(
            &mut graph,
            TargetRef::Fixed(TargetKey::ForwardColor),
            &sources,
            &config,
        );
        assert_eq!(compositor.debug_view_count(), 2);
        assert_eq!(graph.len(), 5);
        assert!(graph.check_all());
    }

    #[test]
    fn debug_views_follow_config() {
        let mut graph = PassGraph::new();
        let compositor = Compositor::build(
            &mut graph,
            TargetRef::Fixed(TargetKey::ForwardColor),
            &[TargetRef::Fixed(TargetKey::NormalDepth); 6],
            &PipelineConfig::new(),
        );
        assert_eq!(compositor.debug_view_count(), 0);
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn every_strategy_compiles_the_compositor() {
        let mut graph = PassGraph::new();
        Compositor::build(
            &mut graph,
            TargetRef::Fixed(TargetKey::ForwardColor),
            &[TargetRef::Fixed(TargetKey::NormalDepth)],
            &PipelineConfig::new().debug_views(true),
        );
        for (_, pass) in graph.iter() {
            let program = pass.program.unwrap();
            assert!(COMPOSITOR_PROGRAMS.contains(&program), "{}", pass.label);
        }
        for program in COMPOSITOR_PROGRAMS {
            assert!(crate::forward::FORWARD_PROGRAMS.contains(&program));
            assert!(crate::pipeline::DEFERRED_PROGRAMS.contains(&program));
        }
    }

    #[test]
    fn debug_rects_stay_in_the_corner() {
        for rect in DEBUG_VIEW_RECTS {
            assert!(rect.x - rect.w >= 0.5 - 1e-6);
            assert!(rect.y + rect.h <= -0.5 + 1e-6);
        }
    }
}
