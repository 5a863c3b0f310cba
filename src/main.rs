use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use deferred_shading::{
    DemoConfig, LoggingConfig, PipelineConfig, StrategyKind, StrategyLadder, WgpuBackend,
    init_logging,
};

mod demo;

use demo::{Demo, HudAction};

struct App {
    config: DemoConfig,
    kind: StrategyKind,
    window: Option<Arc<Window>>,
    ladder: Option<StrategyLadder<WgpuBackend>>,
    demo: Option<Demo>,
    cursor: PhysicalPosition<f64>,
    start_time: Instant,
}

impl App {
    fn new(config: DemoConfig, kind: StrategyKind) -> Self {
        Self {
            config,
            kind,
            window: None,
            ladder: None,
            demo: None,
            cursor: PhysicalPosition::new(0.0, 0.0),
            start_time: Instant::now(),
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(attributes)?);
        let backend = WgpuBackend::new(window.clone())?;

        let mut ladder = StrategyLadder::new(self.kind, backend, PipelineConfig::new());
        let demo = Demo::build(&mut ladder).context("no render strategy is available")?;
        log::info!(
            "started {} at level {}",
            ladder.kind().name(),
            ladder.render_level()
        );

        window.request_redraw();
        self.window = Some(window);
        self.ladder = Some(ladder);
        self.demo = Some(demo);
        Ok(())
    }

    fn raise(&mut self) {
        if let Some(ladder) = &mut self.ladder {
            if ladder.raise() {
                log::info!("{} level {}", ladder.kind().name(), ladder.render_level());
            }
        }
    }

    fn lower(&mut self) {
        if let Some(ladder) = &mut self.ladder {
            if ladder.lower() {
                log::info!("{} level {}", ladder.kind().name(), ladder.render_level());
            }
        }
    }

    /// HUD quads take the click first; anything else picks from the scene.
    fn click(&mut self) {
        let x = self.cursor.x.max(0.0) as u32;
        let y = self.cursor.y.max(0.0) as u32;
        let Some(ladder) = self.ladder.as_mut() else {
            return;
        };
        let hud_id = ladder.hud_object_id_at(x, y);
        let action = match (&self.demo, hud_id) {
            (Some(demo), Some(id)) => demo.hud_action(id),
            _ => None,
        };
        match action {
            Some(HudAction::Raise) => self.raise(),
            Some(HudAction::Lower) => self.lower(),
            None => self.pick(x, y),
        }
    }

    fn pick(&mut self, x: u32, y: u32) {
        let (Some(ladder), Some(demo)) = (&mut self.ladder, &self.demo) else {
            return;
        };
        if let Some(id) = ladder.object_id_at(x, y) {
            log::info!("picked {} at ({}, {})", demo.describe(id), x, y);
        }
    }

    fn redraw(&mut self) {
        let (Some(ladder), Some(demo)) = (&mut self.ladder, &mut self.demo) else {
            return;
        };
        ladder.check_hot_reload();
        demo.animate(self.start_time.elapsed().as_secs_f32());
        ladder.draw(&mut demo.scene, &demo.hud);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            log::error!("failed to start: {:#}", err);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(ladder) = &mut self.ladder {
                    ladder.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match key {
                        KeyCode::Escape => event_loop.exit(),
                        KeyCode::ArrowUp | KeyCode::Equal | KeyCode::NumpadAdd => self.raise(),
                        KeyCode::ArrowDown | KeyCode::Minus | KeyCode::NumpadSubtract => {
                            self.lower()
                        }
                        KeyCode::KeyR => {
                            if let Some(ladder) = &mut self.ladder {
                                ladder.reload();
                            }
                        }
                        _ => {}
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => self.cursor = position,
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.click(),
            WindowEvent::RedrawRequested => {
                self.redraw();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => (),
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    let kind = match std::env::args().nth(1) {
        Some(name) => StrategyKind::by_name(&name)?,
        None => StrategyKind::best_fit(),
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(DemoConfig::new(), kind);
    event_loop.run_app(&mut app)?;
    Ok(())
}
