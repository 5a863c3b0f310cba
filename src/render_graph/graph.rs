//! The pass graph and pass execution.

use std::collections::HashSet;

use super::context::FrameContext;
use super::render_pass::{DepthTestSwitch, DrawMode, RenderPass, TargetRef, TextureSource};
use super::render_target::RenderTarget;
use crate::backend::{BoundTexture, Output, PassCommand, PassUniforms, TEXTURE_UNITS, TextureRef};
use crate::light_view::shadow_matrix;
use crate::object_id::ObjectId;
use crate::scene::HudQuad;
use crate::shader::{ProgramBinding, Uniform, UniformValue};

/// Index of a pass inside its [`PassGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(usize);

impl PassId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An arena of passes with explicit dependencies.
///
/// Nothing runs implicitly: the owner calls [`run`](Self::run) on the passes it wants,
/// in the order it wants, and each call re-runs the pass's whole dependency chain. A
/// dependency shared by two top-level passes therefore runs twice.
#[derive(Debug, Default)]
pub struct PassGraph {
    passes: Vec<RenderPass>,
}

impl PassGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pass: RenderPass) -> PassId {
        self.passes.push(pass);
        PassId(self.passes.len() - 1)
    }

    pub fn get(&self, id: PassId) -> Option<&RenderPass> {
        self.passes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PassId, &RenderPass)> {
        self.passes.iter().enumerate().map(|(i, p)| (PassId(i), p))
    }

    /// Everything wrong with one pass. Empty when the pass can run.
    pub fn problems(&self, id: PassId) -> Vec<String> {
        let Some(pass) = self.get(id) else {
            return vec![format!("no pass {:?}", id)];
        };
        let mut problems = Vec::new();

        let Some(program) = pass.program else {
            problems.push("no program".to_string());
            return problems;
        };
        let Some(target) = pass.target else {
            problems.push("no target".to_string());
            return problems;
        };
        let contract = program.contract();

        if contract.samplers.len() != pass.inputs.len() {
            problems.push(format!(
                "program '{}' samples {} textures but {} are bound",
                program.name(),
                contract.samplers.len(),
                pass.inputs.len()
            ));
        }

        let mut units = HashSet::new();
        for input in &pass.inputs {
            if !units.insert(input.unit) {
                problems.push(format!("unit {} bound twice", input.unit));
            }
            if input.unit as usize >= TEXTURE_UNITS {
                problems.push(format!("unit {} out of range", input.unit));
            }
            match input.source {
                TextureSource::Target(TargetRef::Screen) => {
                    problems.push("the screen cannot be sampled".to_string())
                }
                TextureSource::Target(source) if source.aliases(target) => problems.push(
                    format!("samples its own target {:?} on unit {}", target, input.unit),
                ),
                _ => {}
            }
        }

        if contract.draws_meshes() != pass.draw_mode.draws_meshes() {
            problems.push(format!(
                "program '{}' cannot draw in {:?} mode",
                program.name(),
                pass.draw_mode
            ));
        }
        if pass.screen_rect.is_some() && contract.draws_meshes() {
            problems.push("screen rectangle on a mesh program".to_string());
        }
        if matches!(pass.draw_mode, DrawMode::LightsOnly { .. }) && pass.screen_rect.is_none() {
            problems.push("lights-only pass without a screen rectangle".to_string());
        }

        for dep in &pass.dependencies {
            if self.get(*dep).is_none() {
                problems.push(format!("unknown dependency {:?}", dep));
            }
        }
        if self.reaches(id, id, &mut HashSet::new()) {
            problems.push("dependency cycle".to_string());
        }

        problems
    }

    fn reaches(&self, from: PassId, goal: PassId, seen: &mut HashSet<PassId>) -> bool {
        let Some(pass) = self.get(from) else {
            return false;
        };
        for dep in &pass.dependencies {
            if *dep == goal {
                return true;
            }
            if seen.insert(*dep) && self.reaches(*dep, goal, seen) {
                return true;
            }
        }
        false
    }

    /// Logs the problems of one pass. Returns `true` when there are none.
    pub fn check_valid(&self, id: PassId) -> bool {
        let problems = self.problems(id);
        let label = self.get(id).map_or("?", |p| p.label);
        for problem in &problems {
            log::error!("pass '{}': {}", label, problem);
        }
        problems.is_empty()
    }

    /// Checks every pass.
    pub fn check_all(&self) -> bool {
        // Not short-circuiting, so every broken pass gets logged.
        self.iter()
            .map(|(id, _)| self.check_valid(id))
            .fold(true, |ok, valid| ok && valid)
    }

    /// Runs the dependencies of `id`, then `id` itself.
    pub fn run(&self, id: PassId, ctx: &mut FrameContext<'_>) {
        self.run_nested(id, ctx, 0);
    }

    fn run_nested(&self, id: PassId, ctx: &mut FrameContext<'_>, depth: usize) {
        let Some(pass) = self.get(id) else {
            log::error!("no pass {:?}", id);
            return;
        };
        if depth > self.passes.len() {
            log::error!("pass '{}': dependency cycle, not run", pass.label);
            return;
        }
        for dep in &pass.dependencies {
            self.run_nested(*dep, ctx, depth + 1);
        }
        execute(pass, ctx);
    }
}

fn resolve_target<'r>(target: TargetRef, ctx: &FrameContext<'r>) -> Option<&'r RenderTarget> {
    let key = target.key(ctx.light_counter, ctx.frame_counter)?;
    ctx.resources.target(key)
}

fn execute(pass: &RenderPass, ctx: &mut FrameContext<'_>) {
    let (Some(key), Some(target)) = (pass.program, pass.target) else {
        log::error!("pass '{}' has no program or target", pass.label);
        return;
    };
    let Some(program) = ctx.resources.program(key) else {
        log::warn!("pass '{}': program '{}' not loaded", pass.label, key.name());
        return;
    };
    if !ctx.backend.program_ok(program) {
        log::trace!("pass '{}' skipped, '{}' failed to compile", pass.label, key.name());
        return;
    }

    match pass.depth_test {
        DepthTestSwitch::Enable => ctx.depth_test = true,
        DepthTestSwitch::Disable => ctx.depth_test = false,
        DepthTestSwitch::NoChange => {}
    }

    let (output, (width, height)) = match target {
        TargetRef::Screen => (Output::Screen, ctx.backend.surface_size()),
        _ => {
            let resolved = resolve_target(target, ctx)
                .and_then(|t| t.output().map(|o| (o, (t.width(), t.height()))));
            match resolved {
                Some(resolved) => resolved,
                None => {
                    log::error!("pass '{}': target {:?} is not allocated", pass.label, target);
                    return;
                }
            }
        }
    };

    let mut inputs = Vec::with_capacity(pass.inputs.len());
    for input in &pass.inputs {
        let texture = match input.source {
            TextureSource::Target(source) => {
                resolve_target(source, ctx).and_then(RenderTarget::first_texture)
            }
            TextureSource::Placeholder(p) => Some(TextureRef::Texture(ctx.resources.placeholder(p))),
        };
        let Some(texture) = texture else {
            log::error!("pass '{}': nothing to bind on unit {}", pass.label, input.unit);
            return;
        };
        inputs.push(BoundTexture {
            texture,
            unit: input.unit,
        });
    }

    let view = match pass.draw_mode {
        DrawMode::CustomCamera => ctx.light_camera.unwrap_or(ctx.camera),
        _ => ctx.camera,
    };
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let uniforms = PassUniforms {
        view: view.view.to_cols_array_2d(),
        projection: view.projection.to_cols_array_2d(),
        eye: view.eye.extend(1.0).to_array(),
        resolution: [w, h, 1.0 / w, 1.0 / h],
        ..PassUniforms::default()
    };

    let mut binding = ProgramBinding::new(key, view, uniforms);
    match pass.draw_mode {
        DrawMode::FullScene => {
            if binding.declares(Uniform::LightPositions) {
                ctx.scene.draw_lights(&mut binding);
            }
            ctx.scene.draw_geometry(&mut binding);
        }
        DrawMode::CustomCamera => ctx.scene.draw_geometry(&mut binding),
        DrawMode::LightsOnly { light_space: false } => ctx.scene.draw_lights(&mut binding),
        DrawMode::LightsOnly { light_space: true } => match ctx.light_camera {
            Some(light) => {
                let matrix = shadow_matrix(&light, ctx.camera.view);
                binding.set_uniform(Uniform::ShadowMatrix, UniformValue::Mat4(matrix));
            }
            None => log::warn!("pass '{}' outside the per-light loop", pass.label),
        },
        DrawMode::NoGeometry => {}
        DrawMode::Hud => ctx.hud.draw(&mut binding),
    }
    if let Some(rect) = pass.screen_rect {
        binding.draw_quad(&HudQuad {
            rect,
            color: [1.0; 4],
            texture: None,
            object_id: ObjectId::NONE,
        });
    }

    let (mut uniforms, draws) = binding.into_parts();
    if let (DrawMode::LightsOnly { light_space: true }, Some(light)) =
        (pass.draw_mode, ctx.light_camera)
    {
        uniforms.eye = light.eye.extend(1.0).to_array();
    }

    let command = PassCommand {
        label: pass.label,
        program,
        output,
        clear: pass.clear,
        depth_test: ctx.depth_test,
        blend: pass.blend,
        inputs,
        uniforms,
        draws,
    };
    if command.has_feedback() {
        log::error!("pass '{}' samples the target it writes; skipped", pass.label);
        return;
    }
    ctx.backend.submit(&command);
}
