//! GPU resources owned by a strategy: compiled programs, offscreen targets and the
//! placeholder textures that stand in for disabled passes.

use std::collections::HashMap;

use super::targets::{TargetKey, TargetRegistry};
use crate::backend::{GpuBackend, ProgramDesc, ProgramId, TextureId};
use crate::render_graph::{Placeholder, RenderTarget};
use crate::shader::{ProgramKey, ShaderLibrary};
use crate::texture::TextureData;

/// Edge length of the ambient-occlusion rotation noise.
const NOISE_SIZE: u32 = 64;
const NOISE_SEED: u64 = 0x5EED;

/// Constant textures, uploaded once per backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placeholders {
    white: TextureId,
    black: TextureId,
    random: TextureId,
}

impl Placeholders {
    pub fn create(backend: &mut dyn GpuBackend) -> Self {
        Self {
            white: backend.create_texture(&TextureData::white()),
            black: backend.create_texture(&TextureData::black()),
            random: backend.create_texture(&TextureData::random_rotation(NOISE_SIZE, NOISE_SEED)),
        }
    }

    pub fn get(&self, placeholder: Placeholder) -> TextureId {
        match placeholder {
            Placeholder::White => self.white,
            Placeholder::Black => self.black,
            Placeholder::Random => self.random,
        }
    }
}

/// Programs and targets of one strategy.
///
/// Placeholders survive [`release`](Self::release); everything else is recreated on
/// reload.
#[derive(Debug)]
pub struct Resources {
    programs: HashMap<ProgramKey, ProgramId>,
    targets: TargetRegistry,
    placeholders: Placeholders,
}

impl Resources {
    pub fn new(backend: &mut dyn GpuBackend) -> Self {
        Self {
            programs: HashMap::new(),
            targets: TargetRegistry::new(),
            placeholders: Placeholders::create(backend),
        }
    }

    /// Compiles every program in `keys` from the library's sources. Returns how many
    /// failed; failed programs stay registered and their passes are skipped.
    pub fn compile(
        &mut self,
        keys: &[ProgramKey],
        library: &ShaderLibrary,
        backend: &mut dyn GpuBackend,
    ) -> usize {
        let mut failed = 0;
        for &key in keys {
            let Some(source) = library.program_source(key) else {
                log::error!("no source for program '{}'", key.name());
                failed += 1;
                continue;
            };
            let id = backend.create_program(&ProgramDesc {
                label: key.name(),
                source,
                uses_vertices: key.contract().draws_meshes(),
            });
            if !backend.program_ok(id) {
                log::warn!("passes using '{}' will be skipped", key.name());
                failed += 1;
            }
            if let Some(old) = self.programs.insert(key, id) {
                backend.destroy_program(old);
            }
        }
        failed
    }

    pub fn create_targets(
        &mut self,
        keys: &[TargetKey],
        resolution: u32,
        backend: &mut dyn GpuBackend,
    ) {
        self.targets.create(keys, resolution, backend);
    }

    pub fn program(&self, key: ProgramKey) -> Option<ProgramId> {
        self.programs.get(&key).copied()
    }

    pub fn target(&self, key: TargetKey) -> Option<&RenderTarget> {
        self.targets.get(key)
    }

    pub fn placeholder(&self, placeholder: Placeholder) -> TextureId {
        self.placeholders.get(placeholder)
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Destroys every program and target.
    pub fn release(&mut self, backend: &mut dyn GpuBackend) {
        for (_, id) in self.programs.drain() {
            backend.destroy_program(id);
        }
        self.targets.destroy_all(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::pipeline::FORWARD_TARGETS;

    #[test]
    fn compile_and_release() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut library = ShaderLibrary::embedded();
        library.request(&[ProgramKey::Blit, ProgramKey::Phong]);
        assert!(library.poll());

        let mut resources = Resources::new(&mut backend);
        assert_eq!(
            resources.compile(&[ProgramKey::Blit, ProgramKey::Phong], &library, &mut backend),
            0
        );
        resources.create_targets(&FORWARD_TARGETS, 16, &mut backend);
        assert_eq!(backend.live_programs(), 2);
        assert_eq!(backend.live_targets(), 3);

        // Fxaa was never requested.
        assert_eq!(resources.compile(&[ProgramKey::Fxaa], &library, &mut backend), 1);
        assert!(resources.program(ProgramKey::Fxaa).is_none());

        resources.release(&mut backend);
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(backend.live_targets(), 0);
        assert_eq!(resources.program_count(), 0);
    }

    #[test]
    fn placeholders_are_distinct() {
        let mut backend = HeadlessBackend::new(64, 64);
        let resources = Resources::new(&mut backend);
        let white = resources.placeholder(Placeholder::White);
        assert_ne!(white, resources.placeholder(Placeholder::Black));
        assert_ne!(white, resources.placeholder(Placeholder::Random));
    }
}
