//! Lifecycle shared by every strategy: source acquisition, compilation, reload, frame
//! bracketing and picking readbacks.

use super::resources::Resources;
use super::targets::TargetKey;
use crate::backend::GpuBackend;
use crate::camera::CameraView;
use crate::config::PipelineConfig;
use crate::object_id::decode_object_id;
use crate::scene::Scene;
use crate::shader::{ProgramKey, ShaderLibrary};

pub(crate) struct PipelineCore<B> {
    pub(crate) backend: B,
    pub(crate) config: PipelineConfig,
    pub(crate) resources: Resources,
    pub(crate) frame: u64,
    library: ShaderLibrary,
    programs: &'static [ProgramKey],
    targets: &'static [TargetKey],
    ready: bool,
    name: &'static str,
}

impl<B: GpuBackend> PipelineCore<B> {
    pub(crate) fn new(
        name: &'static str,
        mut backend: B,
        config: PipelineConfig,
        programs: &'static [ProgramKey],
        targets: &'static [TargetKey],
    ) -> Self {
        let mut library = ShaderLibrary::from_dir(config.shader_dir.as_deref());
        library.request(programs);
        let resources = Resources::new(&mut backend);
        Self {
            backend,
            config,
            resources,
            frame: 0,
            library,
            programs,
            targets,
            ready: false,
            name,
        }
    }

    pub(crate) fn with_library(mut self, mut library: ShaderLibrary) -> Self {
        library.request(self.programs);
        self.library = library;
        self
    }

    /// Drains arrived sources and compiles once all are present. Returns `true` when
    /// this call made the pipeline ready.
    pub(crate) fn poll(&mut self) -> bool {
        if self.ready {
            return false;
        }
        self.library.poll();
        if !self.library.is_complete() {
            log::trace!("{}: waiting for {:?}", self.name, self.library.missing());
            return false;
        }

        let failed = self
            .resources
            .compile(self.programs, &self.library, &mut self.backend);
        self.resources
            .create_targets(self.targets, self.config.resolution, &mut self.backend);
        self.ready = true;
        log::info!(
            "{}: ready with {} programs ({} failed) and {} targets",
            self.name,
            self.resources.program_count(),
            failed,
            self.resources.target_count()
        );
        true
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready
    }

    /// Destroys programs and targets and requests every source again.
    pub(crate) fn reload(&mut self) {
        log::info!("{}: reloading", self.name);
        self.resources.release(&mut self.backend);
        self.ready = false;
        self.library.request(self.programs);
    }

    pub(crate) fn sources_changed(&mut self) -> bool {
        self.library.sources_changed()
    }

    /// Starts a frame. `false` when not ready or the surface is unavailable.
    pub(crate) fn begin_frame(&mut self) -> bool {
        self.ready && self.backend.begin_frame()
    }

    pub(crate) fn end_frame(&mut self) {
        self.backend.end_frame();
        self.frame += 1;
    }

    /// The scene camera at the surface's aspect ratio.
    pub(crate) fn camera_view(&self, scene: &dyn Scene) -> CameraView {
        let (width, height) = self.backend.surface_size();
        CameraView::new(scene.camera(), width.max(1) as f32 / height.max(1) as f32)
    }

    /// Reads the id under surface pixel `(x, y)` from an object-id target.
    pub(crate) fn pick(&mut self, key: TargetKey, x: u32, y: u32) -> Option<u32> {
        if !self.ready {
            return None;
        }
        let target = self.resources.target(key)?;
        let (width, height) = self.backend.surface_size();
        let tx = surface_to_texel(x, width, target.width());
        let ty = surface_to_texel(y, height, target.height());

        match target.read_pixel(&mut self.backend, tx, ty) {
            Ok(pixel) => Some(decode_object_id(pixel)),
            Err(e) => {
                log::warn!("{}: pick at ({}, {}) failed: {}", self.name, x, y, e);
                None
            }
        }
    }

    /// Releases every program and target and hands the backend back.
    pub(crate) fn into_backend(mut self) -> B {
        self.resources.release(&mut self.backend);
        self.backend
    }
}

fn surface_to_texel(coord: u32, surface: u32, texels: u32) -> u32 {
    (u64::from(coord) * u64::from(texels) / u64::from(surface.max(1))) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_coordinates_scale_to_targets() {
        assert_eq!(surface_to_texel(0, 800, 1024), 0);
        assert_eq!(surface_to_texel(400, 800, 1024), 512);
        assert_eq!(surface_to_texel(799, 800, 1024), 1022);
        assert_eq!(surface_to_texel(800, 800, 1024), 1024);
    }
}
