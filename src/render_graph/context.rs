use crate::backend::GpuBackend;
use crate::camera::CameraView;
use crate::pipeline::Resources;
use crate::scene::{Hud, Scene};

/// Everything a pass needs while a frame is being drawn.
///
/// The counters select ping-pong sides, `light_camera` is set for the duration of one
/// iteration of the per-light loop, and `depth_test` carries depth state from pass to
/// pass for passes that leave it unchanged.
pub struct FrameContext<'a> {
    pub backend: &'a mut dyn GpuBackend,
    pub resources: &'a Resources,
    pub scene: &'a mut dyn Scene,
    pub hud: &'a dyn Hud,
    /// The main camera, captured once per frame.
    pub camera: CameraView,
    pub light_camera: Option<CameraView>,
    pub light_counter: u64,
    pub frame_counter: u64,
    pub depth_test: bool,
}

impl<'a> FrameContext<'a> {
    pub fn new(
        backend: &'a mut dyn GpuBackend,
        resources: &'a Resources,
        scene: &'a mut dyn Scene,
        hud: &'a dyn Hud,
        camera: CameraView,
        frame_counter: u64,
    ) -> Self {
        Self {
            backend,
            resources,
            scene,
            hud,
            camera,
            light_camera: None,
            light_counter: 0,
            frame_counter,
            depth_test: false,
        }
    }
}
