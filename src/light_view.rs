//! Cameras seen from a light, for rendering light-space depth.
//!
//! Each light casts shadows along one fixed direction through a square 90 degree frustum
//! rather than a full cube map.

use glam::{Mat4, Vec3};

use crate::camera::{Camera, CameraView};

/// Builds per-light cameras.
///
/// [`camera_for`](Self::camera_for) returns a fresh value every call, so the per-light
/// loop owns its light camera for exactly one iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct LightViewController {
    direction: Vec3,
    up: Vec3,
    template: Camera,
}

impl Default for LightViewController {
    fn default() -> Self {
        Self {
            direction: Vec3::Z,
            up: Vec3::Y,
            template: Camera::new().with_fov(90.0),
        }
    }
}

impl LightViewController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_direction(mut self, direction: Vec3) -> Self {
        self.direction = direction.normalize_or(Vec3::Z);
        self
    }

    pub fn with_up(mut self, up: Vec3) -> Self {
        self.up = up.normalize_or(Vec3::Y);
        self
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Takes the depth range from the scene camera. The field of view stays at 90
    /// degrees and the aspect ratio at 1.
    pub fn bind_to_context(&mut self, scene_camera: &Camera) {
        self.template = Camera::new()
            .with_fov(90.0)
            .with_depth_range(scene_camera.near, scene_camera.far);
    }

    /// A camera at `position` looking at `position + direction`.
    pub fn camera_for(&self, position: Vec3) -> Camera {
        let mut camera = self.template;
        camera.position = position;
        camera.forward = self.direction;
        camera.up = self.up;
        camera
    }

    /// View and projection through the light, at square aspect.
    pub fn view_for(&self, position: Vec3) -> CameraView {
        CameraView::new(&self.camera_for(position), 1.0)
    }
}

/// Maps a position in the main camera's view space into the light's clip space:
/// `light_projection * light_view * inverse(camera_view)`.
pub fn shadow_matrix(light: &CameraView, camera_view: Mat4) -> Mat4 {
    light.projection * light.view * camera_view.inverse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_camera_sits_on_the_light() {
        let controller = LightViewController::new();
        let position = Vec3::new(-2.0, 3.0, -6.0);
        let camera = controller.camera_for(position);
        assert_eq!(camera.position, position);
        assert_eq!(camera.forward, Vec3::Z);
        assert!((camera.fov - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn bind_keeps_square_frustum() {
        let mut controller = LightViewController::new().with_direction(Vec3::NEG_Y).with_up(Vec3::Z);
        controller.bind_to_context(&Camera::new().with_depth_range(0.5, 40.0));
        let camera = controller.camera_for(Vec3::ZERO);
        assert_eq!(camera.near, 0.5);
        assert_eq!(camera.far, 40.0);
        assert!((camera.fov - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn shadow_matrix_projects_through_light() {
        let controller = LightViewController::new();
        let light = controller.view_for(Vec3::new(0.0, 0.0, -5.0));
        let camera = Camera::new().at(3.0, 1.0, 4.0).looking_at(0.0, 0.0, 0.0);
        let camera_view = camera.view_matrix();

        // A world point straight ahead of the light lands in the middle of its frustum.
        let world = Vec3::new(0.0, 0.0, 0.0);
        let in_camera = camera_view.transform_point3(world);
        let clip = shadow_matrix(&light, camera_view) * in_camera.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
