use glam::{Mat4, Vec3};

/// A perspective camera for 3D scenes.
///
/// Provides position, orientation, and field of view. The aspect ratio is supplied when a
/// [`CameraView`] is taken, so the same camera can be viewed through the window or through
/// a square light target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub fov: f32, // radians, vertical
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = Vec3::new(x, y, z);
        self
    }

    pub fn looking_at(mut self, target_x: f32, target_y: f32, target_z: f32) -> Self {
        let forward = Vec3::new(target_x, target_y, target_z) - self.position;
        self.forward = forward.normalize_or(Vec3::NEG_Z);
        self
    }

    pub fn looking_along(mut self, direction: Vec3) -> Self {
        self.forward = direction.normalize_or(Vec3::NEG_Z);
        self
    }

    pub fn with_up(mut self, up: Vec3) -> Self {
        self.up = up.normalize_or(Vec3::Y);
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees.to_radians();
        self
    }

    pub fn with_depth_range(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Compute the right vector from forward and up.
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalize_or_zero()
    }

    /// World-to-camera transform.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    /// Camera-to-clip transform for the given aspect ratio (width / height).
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect.max(f32::EPSILON), self.near, self.far)
    }
}

/// The matrices a pass renders with, captured once per frame (or per light).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraView {
    pub view: Mat4,
    pub projection: Mat4,
    pub eye: Vec3,
}

impl CameraView {
    pub fn new(camera: &Camera, aspect: f32) -> Self {
        Self {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(aspect),
            eye: camera.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_moves_eye_to_origin() {
        let camera = Camera::new().at(1.0, 2.0, 3.0).looking_at(0.0, 0.0, 0.0);
        let eye_in_view = camera.view_matrix().transform_point3(camera.position);
        assert!(eye_in_view.length() < 1e-5);
    }

    #[test]
    fn forward_maps_to_negative_z() {
        let camera = Camera::new().at(0.0, 0.0, 0.0).looking_along(Vec3::X);
        let ahead = camera.view_matrix().transform_point3(Vec3::new(4.0, 0.0, 0.0));
        assert!((ahead - Vec3::new(0.0, 0.0, -4.0)).length() < 1e-5);
    }
}
