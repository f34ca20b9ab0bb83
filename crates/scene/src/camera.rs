//! First-person camera driven by yaw/pitch angles.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3};

/// Perspective projection settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: 90.0_f32.to_radians(),
            near: 0.001,
            far: 1000.0,
        }
    }
}

impl Projection {
    /// Perspective matrix with the Vulkan Y-flip applied.
    pub fn matrix(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }
}

/// A camera for rendering the scene.
///
/// `angle.x` is the yaw and `angle.y` the pitch, both in radians. `angle.z`
/// is carried along but does not affect the view.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    pub angle: Vec3,
    /// World units per unit of movement input
    pub velocity: f32,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            angle: Vec3::ONE,
            velocity: 0.5,
            projection: Projection::default(),
        }
    }
}

impl Camera {
    pub fn new(velocity: f32, projection: Projection) -> Self {
        Self {
            velocity,
            projection,
            ..Self::default()
        }
    }

    /// Look direction.
    pub fn direction(&self) -> Vec3 {
        let (yaw, pitch) = (self.angle.x, self.angle.y);
        Vec3::new(pitch.cos() * yaw.sin(), pitch.sin(), pitch.cos() * yaw.cos())
    }

    /// Horizontal right vector.
    pub fn right(&self) -> Vec3 {
        let yaw = self.angle.x - FRAC_PI_2;
        Vec3::new(yaw.sin(), 0.0, yaw.cos())
    }

    pub fn up(&self) -> Vec3 {
        self.right().cross(self.direction())
    }

    /// Horizontal forward vector used for movement.
    pub fn forward(&self) -> Vec3 {
        Vec3::new(self.angle.x.sin(), 0.0, self.angle.x.cos())
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction(), self.up())
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection.matrix(aspect)
    }

    /// Moves `x` along right, `y` along world up and `z` along forward, each
    /// scaled by the velocity.
    pub fn change_position(&mut self, x: f32, y: f32, z: f32) {
        self.position += self.right() * x * self.velocity;
        self.position.y += y * self.velocity;
        self.position += self.forward() * z * self.velocity;
    }

    /// Velocity scaled by a per-frame speed.
    pub fn proper_velocity(&self, speed: f32) -> f32 {
        self.velocity * speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_default_camera() {
        let camera = Camera::default();
        assert_eq!(camera.position, Vec3::ZERO);
        assert_eq!(camera.angle, Vec3::ONE);
        assert_eq!(camera.velocity, 0.5);
    }

    #[test]
    fn test_direction_at_zero_angle() {
        let camera = Camera {
            angle: Vec3::ZERO,
            ..Camera::default()
        };
        assert!(camera.direction().abs_diff_eq(Vec3::Z, EPS));
        assert!(camera.right().abs_diff_eq(Vec3::NEG_X, EPS));
        assert!(camera.forward().abs_diff_eq(Vec3::Z, EPS));
        // right x direction = (-X) x Z = Y
        assert!(camera.up().abs_diff_eq(Vec3::Y, EPS));
    }

    #[test]
    fn test_direction_is_unit_length() {
        let camera = Camera::default();
        assert!((camera.direction().length() - 1.0).abs() < EPS);
        assert!(camera.right().dot(camera.direction()).abs() < EPS);
    }

    #[test]
    fn test_change_position() {
        let mut camera = Camera {
            angle: Vec3::ZERO,
            velocity: 2.0,
            ..Camera::default()
        };
        camera.change_position(1.0, 0.5, 3.0);
        assert!(camera.position.abs_diff_eq(Vec3::new(-2.0, 1.0, 6.0), EPS));
    }

    #[test]
    fn test_projection_flips_y() {
        let projection = Projection::default();
        let proj = projection.matrix(16.0 / 9.0);
        let unflipped = Mat4::perspective_rh(projection.fov_y, 16.0 / 9.0, 0.001, 1000.0);
        assert_eq!(proj.y_axis.y, -unflipped.y_axis.y);
        assert_eq!(proj.x_axis.x, unflipped.x_axis.x);
    }

    #[test]
    fn test_view_matrix_maps_eye_to_origin() {
        let camera = Camera {
            position: Vec3::new(1.0, 2.0, 3.0),
            ..Camera::default()
        };
        let eye = camera.view_matrix().transform_point3(camera.position);
        assert!(eye.abs_diff_eq(Vec3::ZERO, EPS));
    }
}
