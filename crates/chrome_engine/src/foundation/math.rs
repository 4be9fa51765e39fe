//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the handful of matrix builders the frame
//! pipeline needs. Projections use Vulkan's zero-to-one depth range.

pub use nalgebra::{Matrix4, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians * constants::RAD_TO_DEG
    }
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Create a rotation matrix around the X axis (radians)
    fn rotation_x(angle: f32) -> Mat4;

    /// Create a rotation matrix around the Y axis (radians)
    fn rotation_y(angle: f32) -> Mat4;

    /// Create a rotation matrix around the Z axis (radians)
    fn rotation_z(angle: f32) -> Mat4;

    /// Create a translation matrix
    fn translation(offset: Vec3) -> Mat4;

    /// Right-handed perspective projection with depth mapped to `[0, 1]`
    ///
    /// The camera looks down `-Z`. `fov_y` is in radians.
    fn perspective_rh_zo(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Flatten to column-major order, the layout shaders expect for a `mat4`
    fn to_cols_array(&self) -> [f32; 16];
}

impl Mat4Ext for Mat4 {
    fn rotation_x(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::x_axis(), angle)
    }

    fn rotation_y(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::y_axis(), angle)
    }

    fn rotation_z(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::z_axis(), angle)
    }

    fn translation(offset: Vec3) -> Mat4 {
        Mat4::new_translation(&offset)
    }

    fn perspective_rh_zo(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let f = 1.0 / (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = f / aspect;
        result[(1, 1)] = f;
        result[(2, 2)] = far / (near - far);
        result[(2, 3)] = -(far * near) / (far - near);
        result[(3, 2)] = -1.0;
        result
    }

    fn to_cols_array(&self) -> [f32; 16] {
        let mut out = [0.0; 16];
        out.copy_from_slice(self.as_slice());
        out
    }
}
