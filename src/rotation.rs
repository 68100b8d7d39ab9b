use glam::{Mat3, Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Interactive orientation of a mesh.
///
/// `x`, `y` and `z` hold the accumulated angles (radians) applied around
/// the world axes. `x_axis`, `y_axis` and `z_axis` describe the arcball
/// axis, which does not need to be normalized by the caller, and `radius`
/// is the arcball parameter handed to the axis rotation as is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshRotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub x_axis: f32,
    pub y_axis: f32,
    pub z_axis: f32,
    pub radius: f32,
}

impl Default for MeshRotation {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            x_axis: 0.0,
            y_axis: 1.0,
            z_axis: 0.0,
            radius: 0.0,
        }
    }
}

impl From<&MeshRotation> for MeshRotation {
    fn from(other: &MeshRotation) -> Self {
        *other
    }
}

impl MeshRotation {
    /// Creates a rotation of `radius` around `axis` with no accumulated angles.
    pub fn new(axis: Vec3, radius: f32) -> Self {
        Self {
            x_axis: axis.x,
            y_axis: axis.y,
            z_axis: axis.z,
            radius,
            ..Self::default()
        }
    }

    pub fn set_angles(&mut self, x: f32, y: f32, z: f32) {
        self.x = x;
        self.y = y;
        self.z = z;
    }

    pub fn set_axis(&mut self, axis: Vec3) {
        self.x_axis = axis.x;
        self.y_axis = axis.y;
        self.z_axis = axis.z;
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }

    pub fn axis(&self) -> Vec3 {
        Vec3::new(self.x_axis, self.y_axis, self.z_axis)
    }

    /// Drops accumulated angles and the arcball parameter, keeping the axis.
    pub fn reset(&mut self) {
        self.set_angles(0.0, 0.0, 0.0);
        self.radius = 0.0;
    }

    pub fn is_identity(&self) -> bool {
        self.rotation_basis().abs_diff_eq(Mat3::IDENTITY, 1e-6)
    }

    /// Pure rotation (no translation) for positions.
    pub fn rotation_matrix(&self) -> Mat4 {
        Mat4::from_mat3(self.rotation_basis())
    }

    /// Matrix for normals. The basis is orthonormal, so its inverse-transpose
    /// is the basis itself.
    pub fn rotation_normal_matrix(&self) -> Mat3 {
        self.rotation_basis()
    }

    fn rotation_basis(&self) -> Mat3 {
        let accumulated =
            Mat3::from_rotation_z(self.z) * Mat3::from_rotation_y(self.y) * Mat3::from_rotation_x(self.x);
        // A degenerate axis leaves the accumulated orientation untouched.
        let arcball = self
            .axis()
            .try_normalize()
            .map(|axis| Mat3::from_axis_angle(axis, self.radius))
            .unwrap_or(Mat3::IDENTITY);
        arcball * accumulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn samples() -> Vec<MeshRotation> {
        let mut states = Vec::new();
        for (i, axis) in [
            Vec3::X,
            Vec3::new(1.0, 2.0, -3.0),
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 5.0),
        ]
        .into_iter()
        .enumerate()
        {
            let mut rotation = MeshRotation::new(axis, 0.3 * i as f32 - 0.7);
            rotation.set_angles(0.1 * i as f32, -0.4, PI * 0.25 * i as f32);
            states.push(rotation);
        }
        states
    }

    #[test]
    fn normal_matrix_is_upper_left_block() {
        for state in samples() {
            let full = state.rotation_matrix();
            assert_eq!(state.rotation_normal_matrix(), Mat3::from_mat4(full));
        }
    }

    #[test]
    fn rotation_has_no_translation() {
        for state in samples() {
            let full = state.rotation_matrix();
            assert_eq!(full.w_axis, glam::Vec4::W);
            assert!((full.determinant() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn copy_is_isolated_from_source() {
        let source = MeshRotation::new(Vec3::Y, 0.5);
        let mut copy = MeshRotation::from(&source);
        copy.set_angles(1.0, 2.0, 3.0);
        copy.set_axis(Vec3::Z);
        copy.set_radius(9.0);
        assert_eq!(source, MeshRotation::new(Vec3::Y, 0.5));
        assert_ne!(copy, source);
    }

    #[test]
    fn zero_axis_falls_back_to_accumulated_angles() {
        let mut rotation = MeshRotation::new(Vec3::ZERO, 1.3);
        assert!(rotation.is_identity());
        rotation.set_angles(0.0, FRAC_PI_2, 0.0);
        let expected = Mat4::from_rotation_y(FRAC_PI_2);
        assert!(rotation.rotation_matrix().abs_diff_eq(expected, 1e-6));
        assert!(!rotation.rotation_matrix().is_nan());
    }

    #[test]
    fn unnormalized_axis_matches_unit_axis() {
        let scaled = MeshRotation::new(Vec3::new(0.0, 0.0, 7.0), FRAC_PI_2);
        let unit = MeshRotation::new(Vec3::Z, FRAC_PI_2);
        assert!(scaled
            .rotation_matrix()
            .abs_diff_eq(unit.rotation_matrix(), 1e-6));
        let rotated = unit.rotation_matrix().transform_vector3(Vec3::X);
        assert!(rotated.abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn reset_keeps_axis() {
        let mut rotation = MeshRotation::new(Vec3::X, 2.0);
        rotation.set_angles(1.0, 1.0, 1.0);
        rotation.reset();
        assert!(rotation.is_identity());
        assert_eq!(rotation.axis(), Vec3::X);
    }
}
