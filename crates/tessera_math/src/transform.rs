// Transform utilities for Mat4
//
// Extends glam::Mat4 with the helpers the scene graph and camera need.
// glam already provides transform_point3(), transform_vector3() and inverse().

use crate::Aabb;
use glam::{Mat3, Mat4, Vec3};

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Matrix that maps object-space normals to world space
    /// (inverse transpose of the upper 3x3 block).
    fn normal_matrix(&self) -> Mat3;

    /// Transform an axis-aligned bounding box.
    /// Computes the bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;
}

impl Mat4Ext for Mat4 {
    fn normal_matrix(&self) -> Mat3 {
        Mat3::from_mat4(*self).inverse().transpose()
    }

    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        (0..8).fold(Aabb::EMPTY, |acc, i| {
            let corner = Vec3::new(
                if i & 1 == 0 { aabb.min.x } else { aabb.max.x },
                if i & 2 == 0 { aabb.min.y } else { aabb.max.y },
                if i & 4 == 0 { aabb.min.z } else { aabb.max.z },
            );
            acc.grow(self.transform_point3(corner))
        })
    }
}

/// Right-handed view matrix looking from `eye` toward `center`.
pub fn look_at(eye: Vec3, center: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(eye, center, up)
}

/// OpenGL-style perspective projection with `fovy` given in degrees.
pub fn perspective(fovy_degrees: f32, aspect: f32, z_near: f32, z_far: f32) -> Mat4 {
    Mat4::perspective_rh_gl(fovy_degrees.to_radians(), aspect, z_near, z_far)
}

/// Rotation by `angle_degrees` around `axis` (normalized here).
pub fn rotate(angle_degrees: f32, axis: Vec3) -> Mat4 {
    Mat4::from_axis_angle(axis.normalize(), angle_degrees.to_radians())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_aabb_translation() {
        let mat = Mat4::from_translation(Vec3::new(5.0, 5.0, 5.0));
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::ONE);
        let transformed = mat.transform_aabb(&aabb);

        assert!((transformed.min - Vec3::splat(5.0)).length() < 0.001);
        assert!((transformed.max - Vec3::splat(6.0)).length() < 0.001);
    }

    #[test]
    fn test_normal_matrix_under_nonuniform_scale() {
        let mat = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        // Plane x = y has normal (1, -1, 0); after scaling x by 2 it becomes (1, -2, 0)
        let n = (mat.normal_matrix() * Vec3::new(1.0, -1.0, 0.0)).normalize();
        let expected = Vec3::new(1.0, -2.0, 0.0).normalize();
        assert!((n - expected).length() < 0.001);
    }

    #[test]
    fn test_look_at_places_eye_at_origin() {
        let view = look_at(Vec3::new(2.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::Y);
        let eye = view.inverse().transform_point3(Vec3::ZERO);
        assert!((eye - Vec3::new(2.0, 1.0, 0.0)).length() < 0.001);

        // The view direction maps to -z in camera space
        let forward = view.transform_vector3(Vec3::new(-1.0, -1.0, 0.0).normalize());
        assert!((forward - Vec3::new(0.0, 0.0, -1.0)).length() < 0.001);
    }

    #[test]
    fn test_rotate_degrees() {
        let mat = rotate(90.0, Vec3::new(0.0, 0.0, 2.0));
        let v = mat.transform_vector3(Vec3::X);
        assert!((v - Vec3::Y).length() < 0.001);
    }
}
