//! World-space triangles and the ray-triangle test shared by every
//! intersection structure.

use tessera_math::{Aabb, Ray, Vec3};

/// Triangle of a scene primitive, pre-transformed to world space.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub p1: Vec3,
    pub p2: Vec3,
    pub p3: Vec3,
    pub primitive_index: usize,
    pub face_index: usize,
}

impl Triangle {
    pub fn bounds(&self) -> Aabb {
        Aabb::from_triangle(self.p1, self.p2, self.p3)
    }

    pub fn centroid(&self) -> Vec3 {
        (self.p1 + self.p2 + self.p3) / 3.0
    }

    /// Möller-Trumbore intersection.
    ///
    /// Returns `(t, b1, b2)` where `b1` and `b2` are the barycentric weights
    /// of `p2` and `p3`.
    #[inline]
    pub fn intersect(&self, ray: &Ray) -> Option<(f32, f32, f32)> {
        let e1 = self.p2 - self.p1;
        let e2 = self.p3 - self.p1;

        let pv = ray.direction.cross(e2);
        let det = e1.dot(pv);
        if det.abs() < 1e-10 {
            return None;
        }

        let inv_det = 1.0 / det;
        let tv = ray.origin - self.p1;
        let b1 = tv.dot(pv) * inv_det;
        if !(0.0..=1.0).contains(&b1) {
            return None;
        }

        let qv = tv.cross(e1);
        let b2 = ray.direction.dot(qv) * inv_det;
        if b2 < 0.0 || b1 + b2 > 1.0 {
            return None;
        }

        let t = e2.dot(qv) * inv_det;
        if !ray.contains(t) {
            return None;
        }
        Some((t, b1, b2))
    }
}

/// Closest hit found by an intersection structure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Index into the scene triangle list.
    pub index: usize,
    pub t: f32,
    pub b1: f32,
    pub b2: f32,
}

impl TriangleHit {
    /// Ordering of candidate hits: smaller `t` first, ties broken by the
    /// lower triangle index so every structure reports the same triangle.
    #[inline]
    pub fn closer_than(&self, other: &Option<TriangleHit>) -> bool {
        match other {
            None => true,
            Some(o) => self.t < o.t || (self.t == o.t && self.index < o.index),
        }
    }
}

/// Test `triangles[index]` and keep the closer of it and `best`.
///
/// The ray range is shrunk to the current best distance.
#[inline]
pub(crate) fn test_triangle(
    triangles: &[Triangle],
    index: usize,
    ray: &mut Ray,
    best: &mut Option<TriangleHit>,
) {
    if let Some((t, b1, b2)) = triangles[index].intersect(ray) {
        let hit = TriangleHit { index, t, b1, b2 };
        if hit.closer_than(best) {
            ray.max_t = t;
            *best = Some(hit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Triangle {
        Triangle {
            p1: Vec3::new(-1.0, -1.0, -1.0),
            p2: Vec3::new(1.0, -1.0, -1.0),
            p3: Vec3::new(0.0, 1.0, -1.0),
            primitive_index: 0,
            face_index: 0,
        }
    }

    #[test]
    fn test_triangle_hit() {
        let ray = Ray::spawn(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        let (t, b1, b2) = triangle().intersect(&ray).unwrap();
        assert!((t - 1.0).abs() < 1e-6);
        assert!((b1 - 0.25).abs() < 1e-6);
        assert!((b2 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_triangle_miss() {
        let away = Ray::spawn(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        assert!(triangle().intersect(&away).is_none());

        let mut short = Ray::spawn(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        short.max_t = 0.5;
        assert!(triangle().intersect(&short).is_none());
    }

    #[test]
    fn test_tie_prefers_lower_index() {
        let a = TriangleHit { index: 3, t: 1.0, b1: 0.0, b2: 0.0 };
        let b = TriangleHit { index: 1, t: 1.0, b1: 0.0, b2: 0.0 };
        assert!(b.closer_than(&Some(a)));
        assert!(!a.closer_than(&Some(b)));
    }
}
