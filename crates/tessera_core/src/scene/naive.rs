//! Brute-force intersection against every triangle.

use tessera_math::Ray;

use super::triangle::{test_triangle, Triangle, TriangleHit};
use super::Accelerator;

#[derive(Debug, Default)]
pub struct NaiveAccelerator;

impl Accelerator for NaiveAccelerator {
    fn intersect(&self, triangles: &[Triangle], ray: &Ray) -> Option<TriangleHit> {
        let mut ray = *ray;
        let mut best = None;
        for index in 0..triangles.len() {
            test_triangle(triangles, index, &mut ray, &mut best);
        }
        best
    }
}
