//! Sample warps from the unit square to common domains.
//!
//! Local directions use a z-up frame: `cos_theta(v) == v.z`.

use crate::{constants, PdfEval, ProbabilityMeasure, Vec2, Vec3};

/// Cosine of the angle to the local z axis.
#[inline]
pub fn cos_theta(v: Vec3) -> f32 {
    v.z
}

/// Build an orthonormal basis `(s, t)` around the unit vector `n`.
///
/// The result is deterministic in `n`, so geometry reconstructed from the
/// same normal always gets the same tangent frame.
pub fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let t = if n.x.abs() > n.y.abs() {
        Vec3::new(n.z, 0.0, -n.x).normalize()
    } else {
        Vec3::new(0.0, n.z, -n.y).normalize()
    };
    let s = t.cross(n).normalize();
    (s, t)
}

/// Shirley-Chiu concentric mapping to the unit disk.
pub fn concentric_sample_disk(u: Vec2) -> Vec2 {
    let v1 = 2.0 * u.x - 1.0;
    let v2 = 2.0 * u.y - 1.0;
    if v1 == 0.0 && v2 == 0.0 {
        return Vec2::ZERO;
    }
    let quarter = constants::PI / 4.0;
    let (r, phi) = if v1 > -v2 {
        if v1 > v2 {
            (v1, quarter * v2 / v1)
        } else {
            (v2, quarter * (2.0 - v1 / v2))
        }
    } else if v1 < v2 {
        (-v1, quarter * (4.0 + v2 / v1))
    } else {
        (-v2, quarter * (6.0 - v1 / v2))
    };
    Vec2::new(r * phi.cos(), r * phi.sin())
}

/// Cosine-weighted direction on the upper hemisphere.
pub fn cosine_sample_hemisphere(u: Vec2) -> Vec3 {
    let s = concentric_sample_disk(u);
    Vec3::new(s.x, s.y, (1.0 - s.x * s.x - s.y * s.y).max(0.0).sqrt())
}

/// Density of [`cosine_sample_hemisphere`] in solid angle measure.
pub fn cosine_sample_hemisphere_pdf(d: Vec3) -> PdfEval {
    PdfEval::new(constants::INV_PI * cos_theta(d), ProbabilityMeasure::SolidAngle)
}

/// Density of [`cosine_sample_hemisphere`] in projected solid angle measure.
pub fn cosine_sample_hemisphere_pdf_proj_sa() -> PdfEval {
    PdfEval::projected_solid_angle(constants::INV_PI)
}

/// Uniform direction on the unit sphere.
pub fn uniform_sample_sphere(u: Vec2) -> Vec3 {
    let z = 1.0 - 2.0 * u.x;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * constants::PI * u.y;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

pub fn uniform_sample_sphere_pdf() -> PdfEval {
    PdfEval::new(constants::INV_FOUR_PI, ProbabilityMeasure::SolidAngle)
}

/// Uniform barycentric coordinates `(b0, b1)` over a triangle.
///
/// The point is `p1 * (1 - b0 - b1) + p2 * b0 + p3 * b1`.
pub fn uniform_sample_triangle(u: Vec2) -> Vec2 {
    let s = u.x.max(0.0).sqrt();
    Vec2::new(1.0 - s, u.y * s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_orthonormal_basis() {
        for n in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(1.0, 2.0, -3.0).normalize()] {
            let (s, t) = orthonormal_basis(n);
            assert!(s.dot(t).abs() < 1e-5);
            assert!(s.dot(n).abs() < 1e-5);
            assert!(t.dot(n).abs() < 1e-5);
            assert!((s.length() - 1.0).abs() < 1e-5);
            // Right-handed frame (s, t, n)
            assert!((s.cross(t) - n).length() < 1e-4);
        }
    }

    #[test]
    fn test_cosine_hemisphere_is_upper_unit() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let d = cosine_sample_hemisphere(Vec2::new(rng.gen(), rng.gen()));
            assert!(d.z >= 0.0);
            assert!((d.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_uniform_sphere_mean_is_zero() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut sum = Vec3::ZERO;
        let n = 20000;
        for _ in 0..n {
            let d = uniform_sample_sphere(Vec2::new(rng.gen(), rng.gen()));
            assert!((d.length() - 1.0).abs() < 1e-4);
            sum += d;
        }
        assert!((sum / n as f32).length() < 0.03);
    }

    #[test]
    fn test_uniform_triangle_inside() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            let b = uniform_sample_triangle(Vec2::new(rng.gen(), rng.gen()));
            assert!(b.x >= 0.0 && b.y >= 0.0);
            assert!(b.x + b.y <= 1.0 + 1e-6);
        }
    }
}
