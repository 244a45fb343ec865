use crate::{constants, Vec3};

/// A ray with origin, unit direction, and a valid parameter range.
///
/// Hits are only reported for `t` in `[min_t, max_t]`. Shadow rays shrink
/// `max_t` to just short of the target point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub min_t: f32,
    pub max_t: f32,
}

impl Ray {
    /// Create a ray with an explicit parameter range.
    pub fn new(origin: Vec3, direction: Vec3, min_t: f32, max_t: f32) -> Self {
        Self {
            origin,
            direction,
            min_t,
            max_t,
        }
    }

    /// Create a ray starting `EPS` away from the origin and extending to infinity.
    ///
    /// This is the ray used to extend subpaths from a surface point.
    pub fn spawn(origin: Vec3, direction: Vec3) -> Self {
        Self::new(origin, direction, constants::EPS, constants::INF)
    }

    /// Create a shadow ray from `from` toward `to`, stopping just short of `to`.
    ///
    /// Returns the ray together with the distance between the two points.
    pub fn between(from: Vec3, to: Vec3) -> (Self, f32) {
        let d = to - from;
        let length = d.length();
        let ray = Self::new(
            from,
            d / length,
            constants::EPS,
            length * (1.0 - constants::EPS),
        );
        (ray, length)
    }

    /// Get the point along the ray at parameter t.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Check if `t` lies inside the ray's valid range.
    #[inline]
    pub fn contains(&self, t: f32) -> bool {
        self.min_t <= t && t <= self.max_t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_at() {
        let ray = Ray::spawn(Vec3::ZERO, Vec3::X);

        assert_eq!(ray.at(0.0), Vec3::ZERO);
        assert_eq!(ray.at(2.0), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(ray.at(-1.0), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_ray_between_stops_short() {
        let (ray, length) = Ray::between(Vec3::ZERO, Vec3::new(0.0, 0.0, 2.0));

        assert!((length - 2.0).abs() < 1e-6);
        assert!((ray.direction - Vec3::Z).length() < 1e-6);
        assert!(ray.max_t < 2.0);
        assert!(!ray.contains(2.0));
        assert!(ray.contains(1.0));
    }

    #[test]
    fn test_spawn_skips_origin() {
        let ray = Ray::spawn(Vec3::ZERO, Vec3::Y);
        assert!(!ray.contains(0.0));
        assert!(ray.contains(1e6));
    }
}
