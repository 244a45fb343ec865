use crate::{constants, Ray, Vec3};

/// Axis-aligned bounding box used by the intersection structures.
///
/// An empty box has `min = +inf` and `max = -inf`, so growing it by any point
/// or box yields that point or box.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Static constants
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create an AABB from two corner points.
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create the bounds of a triangle.
    pub fn from_triangle(p1: Vec3, p2: Vec3, p3: Vec3) -> Self {
        Self {
            min: p1.min(p2).min(p3),
            max: p1.max(p2).max(p3),
        }
    }

    /// Create an AABB that surrounds two other AABBs.
    pub fn surrounding(a: &Aabb, b: &Aabb) -> Self {
        Self {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    /// Grow the box to contain `p`.
    pub fn grow(&self, p: Vec3) -> Self {
        Self {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn diagonal(&self) -> Vec3 {
        self.max - self.min
    }

    /// Surface area, used for the SAH cost.
    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.diagonal();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Returns the index (0=X, 1=Y, 2=Z) of the axis with the longest extent.
    pub fn longest_axis(&self) -> usize {
        let d = self.diagonal();
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Test a ray against the box with the slab method.
    ///
    /// Returns the entry and exit parameters clipped to the ray range.
    pub fn hit(&self, ray: &Ray, inv_dir: Vec3) -> Option<(f32, f32)> {
        let t0 = (self.min - ray.origin) * inv_dir;
        let t1 = (self.max - ray.origin) * inv_dir;
        let t_near = t0.min(t1).max_element().max(ray.min_t);
        let t_far = t0.max(t1).min_element().min(ray.max_t);
        if t_near <= t_far {
            Some((t_near, t_far))
        } else {
            None
        }
    }

    /// Smallest sphere centered at the box center containing the whole box.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        let center = self.centroid();
        let radius = (self.max - center).length() * (1.0 + constants::EPS_LARGE);
        BoundingSphere { center, radius }
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Sphere enclosing the scene, the support of environment emitters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    /// Intersect a ray with the sphere, returning the nearest valid distance.
    ///
    /// Rays starting inside the sphere hit its far side.
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        let oc = ray.origin - self.center;
        let b = oc.dot(ray.direction);
        let c = oc.length_squared() - self.radius * self.radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let sqrt_d = discriminant.sqrt();
        let t_near = -b - sqrt_d;
        if ray.contains(t_near) {
            return Some(t_near);
        }
        let t_far = -b + sqrt_d;
        if ray.contains(t_far) {
            return Some(t_far);
        }
        None
    }

    pub fn area(&self) -> f32 {
        4.0 * constants::PI * self.radius * self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(d: Vec3) -> Vec3 {
        Vec3::ONE / d
    }

    #[test]
    fn test_aabb_from_points() {
        let aabb = Aabb::from_points(Vec3::new(10.0, 0.0, 10.0), Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(aabb.min, Vec3::ZERO);
        assert_eq!(aabb.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_empty_grows_to_point() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        let aabb = Aabb::EMPTY.grow(p);
        assert!(Aabb::EMPTY.is_empty());
        assert!(!aabb.is_empty());
        assert_eq!(aabb.min, p);
        assert_eq!(aabb.max, p);
        assert_eq!(Aabb::EMPTY.surface_area(), 0.0);
    }

    #[test]
    fn test_aabb_hit() {
        let aabb = Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0));

        // Ray pointing at center
        let ray = Ray::spawn(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let (t0, t1) = aabb.hit(&ray, inv(ray.direction)).unwrap();
        assert!((t0 - 4.0).abs() < 1e-5);
        assert!((t1 - 6.0).abs() < 1e-5);

        // Ray pointing away
        let ray = Ray::spawn(Vec3::new(0.0, 0.0, -5.0), -Vec3::Z);
        assert!(aabb.hit(&ray, inv(ray.direction)).is_none());

        // Ray missing the box
        let ray = Ray::spawn(Vec3::new(10.0, 0.0, 0.0), Vec3::Z);
        assert!(aabb.hit(&ray, inv(ray.direction)).is_none());
    }

    #[test]
    fn test_aabb_hit_flat_box() {
        // Axis-aligned quads produce zero-thickness boxes
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0));
        let ray = Ray::spawn(Vec3::new(0.5, 0.5, 1.0), -Vec3::Z);
        assert!(aabb.hit(&ray, inv(ray.direction)).is_some());
    }

    #[test]
    fn test_aabb_longest_axis() {
        assert_eq!(Aabb::from_points(Vec3::ZERO, Vec3::new(10.0, 1.0, 1.0)).longest_axis(), 0);
        assert_eq!(Aabb::from_points(Vec3::ZERO, Vec3::new(1.0, 10.0, 1.0)).longest_axis(), 1);
        assert_eq!(Aabb::from_points(Vec3::ZERO, Vec3::new(1.0, 1.0, 10.0)).longest_axis(), 2);
    }

    #[test]
    fn test_bounding_sphere_contains_corners() {
        let aabb = Aabb::from_points(Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, 1.0, 5.0));
        let sphere = aabb.bounding_sphere();
        assert!((sphere.center - aabb.centroid()).length() < 1e-6);
        assert!((aabb.min - sphere.center).length() <= sphere.radius);
        assert!((aabb.max - sphere.center).length() <= sphere.radius);
    }

    #[test]
    fn test_sphere_hit_from_inside() {
        let sphere = BoundingSphere {
            center: Vec3::ZERO,
            radius: 2.0,
        };
        let ray = Ray::spawn(Vec3::ZERO, Vec3::X);
        let t = sphere.intersect(&ray).unwrap();
        assert!((t - 2.0).abs() < 1e-5);
    }
}
