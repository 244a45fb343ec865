//! Surface geometry, intersections and transport directions.

use tessera_math::{sampling, Mat3, Vec2, Vec3};

/// Direction in which a subpath carries its quantity.
///
/// `EL` walks from the eye toward the lights (radiance transport),
/// `LE` walks from the lights toward the eye (importance transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportDirection {
    EL = 0,
    LE = 1,
}

impl TransportDirection {
    /// Index into per-direction arrays such as `pdf_d` and `weight`.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            TransportDirection::EL => TransportDirection::LE,
            TransportDirection::LE => TransportDirection::EL,
        }
    }
}

/// Local geometry at a point on a surface or emitter.
///
/// `degenerated` marks a point that was sampled from a delta position
/// distribution (a pinhole camera); such a point has no usable normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceGeometry {
    pub p: Vec3,
    pub gn: Vec3,
    pub sn: Vec3,
    pub ss: Vec3,
    pub st: Vec3,
    pub uv: Vec2,
    pub degenerated: bool,
    pub shading_to_world: Mat3,
    pub world_to_shading: Mat3,
}

impl Default for SurfaceGeometry {
    fn default() -> Self {
        Self {
            p: Vec3::ZERO,
            gn: Vec3::ZERO,
            sn: Vec3::ZERO,
            ss: Vec3::ZERO,
            st: Vec3::ZERO,
            uv: Vec2::ZERO,
            degenerated: false,
            shading_to_world: Mat3::IDENTITY,
            world_to_shading: Mat3::IDENTITY,
        }
    }
}

impl SurfaceGeometry {
    /// Geometry at `p` with identical geometric and shading normal `n`.
    pub fn with_normal(p: Vec3, n: Vec3) -> Self {
        let mut geom = Self {
            p,
            gn: n,
            sn: n,
            ..Default::default()
        };
        geom.compute_tangent_space();
        geom
    }

    /// Geometry of a delta position point such as a pinhole.
    pub fn degenerated_at(p: Vec3) -> Self {
        Self {
            p,
            degenerated: true,
            ..Default::default()
        }
    }

    /// Rebuild the shading frame from `sn`.
    pub fn compute_tangent_space(&mut self) {
        let (ss, st) = sampling::orthonormal_basis(self.sn);
        self.ss = ss;
        self.st = st;
        self.shading_to_world = Mat3::from_cols(ss, st, self.sn);
        self.world_to_shading = self.shading_to_world.transpose();
    }

    #[inline]
    pub fn to_local(&self, w: Vec3) -> Vec3 {
        self.world_to_shading * w
    }

    #[inline]
    pub fn to_world(&self, w: Vec3) -> Vec3 {
        self.shading_to_world * w
    }
}

/// Result of a ray-scene query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub primitive_index: usize,
    pub triangle_index: usize,
    pub t: f32,
    pub geom: SurfaceGeometry,
}
