//! Generalized BSDF contract.
//!
//! Surface BSDFs, cameras and lights all expose the same directional
//! sampling and evaluation interface, so the path builders never need to
//! know which kind of vertex they are extending.
//!
//! Directions in queries and results are world space. `wi` always points
//! away from the surface toward where the walk came from and `wo` is the
//! propagating direction (for both transport directions).

mod dielectric;
mod diffuse;
mod mirror;

pub use dielectric::DielectricBsdf;
pub use diffuse::DiffuseBsdf;
pub use mirror::MirrorBsdf;

use std::sync::Arc;

use bitflags::bitflags;
use tessera_math::{constants, sampling, Color, PdfEval, Vec2, Vec3};

use crate::assets::{AssetError, AssetResult, Assets};
use crate::config::ConfigNode;
use crate::geometry::{SurfaceGeometry, TransportDirection};
use crate::texture::{ConstantTexture, Texture};

bitflags! {
    /// Scattering or emission components of a generalized BSDF.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BsdfType: u32 {
        const DIFFUSE_REFLECTION = 1 << 0;
        const DIFFUSE_TRANSMISSION = 1 << 1;
        const SPECULAR_REFLECTION = 1 << 2;
        const SPECULAR_TRANSMISSION = 1 << 3;
        const GLOSSY_REFLECTION = 1 << 4;
        const GLOSSY_TRANSMISSION = 1 << 5;
        const LIGHT_DIRECTION = 1 << 6;
        const EYE_DIRECTION = 1 << 7;

        const DIFFUSE = Self::DIFFUSE_REFLECTION.bits() | Self::DIFFUSE_TRANSMISSION.bits();
        const SPECULAR = Self::SPECULAR_REFLECTION.bits() | Self::SPECULAR_TRANSMISSION.bits();
        const GLOSSY = Self::GLOSSY_REFLECTION.bits() | Self::GLOSSY_TRANSMISSION.bits();
        const REFLECTION = Self::DIFFUSE_REFLECTION.bits()
            | Self::SPECULAR_REFLECTION.bits()
            | Self::GLOSSY_REFLECTION.bits();
        const TRANSMISSION = Self::DIFFUSE_TRANSMISSION.bits()
            | Self::SPECULAR_TRANSMISSION.bits()
            | Self::GLOSSY_TRANSMISSION.bits();

        const ALL_EMITTER = Self::LIGHT_DIRECTION.bits() | Self::EYE_DIRECTION.bits();
        const ALL_BSDF = Self::DIFFUSE.bits() | Self::SPECULAR.bits() | Self::GLOSSY.bits();
        const ALL = Self::ALL_EMITTER.bits() | Self::ALL_BSDF.bits();
    }
}

/// Input of the sampling functions.
#[derive(Debug, Clone, Copy)]
pub struct SampleQuery {
    /// Requested components.
    pub ty: BsdfType,
    /// Uniform sample for the direction.
    pub sample: Vec2,
    /// Uniform sample for component selection.
    pub u_comp: f32,
    pub transport_dir: TransportDirection,
    pub wi: Vec3,
}

#[derive(Debug, Clone, Copy)]
pub struct SampleResult {
    pub sampled_type: BsdfType,
    pub wo: Vec3,
    pub pdf: PdfEval,
}

/// Result of [`GeneralizedBsdf::sample_and_estimate_direction_bidir`].
///
/// `pdf` and `weight` are indexed by [`TransportDirection::index`]: the entry
/// of the query direction holds the forward values, the other entry the
/// values of sampling `wi` given `wo` in the reverse direction.
#[derive(Debug, Clone, Copy)]
pub struct SampleBidirResult {
    pub sampled_type: BsdfType,
    pub wo: Vec3,
    pub weight: [Color; 2],
    pub pdf: [PdfEval; 2],
}

#[derive(Debug, Clone, Copy)]
pub struct EvaluateQuery {
    pub ty: BsdfType,
    pub transport_dir: TransportDirection,
    pub wi: Vec3,
    pub wo: Vec3,
}

impl EvaluateQuery {
    pub fn new(ty: BsdfType, transport_dir: TransportDirection, wi: Vec3, wo: Vec3) -> Self {
        Self {
            ty,
            transport_dir,
            wi,
            wo,
        }
    }

    /// Query for re-evaluating a sampled direction.
    pub fn from_sample(query: &SampleQuery, result: &SampleResult) -> Self {
        Self::new(result.sampled_type, query.transport_dir, query.wi, result.wo)
    }
}

/// Directional sampling and evaluation shared by BSDFs, cameras and lights.
pub trait GeneralizedBsdf: Send + Sync {
    /// Sample `wo`. The pdf is in projected solid angle measure.
    fn sample_direction(&self, query: &SampleQuery, geom: &SurfaceGeometry) -> Option<SampleResult> {
        self.sample_and_estimate_direction_bidir(query, geom)
            .map(|r| SampleResult {
                sampled_type: r.sampled_type,
                wo: r.wo,
                pdf: r.pdf[query.transport_dir.index()],
            })
    }

    /// Sample `wo` and return it with `f / pdf`.
    fn sample_and_estimate_direction(
        &self,
        query: &SampleQuery,
        geom: &SurfaceGeometry,
    ) -> Option<(SampleResult, Color)> {
        let dir = query.transport_dir.index();
        self.sample_and_estimate_direction_bidir(query, geom)
            .map(|r| {
                (
                    SampleResult {
                        sampled_type: r.sampled_type,
                        wo: r.wo,
                        pdf: r.pdf[dir],
                    },
                    r.weight[dir],
                )
            })
    }

    /// Sample `wo`, additionally evaluating the reverse pdf and weight.
    fn sample_and_estimate_direction_bidir(
        &self,
        query: &SampleQuery,
        geom: &SurfaceGeometry,
    ) -> Option<SampleBidirResult>;

    /// `f` including the shading normal correction.
    fn evaluate_direction(&self, query: &EvaluateQuery, geom: &SurfaceGeometry) -> Color;

    /// Density with which `sample_direction` produces `query.wo`.
    fn evaluate_direction_pdf(&self, query: &EvaluateQuery, geom: &SurfaceGeometry) -> PdfEval;

    /// True when the directional distribution is a delta (specular).
    fn degenerated(&self) -> bool;

    fn bsdf_types(&self) -> BsdfType;
}

/// View of an implementor as a plain generalized BSDF.
///
/// Lights and cameras are stored behind their own traits; this lets the
/// path code treat every vertex uniformly.
pub trait AsGeneralizedBsdf {
    fn as_generalized_bsdf(&self) -> &dyn GeneralizedBsdf;
}

impl<T: GeneralizedBsdf> AsGeneralizedBsdf for T {
    fn as_generalized_bsdf(&self) -> &dyn GeneralizedBsdf {
        self
    }
}

/// Correction for the use of shading normals.
///
/// Returns zero when either direction lies on different sides of the
/// geometric and shading normals, which would otherwise leak light.
/// For `LE` the factor is `(sn.wi)(gn.wo) / ((gn.wi)(sn.wo))` and for `EL`
/// its reciprocal.
pub fn shading_normal_correction(
    transport_dir: TransportDirection,
    geom: &SurfaceGeometry,
    local_wi: Vec3,
    local_wo: Vec3,
    wi: Vec3,
    wo: Vec3,
) -> f32 {
    let wi_dot_ng = wi.dot(geom.gn);
    let wo_dot_ng = wo.dot(geom.gn);
    let cos_wi = sampling::cos_theta(local_wi);
    let cos_wo = sampling::cos_theta(local_wo);
    if wi_dot_ng * cos_wi <= 0.0 || wo_dot_ng * cos_wo <= 0.0 {
        return 0.0;
    }
    match transport_dir {
        TransportDirection::LE => cos_wi * wo_dot_ng / (cos_wo * wi_dot_ng),
        TransportDirection::EL => cos_wo * wi_dot_ng / (cos_wi * wo_dot_ng),
    }
}

/// Mirror reflection in the local z-up frame.
#[inline]
pub(crate) fn reflect_z_up(w: Vec3) -> Vec3 {
    Vec3::new(-w.x, -w.y, w.z)
}

/// Refraction in the local z-up frame for relative index `eta` and the
/// signed cosine of the transmitted direction.
#[inline]
pub(crate) fn refract_z_up(wi: Vec3, eta: f32, cos_t: f32) -> Vec3 {
    Vec3::new(-eta * wi.x, -eta * wi.y, cos_t)
}

/// Compare two unit directions with a tolerance wide enough to absorb
/// the round trip through the shading frame.
#[inline]
pub(crate) fn same_direction(a: Vec3, b: Vec3) -> bool {
    (a - b).abs().max_element() < constants::EPS_LARGE
}

/// Create a BSDF from its asset definition.
pub fn create(ty: &str, node: &ConfigNode<'_>, assets: &Assets) -> AssetResult<Arc<dyn GeneralizedBsdf>> {
    match ty {
        "diffuse" => {
            let reflectance = diffuse_reflectance(node, assets)?;
            Ok(Arc::new(DiffuseBsdf::new(reflectance)))
        }
        "mirror" => {
            let r = node.child_value_or_default("specular_reflectance", Color::ONE)?;
            Ok(Arc::new(MirrorBsdf::new(r)))
        }
        "dielectric" => {
            let r = node.child_value_or_default("specular_reflectance", Color::ONE)?;
            let t = node.child_value_or_default("specular_transmittance", Color::ONE)?;
            let external_ior: f32 = node.child_value_or_default("external_ior", 1.0)?;
            let internal_ior: f32 = node.child_value_or_default("internal_ior", 1.0)?;
            if external_ior <= 0.0 || internal_ior <= 0.0 {
                return Err(AssetError::Invalid {
                    kind: "bsdf",
                    message: format!("invalid index of refraction ({}, {})", external_ior, internal_ior),
                });
            }
            Ok(Arc::new(DielectricBsdf::new(r, t, external_ior, internal_ior)))
        }
        _ => Err(AssetError::UnknownType {
            kind: "bsdf",
            ty: ty.to_string(),
        }),
    }
}

/// `diffuse_reflectance` is either `{"color": ...}` or `{"texture": {"ref": ...}}`.
fn diffuse_reflectance(node: &ConfigNode<'_>, assets: &Assets) -> AssetResult<Arc<dyn Texture>> {
    let Some(element) = node.child("diffuse_reflectance") else {
        log::debug!("Element 'diffuse_reflectance' not found, using white");
        return Ok(Arc::new(ConstantTexture::new(Color::ONE)));
    };
    if let Some(id) = element.reference("texture")? {
        return Ok(Arc::clone(assets.textures.resolve(id)?));
    }
    let color = element.child_value("color")?;
    Ok(Arc::new(ConstantTexture::new(color)))
}
