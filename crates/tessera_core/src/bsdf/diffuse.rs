use std::sync::Arc;

use tessera_math::{constants, sampling, Color, PdfEval};

use super::{
    shading_normal_correction, BsdfType, EvaluateQuery, GeneralizedBsdf, SampleBidirResult,
    SampleQuery,
};
use crate::geometry::SurfaceGeometry;
use crate::texture::Texture;

/// Lambertian reflection with a texture-driven reflectance.
#[derive(Clone)]
pub struct DiffuseBsdf {
    reflectance: Arc<dyn Texture>,
}

impl DiffuseBsdf {
    pub fn new(reflectance: Arc<dyn Texture>) -> Self {
        Self { reflectance }
    }
}

impl GeneralizedBsdf for DiffuseBsdf {
    fn sample_and_estimate_direction_bidir(
        &self,
        query: &SampleQuery,
        geom: &SurfaceGeometry,
    ) -> Option<SampleBidirResult> {
        let local_wi = geom.to_local(query.wi);
        if !query.ty.contains(BsdfType::DIFFUSE_REFLECTION) || sampling::cos_theta(local_wi) <= 0.0 {
            return None;
        }

        let local_wo = sampling::cosine_sample_hemisphere(query.sample);
        let wo = geom.to_world(local_wo);

        let sf = shading_normal_correction(query.transport_dir, geom, local_wi, local_wo, query.wi, wo);
        if sf == 0.0 {
            return None;
        }
        let sf_inv = shading_normal_correction(
            query.transport_dir.opposite(),
            geom,
            local_wo,
            local_wi,
            wo,
            query.wi,
        );
        if sf_inv == 0.0 {
            return None;
        }

        let r = self.reflectance.evaluate(geom.uv);
        let dir = query.transport_dir.index();
        let inv = query.transport_dir.opposite().index();
        let mut pdf = [PdfEval::default(); 2];
        let mut weight = [Color::ZERO; 2];
        pdf[dir] = sampling::cosine_sample_hemisphere_pdf_proj_sa();
        pdf[inv] = sampling::cosine_sample_hemisphere_pdf_proj_sa();
        // f / p = (R / pi) / (1 / pi)
        weight[dir] = r * sf;
        weight[inv] = r * sf_inv;

        Some(SampleBidirResult {
            sampled_type: BsdfType::DIFFUSE_REFLECTION,
            wo,
            weight,
            pdf,
        })
    }

    fn evaluate_direction(&self, query: &EvaluateQuery, geom: &SurfaceGeometry) -> Color {
        let local_wi = geom.to_local(query.wi);
        let local_wo = geom.to_local(query.wo);
        if !query.ty.contains(BsdfType::DIFFUSE_REFLECTION)
            || sampling::cos_theta(local_wi) <= 0.0
            || sampling::cos_theta(local_wo) <= 0.0
        {
            return Color::ZERO;
        }
        let sf = shading_normal_correction(query.transport_dir, geom, local_wi, local_wo, query.wi, query.wo);
        if sf == 0.0 {
            return Color::ZERO;
        }
        self.reflectance.evaluate(geom.uv) * (constants::INV_PI * sf)
    }

    fn evaluate_direction_pdf(&self, query: &EvaluateQuery, geom: &SurfaceGeometry) -> PdfEval {
        let local_wi = geom.to_local(query.wi);
        let local_wo = geom.to_local(query.wo);
        if !query.ty.contains(BsdfType::DIFFUSE_REFLECTION)
            || sampling::cos_theta(local_wi) <= 0.0
            || sampling::cos_theta(local_wo) <= 0.0
        {
            return PdfEval::projected_solid_angle(0.0);
        }
        sampling::cosine_sample_hemisphere_pdf_proj_sa()
    }

    fn degenerated(&self) -> bool {
        false
    }

    fn bsdf_types(&self) -> BsdfType {
        BsdfType::DIFFUSE_REFLECTION
    }
}
