use tessera_math::{sampling, Color, PdfEval};

use super::{
    reflect_z_up, same_direction, shading_normal_correction, BsdfType, EvaluateQuery,
    GeneralizedBsdf, SampleBidirResult, SampleQuery,
};
use crate::geometry::SurfaceGeometry;

/// Perfect specular reflector.
#[derive(Debug, Clone)]
pub struct MirrorBsdf {
    r: Color,
}

impl MirrorBsdf {
    pub fn new(r: Color) -> Self {
        Self { r }
    }

    fn accepts(query_ty: BsdfType) -> bool {
        query_ty.contains(BsdfType::SPECULAR_REFLECTION)
    }
}

impl GeneralizedBsdf for MirrorBsdf {
    fn sample_and_estimate_direction_bidir(
        &self,
        query: &SampleQuery,
        geom: &SurfaceGeometry,
    ) -> Option<SampleBidirResult> {
        let local_wi = geom.to_local(query.wi);
        if !Self::accepts(query.ty) || sampling::cos_theta(local_wi) <= 0.0 {
            return None;
        }

        let local_wo = reflect_z_up(local_wi);
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

        let dir = query.transport_dir.index();
        let inv = query.transport_dir.opposite().index();
        let pdf = PdfEval::projected_solid_angle(1.0 / sampling::cos_theta(local_wo));
        let mut weight = [Color::ZERO; 2];
        weight[dir] = self.r * sf;
        weight[inv] = self.r * sf_inv;

        Some(SampleBidirResult {
            sampled_type: BsdfType::SPECULAR_REFLECTION,
            wo,
            weight,
            pdf: [pdf; 2],
        })
    }

    fn evaluate_direction(&self, query: &EvaluateQuery, geom: &SurfaceGeometry) -> Color {
        let local_wi = geom.to_local(query.wi);
        let local_wo = geom.to_local(query.wo);
        if !Self::accepts(query.ty)
            || sampling::cos_theta(local_wi) <= 0.0
            || sampling::cos_theta(local_wo) <= 0.0
            || !same_direction(geom.to_world(reflect_z_up(local_wi)), query.wo)
        {
            return Color::ZERO;
        }
        let sf = shading_normal_correction(query.transport_dir, geom, local_wi, local_wo, query.wi, query.wo);
        if sf == 0.0 {
            return Color::ZERO;
        }
        self.r * (sf / sampling::cos_theta(local_wi))
    }

    fn evaluate_direction_pdf(&self, query: &EvaluateQuery, geom: &SurfaceGeometry) -> PdfEval {
        let local_wi = geom.to_local(query.wi);
        let local_wo = geom.to_local(query.wo);
        if !Self::accepts(query.ty)
            || sampling::cos_theta(local_wi) <= 0.0
            || sampling::cos_theta(local_wo) <= 0.0
            || !same_direction(geom.to_world(reflect_z_up(local_wi)), query.wo)
        {
            return PdfEval::projected_solid_angle(0.0);
        }
        PdfEval::projected_solid_angle(1.0 / sampling::cos_theta(local_wo))
    }

    fn degenerated(&self) -> bool {
        true
    }

    fn bsdf_types(&self) -> BsdfType {
        BsdfType::SPECULAR_REFLECTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TransportDirection;
    use tessera_math::{Vec2, Vec3};

    #[test]
    fn test_mirror_reflects_about_normal() {
        let bsdf = MirrorBsdf::new(Color::splat(0.8));
        let geom = SurfaceGeometry::with_normal(Vec3::ZERO, Vec3::Y);
        let wi = Vec3::new(1.0, 1.0, 0.0).normalize();
        let query = SampleQuery {
            ty: BsdfType::ALL,
            sample: Vec2::ZERO,
            u_comp: 0.0,
            transport_dir: TransportDirection::LE,
            wi,
        };
        let (sample, estimate) = bsdf.sample_and_estimate_direction(&query, &geom).unwrap();
        assert!((sample.wo - Vec3::new(-1.0, 1.0, 0.0).normalize()).length() < 1e-5);
        assert!((estimate - Color::splat(0.8)).length() < 1e-5);

        let eq = EvaluateQuery::from_sample(&query, &sample);
        let f = bsdf.evaluate_direction(&eq, &geom);
        let pdf = bsdf.evaluate_direction_pdf(&eq, &geom);
        assert!((pdf.v - sample.pdf.v).abs() < 1e-4);
        assert!((f / pdf.v - estimate).length() < 1e-3);
    }
}
