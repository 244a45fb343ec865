use tessera_math::{Color, PdfEval};

use super::{
    reflect_z_up, refract_z_up, same_direction, shading_normal_correction, BsdfType,
    EvaluateQuery, GeneralizedBsdf, SampleBidirResult, SampleQuery,
};
use crate::geometry::{SurfaceGeometry, TransportDirection};

/// Smooth dielectric interface with Fresnel-weighted specular reflection
/// and transmission.
#[derive(Debug, Clone)]
pub struct DielectricBsdf {
    /// Specular reflectance
    r: Color,
    /// Specular transmittance
    t: Color,
    external_ior: f32,
    internal_ior: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Component {
    Reflection,
    Transmission,
}

/// Fresnel evaluation at one interaction.
struct Interface {
    /// Relative index of refraction `eta_i / eta_t`
    eta: f32,
    /// Fresnel reflectance
    fr: f32,
    /// Signed cosine of the transmitted direction; zero on total internal
    /// reflection.
    cos_t: f32,
}

impl DielectricBsdf {
    pub fn new(r: Color, t: Color, external_ior: f32, internal_ior: f32) -> Self {
        Self {
            r,
            t,
            external_ior,
            internal_ior,
        }
    }

    fn interface(&self, cos_i: f32) -> Interface {
        let (eta_i, eta_t) = if cos_i > 0.0 {
            (self.external_ior, self.internal_ior)
        } else {
            (self.internal_ior, self.external_ior)
        };
        let eta = eta_i / eta_t;
        if eta_i == eta_t {
            return Interface {
                eta,
                fr: 0.0,
                cos_t: -cos_i,
            };
        }

        let cos_t_sq = 1.0 - (1.0 - cos_i * cos_i) * eta * eta;
        if cos_t_sq <= 0.0 {
            // Total internal reflection
            return Interface {
                eta,
                fr: 1.0,
                cos_t: 0.0,
            };
        }

        let ci = cos_i.abs();
        let ct = cos_t_sq.sqrt();
        let rs = (eta_i * ci - eta_t * ct) / (eta_i * ci + eta_t * ct);
        let rp = (eta_t * ci - eta_i * ct) / (eta_t * ci + eta_i * ct);
        Interface {
            eta,
            fr: 0.5 * (rs * rs + rp * rp),
            cos_t: if cos_i > 0.0 { -ct } else { ct },
        }
    }

    /// Probability of choosing `component` given the requested types.
    fn selection_probability(ty: BsdfType, component: Component, fr: f32) -> f32 {
        let use_r = ty.contains(BsdfType::SPECULAR_REFLECTION);
        let use_t = ty.contains(BsdfType::SPECULAR_TRANSMISSION);
        match (component, use_r, use_t) {
            (Component::Reflection, true, true) => fr,
            (Component::Transmission, true, true) => 1.0 - fr,
            (Component::Reflection, true, false) => 1.0,
            (Component::Transmission, false, true) => 1.0,
            _ => 0.0,
        }
    }

    /// Adjoint factor for refraction, applied only for `EL`.
    fn transmission_factor(transport_dir: TransportDirection, eta: f32) -> f32 {
        match transport_dir {
            TransportDirection::EL => eta,
            TransportDirection::LE => 1.0,
        }
    }
}

impl GeneralizedBsdf for DielectricBsdf {
    fn sample_and_estimate_direction_bidir(
        &self,
        query: &SampleQuery,
        geom: &SurfaceGeometry,
    ) -> Option<SampleBidirResult> {
        let use_r = query.ty.contains(BsdfType::SPECULAR_REFLECTION);
        let use_t = query.ty.contains(BsdfType::SPECULAR_TRANSMISSION);
        if !use_r && !use_t {
            return None;
        }

        let local_wi = geom.to_local(query.wi);
        let cos_i = local_wi.z;
        let iface = self.interface(cos_i);

        let component = if use_r && use_t {
            if query.u_comp <= iface.fr {
                Component::Reflection
            } else {
                Component::Transmission
            }
        } else if use_r {
            Component::Reflection
        } else {
            Component::Transmission
        };
        if component == Component::Transmission && iface.cos_t == 0.0 {
            return None;
        }

        let select = Self::selection_probability(query.ty, component, iface.fr);
        let dir = query.transport_dir.index();
        let inv = query.transport_dir.opposite().index();

        let (local_wo, sampled_type) = match component {
            Component::Reflection => (reflect_z_up(local_wi), BsdfType::SPECULAR_REFLECTION),
            Component::Transmission => (
                refract_z_up(local_wi, iface.eta, iface.cos_t),
                BsdfType::SPECULAR_TRANSMISSION,
            ),
        };
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

        // Selecting a single component folds its Fresnel term into the weight
        let single = !(use_r && use_t);

        let mut pdf = [PdfEval::default(); 2];
        let mut weight = [Color::ZERO; 2];
        match component {
            Component::Reflection => {
                pdf[dir] = PdfEval::projected_solid_angle(select / cos_i.abs());
                pdf[inv] = pdf[dir];
                let scale = if single { iface.fr } else { 1.0 };
                weight[dir] = self.r * (sf * scale);
                weight[inv] = self.r * (sf_inv * scale);
            }
            Component::Transmission => {
                pdf[dir] = PdfEval::projected_solid_angle(select / iface.cos_t.abs());
                pdf[inv] = PdfEval::projected_solid_angle(select / cos_i.abs());
                let scale = if single { 1.0 - iface.fr } else { 1.0 };
                let tf = Self::transmission_factor(query.transport_dir, iface.eta);
                let tf_inv = Self::transmission_factor(query.transport_dir.opposite(), 1.0 / iface.eta);
                weight[dir] = self.t * (tf * tf * sf * scale);
                weight[inv] = self.t * (tf_inv * tf_inv * sf_inv * scale);
            }
        }

        Some(SampleBidirResult {
            sampled_type,
            wo,
            weight,
            pdf,
        })
    }

    fn evaluate_direction(&self, query: &EvaluateQuery, geom: &SurfaceGeometry) -> Color {
        let local_wi = geom.to_local(query.wi);
        let local_wo = geom.to_local(query.wo);
        let cos_i = local_wi.z;
        let iface = self.interface(cos_i);

        if cos_i * local_wo.z >= 0.0 {
            if !query.ty.contains(BsdfType::SPECULAR_REFLECTION)
                || !same_direction(geom.to_world(reflect_z_up(local_wi)), query.wo)
            {
                return Color::ZERO;
            }
            let sf = shading_normal_correction(query.transport_dir, geom, local_wi, local_wo, query.wi, query.wo);
            if sf == 0.0 {
                return Color::ZERO;
            }
            return self.r * (iface.fr * sf / cos_i.abs());
        }

        if !query.ty.contains(BsdfType::SPECULAR_TRANSMISSION)
            || iface.cos_t == 0.0
            || !same_direction(
                geom.to_world(refract_z_up(local_wi, iface.eta, iface.cos_t)),
                query.wo,
            )
        {
            return Color::ZERO;
        }
        let sf = shading_normal_correction(query.transport_dir, geom, local_wi, local_wo, query.wi, query.wo);
        if sf == 0.0 {
            return Color::ZERO;
        }
        let tf = Self::transmission_factor(query.transport_dir, iface.eta);
        self.t * ((1.0 - iface.fr) * tf * tf * sf / iface.cos_t.abs())
    }

    fn evaluate_direction_pdf(&self, query: &EvaluateQuery, geom: &SurfaceGeometry) -> PdfEval {
        let local_wi = geom.to_local(query.wi);
        let local_wo = geom.to_local(query.wo);
        let cos_i = local_wi.z;
        let iface = self.interface(cos_i);

        if cos_i * local_wo.z >= 0.0 {
            if !same_direction(geom.to_world(reflect_z_up(local_wi)), query.wo) {
                return PdfEval::projected_solid_angle(0.0);
            }
            let select = Self::selection_probability(query.ty, Component::Reflection, iface.fr);
            return PdfEval::projected_solid_angle(select / cos_i.abs());
        }

        if iface.cos_t == 0.0
            || !same_direction(
                geom.to_world(refract_z_up(local_wi, iface.eta, iface.cos_t)),
                query.wo,
            )
        {
            return PdfEval::projected_solid_angle(0.0);
        }
        let select = Self::selection_probability(query.ty, Component::Transmission, iface.fr);
        PdfEval::projected_solid_angle(select / iface.cos_t.abs())
    }

    fn degenerated(&self) -> bool {
        true
    }

    fn bsdf_types(&self) -> BsdfType {
        BsdfType::SPECULAR
    }
}
