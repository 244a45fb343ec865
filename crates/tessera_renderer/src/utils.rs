//! Helpers shared by the path construction code.

use tessera_core::{
    BsdfType, EvaluateQuery, GeneralizedBsdf, Light, Primitive, Sampler, Scene, SurfaceGeometry,
    TransportDirection,
};
use tessera_math::{constants, luminance, Color, PdfEval, ProbabilityMeasure, Vec2, Vec3};

/// Geometry term between two points, using shading normals.
///
/// The cosine of a positionally degenerated point (a pinhole) is dropped.
/// Coincident points yield zero.
pub fn generalized_geometry_term(geom1: &SurfaceGeometry, geom2: &SurfaceGeometry) -> f32 {
    let p1p2 = geom2.p - geom1.p;
    let length2 = p1p2.length_squared();
    let length = length2.sqrt();
    if length < constants::EPS {
        return 0.0;
    }
    let d = p1p2 / length;

    let mut numerator = 1.0;
    if !geom1.degenerated {
        numerator *= geom1.sn.dot(d).abs();
    }
    if !geom2.degenerated {
        numerator *= geom2.sn.dot(-d).abs();
    }
    numerator / length2
}

/// [`generalized_geometry_term`] times the mutual visibility of the points.
pub fn generalized_geometry_term_with_visibility(
    scene: &Scene,
    geom1: &SurfaceGeometry,
    geom2: &SurfaceGeometry,
) -> f32 {
    if !scene.visible(geom1.p, geom2.p) {
        return 0.0;
    }
    generalized_geometry_term(geom1, geom2)
}

/// Surface BSDF of a primitive; emitter-only primitives have none.
pub fn surface_bsdf<'a>(scene: &'a Scene, primitive: &Primitive) -> Option<&'a dyn GeneralizedBsdf> {
    primitive.bsdf.and_then(|_| scene.generalized_bsdf(primitive))
}

/// Radiance leaving `geom` toward `wo` when the primitive is a light.
pub fn emitted_radiance(scene: &Scene, primitive: &Primitive, geom: &SurfaceGeometry, wo: Vec3) -> Color {
    let Some(id) = primitive.light else {
        return Color::ZERO;
    };
    let light = scene.light(id);
    let query = EvaluateQuery::new(BsdfType::LIGHT_DIRECTION, TransportDirection::LE, Vec3::ZERO, wo);
    light.evaluate_direction(&query, geom) * light.evaluate_position(geom)
}

/// Area density with which [`sample_light`] chooses the light-surface point `geom`.
pub fn light_position_pdf(scene: &Scene, light: &dyn Light, geom: &SurfaceGeometry) -> f32 {
    light.evaluate_position_pdf(geom).value_in(ProbabilityMeasure::Area)
        * scene.light_selection_pdf().value_in(ProbabilityMeasure::Discrete)
}

/// Point sampled on one of the scene lights.
pub struct LightSample<'a> {
    pub light: &'a dyn Light,
    pub geom: SurfaceGeometry,
    /// Area pdf including the light selection.
    pub pdf: PdfEval,
}

/// Select a light and sample a point on it. Consumes two numbers.
pub fn sample_light<'a>(scene: &'a Scene, sampler: &mut dyn Sampler) -> Option<LightSample<'a>> {
    let (id, u, selection_pdf) = scene.sample_light_selection(sampler.next())?;
    let light = scene.light(id);
    let (geom, pdf) = light.sample_position(Vec2::new(u, sampler.next()));
    Some(LightSample {
        light,
        geom,
        pdf: pdf.scaled(selection_pdf.v),
    })
}

/// Explicit connection from a surface point to a sampled light point.
pub struct LightConnection {
    /// Unit direction from the surface toward the light.
    pub direction: Vec3,
    /// `fs * G * Le / pdf`, without the path throughput.
    pub contrib: Color,
    /// Light sampling density in projected solid angle at the surface.
    pub pdf_light: f32,
    /// Density of sampling `direction` with the surface BSDF.
    pub pdf_bsdf: f32,
}

/// Sample a light and connect it to `geom`, where `bsdf` scatters
/// radiance arriving along `direction` into `wi`.
///
/// Returns `None` when the light is occluded or the contribution is zero.
pub fn connect_to_light(
    scene: &Scene,
    sampler: &mut dyn Sampler,
    bsdf: &dyn GeneralizedBsdf,
    geom: &SurfaceGeometry,
    wi: Vec3,
) -> Option<LightConnection> {
    let sample = sample_light(scene, sampler)?;
    if !scene.visible(geom.p, sample.geom.p) {
        return None;
    }
    let g = generalized_geometry_term(geom, &sample.geom);
    if g == 0.0 {
        return None;
    }
    let direction = (sample.geom.p - geom.p).normalize();

    let query = EvaluateQuery::new(BsdfType::ALL, TransportDirection::EL, wi, direction);
    let fs = bsdf.evaluate_direction(&query, geom);
    if tessera_math::is_zero(fs) {
        return None;
    }
    let pdf_bsdf = bsdf
        .evaluate_direction_pdf(&query, geom)
        .value_in(ProbabilityMeasure::ProjectedSolidAngle);

    let light_query = EvaluateQuery::new(
        BsdfType::LIGHT_DIRECTION,
        TransportDirection::LE,
        Vec3::ZERO,
        -direction,
    );
    let le = sample.light.evaluate_direction(&light_query, &sample.geom)
        * sample.light.evaluate_position(&sample.geom);
    let pdf_p = sample.pdf.value_in(ProbabilityMeasure::Area);

    Some(LightConnection {
        direction,
        contrib: fs * g * le / pdf_p,
        pdf_light: pdf_p / g,
        pdf_bsdf,
    })
}

/// Russian roulette with survival probability `min(0.5, luminance)`.
///
/// Returns the survival probability, or `None` when the path is terminated.
pub fn russian_roulette(throughput: Color, sampler: &mut dyn Sampler) -> Option<f32> {
    let p = luminance(throughput).min(0.5);
    if sampler.next() > p {
        return None;
    }
    Some(p)
}
