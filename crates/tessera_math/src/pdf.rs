//! Probability densities tagged with the measure they are defined against.

/// Measure a density value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProbabilityMeasure {
    #[default]
    None,
    SolidAngle,
    ProjectedSolidAngle,
    Area,
    Discrete,
}

/// A density value together with its measure.
///
/// Values of different measures must never be combined; the arithmetic
/// helpers check this with `debug_assert!`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PdfEval {
    pub v: f32,
    pub measure: ProbabilityMeasure,
}

impl PdfEval {
    pub const fn new(v: f32, measure: ProbabilityMeasure) -> Self {
        Self { v, measure }
    }

    pub const fn projected_solid_angle(v: f32) -> Self {
        Self::new(v, ProbabilityMeasure::ProjectedSolidAngle)
    }

    pub const fn area(v: f32) -> Self {
        Self::new(v, ProbabilityMeasure::Area)
    }

    pub const fn discrete(v: f32) -> Self {
        Self::new(v, ProbabilityMeasure::Discrete)
    }

    /// Zero density in the given measure.
    pub const fn zero(measure: ProbabilityMeasure) -> Self {
        Self::new(0.0, measure)
    }

    pub fn is_zero(&self) -> bool {
        self.v == 0.0
    }

    /// Value of the density, asserting its measure in debug builds.
    #[inline]
    pub fn value_in(&self, measure: ProbabilityMeasure) -> f32 {
        debug_assert_eq!(self.measure, measure, "pdf measure mismatch");
        self.v
    }

    /// Add two densities of the same measure.
    #[inline]
    pub fn add(self, other: PdfEval) -> PdfEval {
        debug_assert_eq!(self.measure, other.measure, "pdf measure mismatch");
        PdfEval::new(self.v + other.v, self.measure)
    }

    /// Scale a density by a discrete selection probability.
    #[inline]
    pub fn scaled(self, s: f32) -> PdfEval {
        PdfEval::new(self.v * s, self.measure)
    }
}

/// Convert a projected solid angle density at a point with cosine `cos` to
/// solid angle measure.
#[inline]
pub fn projected_to_solid_angle(pdf: PdfEval, cos: f32) -> PdfEval {
    debug_assert_eq!(pdf.measure, ProbabilityMeasure::ProjectedSolidAngle);
    PdfEval::new(pdf.v * cos.abs(), ProbabilityMeasure::SolidAngle)
}
