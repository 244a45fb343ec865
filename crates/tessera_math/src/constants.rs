//! Numeric constants shared by the whole renderer.

/// Small epsilon used for ray offsets and degenerate-denominator checks.
pub const EPS: f32 = 1e-4;

/// Looser epsilon for comparisons that accumulate more error.
pub const EPS_LARGE: f32 = 1e-3;

pub const PI: f32 = std::f32::consts::PI;
pub const INV_PI: f32 = std::f32::consts::FRAC_1_PI;
pub const INV_TWO_PI: f32 = 0.5 * std::f32::consts::FRAC_1_PI;
pub const INV_FOUR_PI: f32 = 0.25 * std::f32::consts::FRAC_1_PI;
pub const INF: f32 = f32::INFINITY;
