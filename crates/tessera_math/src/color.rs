use crate::Vec3;

/// Tri-stimulus linear RGB.
pub type Color = Vec3;

/// Luminance of a linear RGB value (Rec. 709 primaries).
#[inline]
pub fn luminance(c: Color) -> f32 {
    0.212671 * c.x + 0.715160 * c.y + 0.072169 * c.z
}

/// True when every channel is exactly zero.
#[inline]
pub fn is_zero(c: Color) -> bool {
    c.x == 0.0 && c.y == 0.0 && c.z == 0.0
}
