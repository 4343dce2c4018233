//! Conversions between the integer index domain (modes, grid points,
//! blocks) and the floating-point coordinate domain.

/// Ceiling division; the block-size rule rounds partial blocks up.
pub fn div_ceil(num: usize, den: usize) -> usize {
    (num + den - 1) / den
}

/// Exact `f64` of a mode number, grid index, or extent.
///
/// # Panics
///
/// Panics if the value does not fit in 32 bits; mode counts and grid
/// extents sit far below that.
pub fn exact_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).expect("index fits in 32 bits"))
}
