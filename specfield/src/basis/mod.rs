//! Spectral bases.
//!
//! A basis defines the coefficient and grid representations of a series
//! along one axis, the transforms between them, and the linear operators a
//! solver needs on the coefficients. The concrete kinds are [`Chebyshev`],
//! [`Fourier`], [`SinCos`] and [`Compound`], dispatched through
//! [`BasisEnum`].

mod chebyshev;
mod compound;
mod fourier;
mod sincos;

pub use chebyshev::Chebyshev;
pub use compound::Compound;
pub use fourier::Fourier;
pub use sincos::SinCos;

use super::array::{ArrayMut, ArrayRef, Dtype};
use super::config::{Config, Library};
use super::error::{Error, Result};
use super::sparse::CsrMatrix;
use enum_dispatch::enum_dispatch;
use float_cmp::approx_eq;
use num_complex::Complex64;

/// Parity of a series along a [`SinCos`] axis.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Parity {
    /// No definite parity; parity-aware operations refuse to act.
    Undefined,
    /// Cosine series.
    Even,
    /// Sine series.
    Odd,
}

impl Parity {
    /// The opposite parity; `Undefined` stays undefined.
    pub fn flipped(self) -> Self {
        match self {
            Self::Undefined => Self::Undefined,
            Self::Even => Self::Odd,
            Self::Odd => Self::Even,
        }
    }
}

/// Per-axis transform state carried by a field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisMeta {
    /// Grid-size multiplier along the axis.
    pub scale: f64,
    /// Series parity along the axis, meaningful for [`SinCos`] bases.
    pub parity: Parity,
}

impl AxisMeta {
    /// Unit-scale meta with the given parity.
    pub fn new(parity: Parity) -> Self {
        Self { scale: 1.0, parity }
    }
}

/// Derived dtype state, fixed once the grid dtype is known.
#[derive(Clone, Debug)]
pub(crate) struct DtypeState {
    pub grid_dtype: Dtype,
    pub coeff_dtype: Dtype,
    pub coeff_size: usize,
    pub elements: Vec<f64>,
}

/// One spectral basis along one axis.
#[enum_dispatch]
pub trait Basis {
    /// Optional user-facing name.
    fn name(&self) -> Option<&str>;
    /// Number of grid points at unit scale.
    fn base_grid_size(&self) -> usize;
    /// Spatial interval covered by the basis.
    fn interval(&self) -> (f64, f64);
    /// Dealias factor the caller should apply when evaluating products.
    fn dealias(&self) -> f64;
    /// Ratio of the problem interval to the native interval.
    fn grid_stretch(&self) -> f64;
    /// Kernel library used by the transforms.
    fn library(&self) -> Library;
    /// Overrides the kernel library.
    fn set_library(&mut self, library: Library);
    /// Applies startup configuration to this basis (and any subbases).
    fn configure(&mut self, config: &Config);
    /// Parity assigned to fresh fields along this axis.
    fn default_parity(&self) -> Parity;

    /// Fixes the coefficient dtype, size, and mode elements from the grid
    /// dtype, returning the coefficient dtype.
    fn set_dtype(&mut self, grid_dtype: Dtype) -> Result<Dtype>;
    /// Grid dtype; only valid after [`Basis::set_dtype`].
    fn grid_dtype(&self) -> Dtype;
    /// Coefficient dtype; only valid after [`Basis::set_dtype`].
    fn coeff_dtype(&self) -> Dtype;
    /// Number of stored coefficients; only valid after [`Basis::set_dtype`].
    fn coeff_size(&self) -> usize;
    /// Mode indices or stretched wavenumbers, in storage order.
    fn elements(&self) -> &[f64];

    /// Number of grid points at the given scale.
    ///
    /// # Errors
    ///
    /// Returns an error unless `scale · base_grid_size` is an integer.
    fn grid_size(&self, scale: f64) -> Result<usize>;
    /// Grid points at the given scale, in increasing order.
    fn grid(&self, scale: f64) -> Result<Vec<f64>>;

    /// Grid-to-coefficient transform along `axis`.
    fn forward(
        &self,
        gdata: &ArrayRef<'_>,
        cdata: &mut ArrayMut<'_>,
        axis: usize,
        meta: &AxisMeta,
    ) -> Result<()>;
    /// Coefficient-to-grid transform along `axis`; the grid extent is set by
    /// `meta.scale`.
    fn backward(
        &self,
        cdata: &ArrayRef<'_>,
        gdata: &mut ArrayMut<'_>,
        axis: usize,
        meta: &AxisMeta,
    ) -> Result<()>;
    /// Differentiation on coefficients, returning the parity of the result.
    fn differentiate(
        &self,
        cdata: &ArrayRef<'_>,
        out: &mut ArrayMut<'_>,
        axis: usize,
        meta: &AxisMeta,
    ) -> Result<Parity>;
    /// Definite integration over the interval, accumulated into mode 0.
    fn integrate(
        &self,
        cdata: &ArrayRef<'_>,
        out: &mut ArrayMut<'_>,
        axis: usize,
        meta: &AxisMeta,
    ) -> Result<()>;
    /// Evaluation at `position`, written into the mode-0 slot.
    fn interpolate(
        &self,
        cdata: &ArrayRef<'_>,
        out: &mut ArrayMut<'_>,
        position: f64,
        axis: usize,
        meta: &AxisMeta,
    ) -> Result<()>;

    /// Preconditioning matrix.
    fn preconditioner(&self) -> Result<CsrMatrix>;
    /// Differentiation matrix.
    fn diff_matrix(&self) -> Result<CsrMatrix>;
    /// Multiplication matrix for the `p`-th basis element of subbasis
    /// `subindex`.
    fn mult_matrix(&self, p: usize, subindex: usize) -> Result<CsrMatrix>;
    /// Continuity constraints pairing subbasis seams.
    fn match_matrix(&self) -> Result<CsrMatrix>;
    /// Left-endpoint evaluation vector.
    fn left_vector(&self) -> Result<Vec<f64>>;
    /// Right-endpoint evaluation vector.
    fn right_vector(&self) -> Result<Vec<f64>>;
    /// Boundary-row indicator vector (order of the tau term).
    fn bc_vector(&self) -> Result<Vec<f64>>;
    /// Seam-row indicator vector of a compound basis.
    fn match_vector(&self) -> Result<Vec<f64>>;
    /// Integration row vector.
    fn integ_vector(&self) -> Result<Vec<f64>>;
    /// Interpolation row vector at `position`.
    fn interp_vector(&self, position: f64) -> Result<Vec<Complex64>>;
    /// Differentiation weights of a separable basis.
    fn diff_vector(&self) -> Result<Vec<Complex64>>;
    /// Hilbert-transform weights of a separable basis.
    fn hilbert_vector(&self) -> Result<Vec<Complex64>>;
    /// Transverse differentiation constant of the `index`-th element.
    fn trans_diff(&self, index: usize) -> Result<Complex64>;
}

/// Enum over every basis kind.
#[enum_dispatch(Basis)]
#[derive(Debug)]
pub enum BasisEnum {
    /// Chebyshev polynomials on the roots grid.
    Chebyshev,
    /// Complex-exponential Fourier series.
    Fourier,
    /// Sine/cosine series of definite parity.
    SinCos,
    /// Adjacent subbases joined end to end.
    Compound,
}

// Scaled grid sizes must land on integers; shared by every basis kind.
// Rational scales evaluate a few ulps off their integer targets.
pub(crate) fn scaled_grid_size(base_grid_size: usize, scale: f64) -> Result<usize> {
    let grid_size = scale * crate::convert::exact_f64(base_grid_size);
    if !approx_eq!(f64, grid_size, grid_size.round(), ulps = 4) {
        return Err(Error::NonIntegerGridSize(grid_size));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let grid_size = grid_size.round() as usize;
    Ok(grid_size)
}

pub(crate) fn expect_axis_len(
    context: &'static str,
    shape: &[usize],
    axis: usize,
    expected: usize,
) -> Result<()> {
    if shape[axis] == expected {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            context,
            actual: shape[axis],
            expected,
        })
    }
}

/// Pad-or-truncate resize used by the polynomial-like bases: mode `n` maps to
/// mode `n`, higher modes are dropped or zero-filled. The output arrives
/// zeroed.
pub(crate) fn resize_modes<T: Copy>(input: &[T], output: &mut [T]) {
    let keep = input.len().min(output.len());
    output[..keep].copy_from_slice(&input[..keep]);
}

/// Runs a real lane kernel over complex data, component by component. The
/// real-to-real bases view complex lanes as two interleaved real series.
pub(crate) fn split_complex_lane<F>(input: &[Complex64], output: &mut [Complex64], kernel: &mut F)
where
    F: FnMut(&[f64], &mut [f64]),
{
    let mut part_in = vec![0.0; input.len()];
    let mut part_out = vec![0.0; output.len()];

    for (dst, src) in part_in.iter_mut().zip(input) {
        *dst = src.re;
    }
    kernel(&part_in, &mut part_out);
    for (dst, src) in output.iter_mut().zip(&part_out) {
        dst.re = *src;
    }

    for (dst, src) in part_in.iter_mut().zip(input) {
        *dst = src.im;
    }
    part_out.fill(0.0);
    kernel(&part_in, &mut part_out);
    for (dst, src) in output.iter_mut().zip(&part_out) {
        dst.im = *src;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_flips() {
        assert_eq!(Parity::Even.flipped(), Parity::Odd);
        assert_eq!(Parity::Odd.flipped(), Parity::Even);
        assert_eq!(Parity::Undefined.flipped(), Parity::Undefined);
    }

    #[test]
    fn scaled_sizes_must_be_integral() {
        assert_eq!(scaled_grid_size(16, 1.5).unwrap(), 24);
        assert_eq!(scaled_grid_size(10, 1.0).unwrap(), 10);
        assert!(scaled_grid_size(10, 1.55).is_err());
    }
}
