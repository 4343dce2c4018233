//! Chebyshev polynomial basis on the roots grid.

use super::{
    expect_axis_len, resize_modes, scaled_grid_size, split_complex_lane, AxisMeta, Basis,
    DtypeState, Parity,
};
use crate::array::{ArrayMut, ArrayRef, Dtype};
use crate::config::{Config, Library};
use crate::error::{Error, Result};
use crate::plan::{self, PlanCache};
use crate::sparse::CsrMatrix;
use crate::convert::exact_f64;
use num_complex::Complex64;

use std::f64::consts::PI;
use std::ops::{Add, Mul};

/// Chebyshev polynomial basis on the transformed roots grid
/// `x_k = c − r·cos(π(k+½)/N)`.
#[derive(Debug)]
pub struct Chebyshev {
    name: Option<String>,
    base_grid_size: usize,
    interval: (f64, f64),
    dealias: f64,
    library: Option<Library>,
    plans: PlanCache,
    state: Option<DtypeState>,
}

impl Chebyshev {
    /// Creates a Chebyshev basis of `base_grid_size` points on `interval`.
    pub fn new(base_grid_size: usize, interval: (f64, f64)) -> Self {
        Self {
            name: None,
            base_grid_size,
            interval,
            dealias: 1.0,
            library: None,
            plans: PlanCache::new(Config::default().rigor),
            state: None,
        }
    }

    /// Sets the dealias factor.
    pub fn with_dealias(mut self, dealias: f64) -> Self {
        self.dealias = dealias;
        self
    }

    /// Names the basis for lookup through the domain.
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    fn radius(&self) -> f64 {
        (self.interval.1 - self.interval.0) / 2.0
    }

    fn center(&self) -> f64 {
        (self.interval.1 + self.interval.0) / 2.0
    }

    // Native interval: (-1, 1).
    fn native_coord(&self, problem: f64) -> f64 {
        (problem - self.center()) / self.radius()
    }

    fn state(&self) -> &DtypeState {
        self.state.as_ref().expect("dtype set by the domain")
    }

    fn forward_lane(&self, gdata: &[f64], cdata: &mut [f64]) {
        let n = gdata.len();
        if n == 0 {
            return;
        }
        let mut temp = gdata.to_vec();
        match self.library() {
            Library::Planned => self.plans.dct(n).process_dct2(&mut temp),
            Library::Direct => plan::direct_dct2(&mut temp),
        }
        // Scale as Chebyshev amplitudes; negate odd modes for the natural
        // grid ordering.
        let norm = 2.0 / exact_f64(n);
        temp[0] *= 0.5;
        for (k, value) in temp.iter_mut().enumerate() {
            *value *= if k % 2 == 0 { norm } else { -norm };
        }
        resize_modes(&temp, cdata);
    }

    fn backward_lane(&self, cdata: &[f64], gdata: &mut [f64]) {
        let n = gdata.len();
        if n == 0 {
            return;
        }
        let mut temp = vec![0.0; n];
        resize_modes(cdata, &mut temp);
        // Undo the amplitude scaling ahead of the inverse kernel.
        temp[0] *= 2.0;
        for (k, value) in temp.iter_mut().enumerate().skip(1) {
            if k % 2 == 1 {
                *value = -*value;
            }
        }
        match self.library() {
            Library::Planned => self.plans.dct(n).process_dct3(&mut temp),
            Library::Direct => plan::direct_dct3(&mut temp),
        }
        gdata.copy_from_slice(&temp);
    }

    fn check_dtypes(&self, gdata: Dtype, cdata: Dtype) -> Result<()> {
        let state = self.state();
        if gdata != state.grid_dtype {
            return Err(Error::DtypeMismatch { context: "gdata" });
        }
        if cdata != state.coeff_dtype {
            return Err(Error::DtypeMismatch { context: "cdata" });
        }
        Ok(())
    }
}

// Differentiation by backward recursion:
// b_N = 0; b_{N-1} = 2N·a_N; b_i = 2(i+1)·a_{i+1} + b_{i+2}; b_0 = a_1 + b_2/2.
fn diff_lane<T>(a: &[T], b: &mut [T], stretch: f64)
where
    T: Copy + Default + Add<Output = T> + Mul<f64, Output = T>,
{
    let n = a.len();
    if n == 0 {
        return;
    }
    let top = n - 1;
    b[top] = T::default();
    if top == 0 {
        return;
    }
    b[top - 1] = a[top] * (2.0 * exact_f64(top));
    for i in (1..top.saturating_sub(1)).rev() {
        b[i] = a[i + 1] * (2.0 * exact_f64(i + 1)) + b[i + 2];
    }
    if n > 2 {
        b[0] = a[1] + b[2] * 0.5;
    } else {
        b[0] = a[1];
    }
    for value in b.iter_mut() {
        *value = *value * (1.0 / stretch);
    }
}

// ∫ T_n over the native interval: 2/(1−n²) for even n, 0 for odd n.
fn integ_weight(n: usize) -> f64 {
    if n % 2 == 0 {
        let nf = exact_f64(n);
        2.0 / (1.0 - nf * nf)
    } else {
        0.0
    }
}

fn integ_lane<T>(a: &[T], out: &mut [T], stretch: f64)
where
    T: Copy + Default + Add<Output = T> + Mul<f64, Output = T>,
{
    let mut total = T::default();
    for (n, &value) in a.iter().enumerate() {
        total = total + value * integ_weight(n);
    }
    out[0] = total * stretch;
}

fn interp_lane<T>(a: &[T], out: &mut [T], theta: f64)
where
    T: Copy + Default + Add<Output = T> + Mul<f64, Output = T>,
{
    let mut total = T::default();
    for (n, &value) in a.iter().enumerate() {
        total = total + value * (exact_f64(n) * theta).cos();
    }
    out[0] = total;
}

impl Basis for Chebyshev {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn base_grid_size(&self) -> usize {
        self.base_grid_size
    }

    fn interval(&self) -> (f64, f64) {
        self.interval
    }

    fn dealias(&self) -> f64 {
        self.dealias
    }

    fn grid_stretch(&self) -> f64 {
        self.radius()
    }

    fn library(&self) -> Library {
        self.library.unwrap_or(Library::Planned)
    }

    fn set_library(&mut self, library: Library) {
        self.library = Some(library);
    }

    fn configure(&mut self, config: &Config) {
        if self.library.is_none() {
            self.library = Some(config.default_library);
        }
        self.plans = PlanCache::new(config.rigor);
    }

    fn default_parity(&self) -> Parity {
        Parity::Undefined
    }

    fn set_dtype(&mut self, grid_dtype: Dtype) -> Result<Dtype> {
        // The transform retains the data type, with one mode per grid point.
        let coeff_size = self.base_grid_size;
        self.state = Some(DtypeState {
            grid_dtype,
            coeff_dtype: grid_dtype,
            coeff_size,
            elements: (0..coeff_size).map(exact_f64).collect(),
        });
        Ok(grid_dtype)
    }

    fn grid_dtype(&self) -> Dtype {
        self.state().grid_dtype
    }

    fn coeff_dtype(&self) -> Dtype {
        self.state().coeff_dtype
    }

    fn coeff_size(&self) -> usize {
        self.state().coeff_size
    }

    fn elements(&self) -> &[f64] {
        &self.state().elements
    }

    fn grid_size(&self, scale: f64) -> Result<usize> {
        scaled_grid_size(self.base_grid_size, scale)
    }

    fn grid(&self, scale: f64) -> Result<Vec<f64>> {
        let grid_size = self.grid_size(scale)?;
        let center = self.center();
        let radius = self.radius();
        Ok((0..grid_size)
            .map(|k| {
                let theta = PI * (exact_f64(k) + 0.5) / exact_f64(grid_size);
                center - radius * theta.cos()
            })
            .collect())
    }

    fn forward(
        &self,
        gdata: &ArrayRef<'_>,
        cdata: &mut ArrayMut<'_>,
        axis: usize,
        _meta: &AxisMeta,
    ) -> Result<()> {
        self.check_dtypes(gdata.dtype(), cdata.dtype())?;
        expect_axis_len("cdata", cdata.shape(), axis, self.coeff_size())?;
        match (gdata, cdata) {
            (ArrayRef::Real(g), ArrayMut::Real(c)) => {
                plan::apply_lanes(g, c, axis, |gin, cout| self.forward_lane(gin, cout));
            }
            (ArrayRef::Complex(g), ArrayMut::Complex(c)) => {
                plan::apply_lanes(g, c, axis, |gin, cout| {
                    split_complex_lane(gin, cout, &mut |i, o| self.forward_lane(i, o));
                });
            }
            _ => unreachable!("dtypes checked above"),
        }
        Ok(())
    }

    fn backward(
        &self,
        cdata: &ArrayRef<'_>,
        gdata: &mut ArrayMut<'_>,
        axis: usize,
        meta: &AxisMeta,
    ) -> Result<()> {
        self.check_dtypes(gdata.dtype(), cdata.dtype())?;
        expect_axis_len("cdata", cdata.shape(), axis, self.coeff_size())?;
        expect_axis_len("gdata", gdata.shape(), axis, self.grid_size(meta.scale)?)?;
        match (cdata, gdata) {
            (ArrayRef::Real(c), ArrayMut::Real(g)) => {
                plan::apply_lanes(c, g, axis, |cin, gout| self.backward_lane(cin, gout));
            }
            (ArrayRef::Complex(c), ArrayMut::Complex(g)) => {
                plan::apply_lanes(c, g, axis, |cin, gout| {
                    split_complex_lane(cin, gout, &mut |i, o| self.backward_lane(i, o));
                });
            }
            _ => unreachable!("dtypes checked above"),
        }
        Ok(())
    }

    fn differentiate(
        &self,
        cdata: &ArrayRef<'_>,
        out: &mut ArrayMut<'_>,
        axis: usize,
        _meta: &AxisMeta,
    ) -> Result<Parity> {
        expect_axis_len("cdata", cdata.shape(), axis, self.coeff_size())?;
        expect_axis_len("cderiv", out.shape(), axis, self.coeff_size())?;
        let stretch = self.grid_stretch();
        match (cdata, out) {
            (ArrayRef::Real(c), ArrayMut::Real(d)) => {
                plan::apply_lanes(c, d, axis, |a, b| diff_lane(a, b, stretch));
            }
            (ArrayRef::Complex(c), ArrayMut::Complex(d)) => {
                plan::apply_lanes(c, d, axis, |a, b| diff_lane(a, b, stretch));
            }
            _ => return Err(Error::DtypeMismatch { context: "cderiv" }),
        }
        Ok(Parity::Undefined)
    }

    fn integrate(
        &self,
        cdata: &ArrayRef<'_>,
        out: &mut ArrayMut<'_>,
        axis: usize,
        _meta: &AxisMeta,
    ) -> Result<()> {
        expect_axis_len("cdata", cdata.shape(), axis, self.coeff_size())?;
        expect_axis_len("cint", out.shape(), axis, self.coeff_size())?;
        let stretch = self.grid_stretch();
        match (cdata, out) {
            (ArrayRef::Real(c), ArrayMut::Real(d)) => {
                plan::apply_lanes(c, d, axis, |a, b| integ_lane(a, b, stretch));
            }
            (ArrayRef::Complex(c), ArrayMut::Complex(d)) => {
                plan::apply_lanes(c, d, axis, |a, b| integ_lane(a, b, stretch));
            }
            _ => return Err(Error::DtypeMismatch { context: "cint" }),
        }
        Ok(())
    }

    fn interpolate(
        &self,
        cdata: &ArrayRef<'_>,
        out: &mut ArrayMut<'_>,
        position: f64,
        axis: usize,
        _meta: &AxisMeta,
    ) -> Result<()> {
        expect_axis_len("cdata", cdata.shape(), axis, self.coeff_size())?;
        expect_axis_len("cint", out.shape(), axis, self.coeff_size())?;
        let native = self.native_coord(position);
        if !(-1.0..=1.0).contains(&native) {
            return Err(Error::PositionOutsideInterval(position));
        }
        let theta = native.acos();
        match (cdata, out) {
            (ArrayRef::Real(c), ArrayMut::Real(d)) => {
                plan::apply_lanes(c, d, axis, |a, b| interp_lane(a, b, theta));
            }
            (ArrayRef::Complex(c), ArrayMut::Complex(d)) => {
                plan::apply_lanes(c, d, axis, |a, b| interp_lane(a, b, theta));
            }
            _ => return Err(Error::DtypeMismatch { context: "cint" }),
        }
        Ok(())
    }

    /// Preconditioning by the T↔U basis change:
    /// `T_n = (U_n − U_{n−2}) / 2`, `U_{−n} = −U_{n−2}`.
    fn preconditioner(&self) -> Result<CsrMatrix> {
        let size = self.coeff_size();
        let mut triplets = vec![(0, 0, 1.0)];
        for n in 1..size {
            triplets.push((n, n, 0.5));
            if n >= 2 {
                triplets.push((n - 2, n, -0.5));
            }
        }
        Ok(CsrMatrix::from_triplets(size, size, triplets))
    }

    /// Differentiation: `d_x(T_n)/n = 2 T_{n−1} + d_x(T_{n−2})/(n−2)`.
    fn diff_matrix(&self) -> Result<CsrMatrix> {
        let size = self.coeff_size();
        let stretch = self.grid_stretch();
        let mut triplets = Vec::new();
        for i in 0..size.saturating_sub(1) {
            for j in ((i + 1)..size).step_by(2) {
                let value = if i == 0 {
                    exact_f64(j) / stretch
                } else {
                    2.0 * exact_f64(j) / stretch
                };
                triplets.push((i, j, value));
            }
        }
        Ok(CsrMatrix::from_triplets(size, size, triplets))
    }

    /// Multiplication: `T_p·T_n = (T_{n+p} + T_{|n−p|}) / 2`.
    fn mult_matrix(&self, p: usize, _subindex: usize) -> Result<CsrMatrix> {
        let size = self.coeff_size();
        let mut triplets = Vec::new();
        for n in 0..size {
            let upper = n + p;
            if upper < size {
                triplets.push((upper, n, 0.5));
            }
            let lower = n.abs_diff(p);
            if lower < size {
                triplets.push((lower, n, 0.5));
            }
        }
        Ok(CsrMatrix::from_triplets(size, size, triplets))
    }

    fn match_matrix(&self) -> Result<CsrMatrix> {
        Err(Error::Unsupported("match matrix"))
    }

    fn left_vector(&self) -> Result<Vec<f64>> {
        // T_n(-1) = (-1)^n
        Ok((0..self.coeff_size())
            .map(|n| if n % 2 == 0 { 1.0 } else { -1.0 })
            .collect())
    }

    fn right_vector(&self) -> Result<Vec<f64>> {
        // T_n(1) = 1
        Ok(vec![1.0; self.coeff_size()])
    }

    fn bc_vector(&self) -> Result<Vec<f64>> {
        // The tau term replaces the last Galerkin constraint.
        let mut vector = vec![0.0; self.coeff_size()];
        vector[self.coeff_size() - 1] = 1.0;
        Ok(vector)
    }

    fn match_vector(&self) -> Result<Vec<f64>> {
        Err(Error::Unsupported("match vector"))
    }

    fn integ_vector(&self) -> Result<Vec<f64>> {
        let stretch = self.grid_stretch();
        Ok((0..self.coeff_size())
            .map(|n| integ_weight(n) * stretch)
            .collect())
    }

    fn interp_vector(&self, position: f64) -> Result<Vec<Complex64>> {
        let native = self.native_coord(position);
        if !(-1.0..=1.0).contains(&native) {
            return Err(Error::PositionOutsideInterval(position));
        }
        let theta = native.acos();
        Ok((0..self.coeff_size())
            .map(|n| Complex64::new((exact_f64(n) * theta).cos(), 0.0))
            .collect())
    }

    fn diff_vector(&self) -> Result<Vec<Complex64>> {
        Err(Error::Unsupported("separable differentiation"))
    }

    fn hilbert_vector(&self) -> Result<Vec<Complex64>> {
        Err(Error::Unsupported("Hilbert transform"))
    }

    fn trans_diff(&self, _index: usize) -> Result<Complex64> {
        Err(Error::Unsupported("transverse differentiation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DynArray;
    use float_cmp::assert_approx_eq;
    use ndarray::{ArrayD, IxDyn};

    fn basis(n: usize, interval: (f64, f64)) -> Chebyshev {
        let mut basis = Chebyshev::new(n, interval);
        basis.set_dtype(Dtype::Real).unwrap();
        basis
    }

    fn real_1d(values: Vec<f64>) -> DynArray {
        let len = values.len();
        DynArray::Real(ArrayD::from_shape_vec(IxDyn(&[len]), values).unwrap())
    }

    #[test]
    fn differentiate_t1_gives_constant() {
        let basis = basis(8, (-1.0, 1.0));
        let coeffs = real_1d(vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let mut deriv = DynArray::zeros(&[8], Dtype::Real);
        basis
            .differentiate(&coeffs.view(), &mut deriv.view_mut(), 0, &AxisMeta::new(Parity::Undefined))
            .unwrap();
        let DynArray::Real(deriv) = deriv else { unreachable!() };
        assert_approx_eq!(f64, deriv[[0]], 1.0, epsilon = 1e-12);
        for n in 1..8 {
            assert_approx_eq!(f64, deriv[[n]], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn forward_of_identity_function_is_t1() {
        let basis = basis(8, (-1.0, 1.0));
        let grid = basis.grid(1.0).unwrap();
        let gdata = real_1d(grid);
        let mut cdata = DynArray::zeros(&[8], Dtype::Real);
        basis
            .forward(&gdata.view(), &mut cdata.view_mut(), 0, &AxisMeta::new(Parity::Undefined))
            .unwrap();
        let DynArray::Real(cdata) = cdata else { unreachable!() };
        for n in 0..8 {
            let expected = if n == 1 { 1.0 } else { 0.0 };
            assert_approx_eq!(f64, cdata[[n]], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn round_trip_at_scale() {
        let basis = basis(8, (0.0, 3.0));
        let coeffs: Vec<f64> = (0..8).map(|n| 1.0 / (1.0 + exact_f64(n))).collect();
        let cdata = real_1d(coeffs.clone());
        let meta = AxisMeta { scale: 1.5, parity: Parity::Undefined };
        let mut gdata = DynArray::zeros(&[12], Dtype::Real);
        basis.backward(&cdata.view(), &mut gdata.view_mut(), 0, &meta).unwrap();
        let mut back = DynArray::zeros(&[8], Dtype::Real);
        basis.forward(&gdata.view(), &mut back.view_mut(), 0, &meta).unwrap();
        let DynArray::Real(back) = back else { unreachable!() };
        for (n, expected) in coeffs.iter().enumerate() {
            assert_approx_eq!(f64, back[[n]], *expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn truncating_resize_zeroes_high_modes() {
        // Resizing N -> S < N -> N keeps modes below S and zeroes the rest;
        // resizing N -> S >= N -> N is the identity.
        let coeffs: Vec<f64> = (0..8).map(|n| exact_f64(n + 1)).collect();
        let mut kept = vec![0.0; 6];
        resize_modes(&coeffs, &mut kept);
        let mut padded = vec![0.0; 8];
        resize_modes(&kept, &mut padded);
        assert_eq!(&padded[..6], &coeffs[..6]);
        assert_eq!(&padded[6..], &[0.0, 0.0]);

        let mut wide = vec![0.0; 11];
        resize_modes(&coeffs, &mut wide);
        let mut back = vec![0.0; 8];
        resize_modes(&wide, &mut back);
        assert_eq!(back, coeffs);
    }

    #[test]
    fn integrate_constant_over_interval() {
        let basis = basis(8, (-1.0, 1.0));
        let cdata = real_1d(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let mut cint = DynArray::zeros(&[8], Dtype::Real);
        basis
            .integrate(&cdata.view(), &mut cint.view_mut(), 0, &AxisMeta::new(Parity::Undefined))
            .unwrap();
        let DynArray::Real(cint) = cint else { unreachable!() };
        assert_approx_eq!(f64, cint[[0]], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn interpolation_matches_endpoint_vectors() {
        let basis = basis(6, (0.0, 2.0));
        let coeffs: Vec<f64> = vec![0.5, -1.0, 0.25, 0.0, 0.125, -0.5];
        let left: f64 = basis
            .left_vector()
            .unwrap()
            .iter()
            .zip(&coeffs)
            .map(|(w, c)| w * c)
            .sum();
        let cdata = real_1d(coeffs);
        let mut cint = DynArray::zeros(&[6], Dtype::Real);
        basis
            .interpolate(&cdata.view(), &mut cint.view_mut(), 0.0, 0, &AxisMeta::new(Parity::Undefined))
            .unwrap();
        let DynArray::Real(cint) = cint else { unreachable!() };
        assert_approx_eq!(f64, cint[[0]], left, epsilon = 1e-12);
        assert!(basis
            .interpolate(&cdata.view(), &mut DynArray::zeros(&[6], Dtype::Real).view_mut(), 2.5, 0, &AxisMeta::new(Parity::Undefined))
            .is_err());
    }

    #[test]
    fn preconditioner_encodes_t_to_u() {
        let pre = basis(5, (-1.0, 1.0)).preconditioner().unwrap();
        assert_eq!(pre.get(0, 0), 1.0);
        assert_eq!(pre.get(1, 1), 0.5);
        assert_eq!(pre.get(0, 2), -0.5);
        assert_eq!(pre.get(2, 4), -0.5);
        assert_eq!(pre.get(1, 2), 0.0);
    }

    #[test]
    fn diff_matrix_matches_recursion() {
        let basis = basis(8, (-1.0, 2.0));
        let coeffs: Vec<f64> = (0..8).map(|n| 0.3 * exact_f64(n + 1)).collect();
        let by_matrix = basis.diff_matrix().unwrap().matvec(&coeffs);
        let cdata = real_1d(coeffs);
        let mut deriv = DynArray::zeros(&[8], Dtype::Real);
        basis
            .differentiate(&cdata.view(), &mut deriv.view_mut(), 0, &AxisMeta::new(Parity::Undefined))
            .unwrap();
        let DynArray::Real(deriv) = deriv else { unreachable!() };
        for (n, expected) in by_matrix.iter().enumerate() {
            assert_approx_eq!(f64, deriv[[n]], *expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn mult_by_t0_is_identity() {
        let mult = basis(5, (-1.0, 1.0)).mult_matrix(0, 0).unwrap();
        for n in 0..5 {
            assert_eq!(mult.get(n, n), 1.0);
        }
    }
}
