//! Fourier complex-exponential basis.

use super::{expect_axis_len, scaled_grid_size, AxisMeta, Basis, DtypeState, Parity};
use crate::array::{ArrayMut, ArrayRef, Dtype};
use crate::config::{Config, Library};
use crate::convert::exact_f64;
use crate::error::{Error, Result};
use crate::plan::{self, PlanCache};
use crate::sparse::CsrMatrix;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Fourier basis `F_n = exp(i·k_n·x)` on an evenly spaced, endpoint-free
/// grid.
///
/// Real grid data keeps the non-negative wavenumbers; complex grid data keeps
/// both signs. The Nyquist mode is discarded in either case.
#[derive(Debug)]
pub struct Fourier {
    name: Option<String>,
    base_grid_size: usize,
    interval: (f64, f64),
    dealias: f64,
    library: Option<Library>,
    plans: PlanCache,
    state: Option<DtypeState>,
}

impl Fourier {
    /// Creates a Fourier basis of `base_grid_size` points on `interval`.
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

    fn length(&self) -> f64 {
        self.interval.1 - self.interval.0
    }

    fn state(&self) -> &DtypeState {
        self.state.as_ref().expect("dtype set by the domain")
    }

    fn kmax(&self) -> usize {
        (self.base_grid_size - 1) / 2
    }

    fn fft(&self, buffer: &mut [Complex64], inverse: bool) {
        match self.library() {
            Library::Planned => self.plans.fft(buffer.len(), inverse).process(buffer),
            Library::Direct => plan::direct_dft(buffer, inverse),
        }
    }

    fn forward_real_lane(&self, gdata: &[f64], cdata: &mut [Complex64]) {
        let n = gdata.len();
        if n == 0 {
            return;
        }
        let mut temp: Vec<Complex64> = gdata.iter().map(|&x| Complex64::new(x, 0.0)).collect();
        self.fft(&mut temp, false);
        let norm = 1.0 / exact_f64(n);
        for value in &mut temp {
            *value *= norm;
        }
        // The Nyquist mode of an even grid carries no usable phase.
        if n % 2 == 0 {
            temp[n / 2] = Complex64::default();
        }
        resize_real(&temp, cdata, n);
    }

    fn backward_real_lane(&self, cdata: &[Complex64], gdata: &mut [f64]) {
        let n = gdata.len();
        if n == 0 {
            return;
        }
        let mut temp = vec![Complex64::default(); n];
        let kmax = resize_real(cdata, &mut temp, n);
        for k in 1..=kmax {
            temp[n - k] = temp[k].conj();
        }
        self.fft(&mut temp, true);
        for (dst, src) in gdata.iter_mut().zip(&temp) {
            *dst = src.re;
        }
    }

    fn forward_complex_lane(&self, gdata: &[Complex64], cdata: &mut [Complex64]) {
        let n = gdata.len();
        if n == 0 {
            return;
        }
        let mut temp = gdata.to_vec();
        self.fft(&mut temp, false);
        let norm = 1.0 / exact_f64(n);
        for value in &mut temp {
            *value *= norm;
        }
        resize_complex(&temp, cdata);
    }

    fn backward_complex_lane(&self, cdata: &[Complex64], gdata: &mut [Complex64]) {
        let n = gdata.len();
        if n == 0 {
            return;
        }
        let mut temp = vec![Complex64::default(); n];
        resize_complex(cdata, &mut temp);
        self.fft(&mut temp, true);
        gdata.copy_from_slice(&temp);
    }
}

/// Resizes a real-dtype spectrum: modes `0..=k_max` survive where
/// `k_max = min((grid−1)/2, size_in−1, size_out−1)`; everything else is left
/// zero. Returns `k_max`.
fn resize_real(cdata_in: &[Complex64], cdata_out: &mut [Complex64], grid_size: usize) -> usize {
    let kmax = ((grid_size - 1) / 2)
        .min(cdata_in.len() - 1)
        .min(cdata_out.len() - 1);
    cdata_out[..=kmax].copy_from_slice(&cdata_in[..=kmax]);
    kmax
}

/// Resizes a complex-dtype spectrum: modes `±k_max` survive with
/// `k_max = (min(size_in, size_out) − 1) / 2`; the middle (including any
/// Nyquist mode) is left zero.
fn resize_complex(cdata_in: &[Complex64], cdata_out: &mut [Complex64]) {
    let size_in = cdata_in.len();
    let size_out = cdata_out.len();
    let kmax = (size_in.min(size_out) - 1) / 2;
    cdata_out[..=kmax].copy_from_slice(&cdata_in[..=kmax]);
    for k in 1..=kmax {
        cdata_out[size_out - k] = cdata_in[size_in - k];
    }
}

impl Basis for Fourier {
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
        // Native interval: (0, 2π).
        self.length() / (2.0 * PI)
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
        // The transform produces complex coefficients either way; native
        // wavenumbers discard any Nyquist mode.
        let kmax = self.kmax();
        let stretch = self.grid_stretch();
        let native: Vec<i64> = match grid_dtype {
            Dtype::Real => (0..=kmax).map(|k| i64::try_from(k).unwrap()).collect(),
            Dtype::Complex => {
                let kmax = i64::try_from(kmax).unwrap();
                (0..=kmax).chain(-kmax..0).collect()
            }
        };
        let elements: Vec<f64> = native
            .iter()
            .map(|&k| {
                let k = i32::try_from(k).unwrap();
                f64::from(k) / stretch
            })
            .collect();
        self.state = Some(DtypeState {
            grid_dtype,
            coeff_dtype: Dtype::Complex,
            coeff_size: elements.len(),
            elements,
        });
        Ok(Dtype::Complex)
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
        let start = self.interval.0;
        let step = self.length() / exact_f64(grid_size);
        Ok((0..grid_size)
            .map(|k| step.mul_add(exact_f64(k), start))
            .collect())
    }

    fn forward(
        &self,
        gdata: &ArrayRef<'_>,
        cdata: &mut ArrayMut<'_>,
        axis: usize,
        _meta: &AxisMeta,
    ) -> Result<()> {
        let state = self.state();
        expect_axis_len("cdata", cdata.shape(), axis, state.coeff_size)?;
        match (state.grid_dtype, gdata, cdata) {
            (Dtype::Real, ArrayRef::Real(g), ArrayMut::Complex(c)) => {
                plan::apply_lanes(g, c, axis, |gin, cout| self.forward_real_lane(gin, cout));
                Ok(())
            }
            (Dtype::Complex, ArrayRef::Complex(g), ArrayMut::Complex(c)) => {
                plan::apply_lanes(g, c, axis, |gin, cout| self.forward_complex_lane(gin, cout));
                Ok(())
            }
            _ => Err(Error::DtypeMismatch { context: "gdata" }),
        }
    }

    fn backward(
        &self,
        cdata: &ArrayRef<'_>,
        gdata: &mut ArrayMut<'_>,
        axis: usize,
        meta: &AxisMeta,
    ) -> Result<()> {
        let state = self.state();
        expect_axis_len("cdata", cdata.shape(), axis, state.coeff_size)?;
        expect_axis_len("gdata", gdata.shape(), axis, self.grid_size(meta.scale)?)?;
        match (state.grid_dtype, cdata, gdata) {
            (Dtype::Real, ArrayRef::Complex(c), ArrayMut::Real(g)) => {
                plan::apply_lanes(c, g, axis, |cin, gout| self.backward_real_lane(cin, gout));
                Ok(())
            }
            (Dtype::Complex, ArrayRef::Complex(c), ArrayMut::Complex(g)) => {
                plan::apply_lanes(c, g, axis, |cin, gout| self.backward_complex_lane(cin, gout));
                Ok(())
            }
            _ => Err(Error::DtypeMismatch { context: "gdata" }),
        }
    }

    fn differentiate(
        &self,
        cdata: &ArrayRef<'_>,
        out: &mut ArrayMut<'_>,
        axis: usize,
        _meta: &AxisMeta,
    ) -> Result<Parity> {
        let state = self.state();
        expect_axis_len("cdata", cdata.shape(), axis, state.coeff_size)?;
        expect_axis_len("cderiv", out.shape(), axis, state.coeff_size)?;
        let (ArrayRef::Complex(c), ArrayMut::Complex(d)) = (cdata, out) else {
            return Err(Error::DtypeMismatch { context: "cderiv" });
        };
        let wavenumbers = &state.elements;
        plan::apply_lanes(c, d, axis, |cin, cout| {
            for ((dst, src), &k) in cout.iter_mut().zip(cin).zip(wavenumbers) {
                *dst = Complex64::new(0.0, k) * *src;
            }
        });
        Ok(Parity::Undefined)
    }

    fn integrate(
        &self,
        cdata: &ArrayRef<'_>,
        out: &mut ArrayMut<'_>,
        axis: usize,
        _meta: &AxisMeta,
    ) -> Result<()> {
        let state = self.state();
        expect_axis_len("cdata", cdata.shape(), axis, state.coeff_size)?;
        expect_axis_len("cint", out.shape(), axis, state.coeff_size)?;
        let (ArrayRef::Complex(c), ArrayMut::Complex(d)) = (cdata, out) else {
            return Err(Error::DtypeMismatch { context: "cint" });
        };
        let weight = 2.0 * PI * self.grid_stretch();
        plan::apply_lanes(c, d, axis, |cin, cout| {
            cout[0] = cin[0] * weight;
        });
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
        let state = self.state();
        expect_axis_len("cdata", cdata.shape(), axis, state.coeff_size)?;
        expect_axis_len("cint", out.shape(), axis, state.coeff_size)?;
        let (ArrayRef::Complex(c), ArrayMut::Complex(d)) = (cdata, out) else {
            return Err(Error::DtypeMismatch { context: "cint" });
        };
        // For a real-dtype series the mean-mode weight is already halved in
        // the interp vector, so adding the conjugate restores it.
        let weights = self.interp_vector(position)?;
        let real_grid = state.grid_dtype == Dtype::Real;
        plan::apply_lanes(c, d, axis, |cin, cout| {
            let total: Complex64 = cin.iter().zip(&weights).map(|(c, w)| *c * *w).sum();
            cout[0] = if real_grid { total + total.conj() } else { total };
        });
        Ok(())
    }

    fn preconditioner(&self) -> Result<CsrMatrix> {
        Ok(CsrMatrix::identity(self.coeff_size()))
    }

    fn diff_matrix(&self) -> Result<CsrMatrix> {
        Err(Error::Unsupported("real differentiation matrix"))
    }

    fn mult_matrix(&self, _p: usize, _subindex: usize) -> Result<CsrMatrix> {
        Err(Error::Unsupported("multiplication matrix"))
    }

    fn match_matrix(&self) -> Result<CsrMatrix> {
        Err(Error::Unsupported("match matrix"))
    }

    fn left_vector(&self) -> Result<Vec<f64>> {
        Err(Error::Unsupported("endpoint evaluation"))
    }

    fn right_vector(&self) -> Result<Vec<f64>> {
        Err(Error::Unsupported("endpoint evaluation"))
    }

    fn bc_vector(&self) -> Result<Vec<f64>> {
        // The tau term replaces the mean-mode constraint.
        let mut vector = vec![0.0; self.coeff_size()];
        vector[0] = 1.0;
        Ok(vector)
    }

    fn match_vector(&self) -> Result<Vec<f64>> {
        Err(Error::Unsupported("match vector"))
    }

    fn integ_vector(&self) -> Result<Vec<f64>> {
        // int(F_n) = 2π·stretch·δ(n,0)
        let mut vector = vec![0.0; self.coeff_size()];
        vector[0] = 2.0 * PI * self.grid_stretch();
        Ok(vector)
    }

    fn interp_vector(&self, position: f64) -> Result<Vec<Complex64>> {
        // F_n(x) = exp(i·k_n·(x − a))
        let x = position - self.interval.0;
        let state = self.state();
        let mut vector: Vec<Complex64> = state
            .elements
            .iter()
            .map(|&k| Complex64::new(0.0, k * x).exp())
            .collect();
        if state.grid_dtype == Dtype::Real {
            // Halve the mean-mode weight; it is counted twice by conjugation.
            vector[0] *= 0.5;
        }
        Ok(vector)
    }

    fn diff_vector(&self) -> Result<Vec<Complex64>> {
        Ok(self
            .state()
            .elements
            .iter()
            .map(|&k| Complex64::new(0.0, k))
            .collect())
    }

    fn hilbert_vector(&self) -> Result<Vec<Complex64>> {
        // Hx(F_n) = -i·sgn(k_n)·F_n; the mean mode is annihilated.
        Ok(self
            .state()
            .elements
            .iter()
            .map(|&k| {
                let sign = if k > 0.0 {
                    1.0
                } else if k < 0.0 {
                    -1.0
                } else {
                    0.0
                };
                Complex64::new(0.0, -sign)
            })
            .collect())
    }

    fn trans_diff(&self, index: usize) -> Result<Complex64> {
        Ok(Complex64::new(0.0, self.state().elements[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DynArray;
    use float_cmp::assert_approx_eq;
    use ndarray::{ArrayD, IxDyn};

    fn real_basis(n: usize) -> Fourier {
        let mut basis = Fourier::new(n, (0.0, 2.0 * PI));
        basis.set_dtype(Dtype::Real).unwrap();
        basis
    }

    fn meta() -> AxisMeta {
        AxisMeta::new(Parity::Undefined)
    }

    #[test]
    fn real_wavenumbers_discard_nyquist() {
        let basis = real_basis(8);
        assert_eq!(basis.coeff_size(), 4);
        assert_eq!(basis.elements(), &[0.0, 1.0, 2.0, 3.0]);

        let mut complex = Fourier::new(8, (0.0, 2.0 * PI));
        complex.set_dtype(Dtype::Complex).unwrap();
        assert_eq!(complex.coeff_size(), 7);
        assert_eq!(complex.elements(), &[0.0, 1.0, 2.0, 3.0, -3.0, -2.0, -1.0]);
    }

    #[test]
    fn sine_transforms_to_single_mode() {
        let basis = real_basis(8);
        let grid = basis.grid(1.0).unwrap();
        assert_approx_eq!(f64, grid[1], PI / 4.0, epsilon = 1e-14);
        let gdata = DynArray::Real(
            ArrayD::from_shape_vec(IxDyn(&[8]), grid.iter().map(|x| x.sin()).collect()).unwrap(),
        );
        let mut cdata = DynArray::zeros(&[4], Dtype::Complex);
        basis.forward(&gdata.view(), &mut cdata.view_mut(), 0, &meta()).unwrap();
        let DynArray::Complex(c) = &cdata else { unreachable!() };
        for n in 0..4 {
            let expected = if n == 1 {
                Complex64::new(0.0, -0.5)
            } else {
                Complex64::default()
            };
            assert_approx_eq!(f64, c[[n]].re, expected.re, epsilon = 1e-12);
            assert_approx_eq!(f64, c[[n]].im, expected.im, epsilon = 1e-12);
        }

        // d/dx sin = cos: the only surviving entry becomes 1/2.
        let mut cderiv = DynArray::zeros(&[4], Dtype::Complex);
        basis
            .differentiate(&cdata.view(), &mut cderiv.view_mut(), 0, &meta())
            .unwrap();
        let DynArray::Complex(d) = &cderiv else { unreachable!() };
        assert_approx_eq!(f64, d[[1]].re, 0.5, epsilon = 1e-12);
        assert_approx_eq!(f64, d[[1]].im, 0.0, epsilon = 1e-12);

        let mut gderiv = DynArray::zeros(&[8], Dtype::Real);
        basis
            .backward(&cderiv.view(), &mut gderiv.view_mut(), 0, &meta())
            .unwrap();
        let DynArray::Real(g) = &gderiv else { unreachable!() };
        for (value, x) in g.iter().zip(&grid) {
            assert_approx_eq!(f64, *value, x.cos(), epsilon = 1e-12);
        }
    }

    #[test]
    fn complex_round_trip_with_dealias_scale() {
        let mut basis = Fourier::new(16, (0.0, 4.0));
        basis.set_dtype(Dtype::Complex).unwrap();
        let coeffs: Vec<Complex64> = (0..basis.coeff_size())
            .map(|n| Complex64::new(exact_f64(n) * 0.1 - 0.4, 0.2 - exact_f64(n % 4) * 0.3))
            .collect();
        let cdata = DynArray::Complex(
            ArrayD::from_shape_vec(IxDyn(&[basis.coeff_size()]), coeffs.clone()).unwrap(),
        );
        let meta = AxisMeta { scale: 1.5, parity: Parity::Undefined };
        let mut gdata = DynArray::zeros(&[24], Dtype::Complex);
        basis.backward(&cdata.view(), &mut gdata.view_mut(), 0, &meta).unwrap();
        let mut back = DynArray::zeros(&[basis.coeff_size()], Dtype::Complex);
        basis.forward(&gdata.view(), &mut back.view_mut(), 0, &meta).unwrap();
        let DynArray::Complex(back) = &back else { unreachable!() };
        for (n, expected) in coeffs.iter().enumerate() {
            assert_approx_eq!(f64, back[[n]].re, expected.re, epsilon = 1e-12);
            assert_approx_eq!(f64, back[[n]].im, expected.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn integrate_keeps_scaled_mean_mode() {
        let basis = real_basis(8);
        let mut cdata = DynArray::zeros(&[4], Dtype::Complex);
        if let ArrayMut::Complex(mut v) = cdata.view_mut() {
            v[[0]] = Complex64::new(3.0, 0.0);
            v[[2]] = Complex64::new(0.0, 1.0);
        }
        let mut cint = DynArray::zeros(&[4], Dtype::Complex);
        basis.integrate(&cdata.view(), &mut cint.view_mut(), 0, &meta()).unwrap();
        let DynArray::Complex(c) = &cint else { unreachable!() };
        assert_approx_eq!(f64, c[[0]].re, 6.0 * PI, epsilon = 1e-12);
        assert_approx_eq!(f64, c[[2]].re, 0.0, epsilon = 1e-12);
        assert_approx_eq!(f64, c[[2]].im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn hilbert_weights_flip_sign_with_wavenumber() {
        let mut basis = Fourier::new(8, (0.0, 2.0 * PI));
        basis.set_dtype(Dtype::Complex).unwrap();
        let weights = basis.hilbert_vector().unwrap();
        assert_eq!(weights[0], Complex64::new(0.0, 0.0));
        assert_eq!(weights[1], Complex64::new(0.0, -1.0));
        assert_eq!(weights[basis.coeff_size() - 1], Complex64::new(0.0, 1.0));
    }
}
