//! Sin/Cos series basis.
//!
//! Series along this basis carry a definite parity: cosine series transform
//! through the type-II/III cosine kernels, sine series through the sine
//! kernels. The parity travels with the field's axis meta, and operations
//! that depend on it refuse to act when the parity is undefined.

use super::{
    expect_axis_len, resize_modes, scaled_grid_size, split_complex_lane, AxisMeta, Basis,
    DtypeState, Parity,
};
use crate::array::{ArrayMut, ArrayRef, Dtype};
use crate::config::{Config, Library};
use crate::convert::exact_f64;
use crate::error::{Error, Result};
use crate::plan::{self, PlanCache};
use crate::sparse::CsrMatrix;
use num_complex::Complex64;

use std::f64::consts::PI;

/// Sin/Cos basis on the half-integer grid `x_k = a + (k+½)·L/N`.
#[derive(Debug)]
pub struct SinCos {
    name: Option<String>,
    base_grid_size: usize,
    interval: (f64, f64),
    dealias: f64,
    library: Option<Library>,
    plans: PlanCache,
    state: Option<DtypeState>,
}

impl SinCos {
    /// Creates a Sin/Cos basis of `base_grid_size` points on `interval`.
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

    // Native coordinate: θ ∈ (0, π).
    fn native_coord(&self, problem: f64) -> f64 {
        PI * (problem - self.interval.0) / self.length()
    }

    fn forward_lane(&self, gdata: &[f64], cdata: &mut [f64], parity: Parity) {
        let n = gdata.len();
        if n == 0 {
            return;
        }
        let mut temp = gdata.to_vec();
        let norm = 2.0 / exact_f64(n);
        match parity {
            Parity::Even => {
                match self.library() {
                    Library::Planned => self.plans.dct(n).process_dct2(&mut temp),
                    Library::Direct => plan::direct_dct2(&mut temp),
                }
                temp[0] *= 0.5;
                for value in temp.iter_mut() {
                    *value *= norm;
                }
            }
            Parity::Odd => {
                match self.library() {
                    Library::Planned => self.plans.dct(n).process_dst2(&mut temp),
                    Library::Direct => plan::direct_dst2(&mut temp),
                }
                // The type-II sine output at index k holds frequency k+1;
                // shift so slot n holds sin(n·θ), with an empty mode-0 slot.
                for k in (1..n).rev() {
                    temp[k] = temp[k - 1] * norm;
                }
                temp[0] = 0.0;
            }
            Parity::Undefined => unreachable!("parity checked by the caller"),
        }
        resize_modes(&temp, cdata);
    }

    fn backward_lane(&self, cdata: &[f64], gdata: &mut [f64], parity: Parity) {
        let n = gdata.len();
        if n == 0 {
            return;
        }
        let mut temp = vec![0.0; n];
        resize_modes(cdata, &mut temp);
        match parity {
            Parity::Even => {
                temp[0] *= 2.0;
                match self.library() {
                    Library::Planned => self.plans.dct(n).process_dct3(&mut temp),
                    Library::Direct => plan::direct_dct3(&mut temp),
                }
            }
            Parity::Odd => {
                // Undo the storage shift: the type-III sine input at index k
                // drives frequency k+1, and no mode lives at the grid
                // frequency.
                for k in 0..n - 1 {
                    temp[k] = temp[k + 1];
                }
                temp[n - 1] = 0.0;
                match self.library() {
                    Library::Planned => self.plans.dct(n).process_dst3(&mut temp),
                    Library::Direct => plan::direct_dst3(&mut temp),
                }
            }
            Parity::Undefined => unreachable!("parity checked by the caller"),
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

    fn definite_parity(meta: &AxisMeta) -> Result<Parity> {
        match meta.parity {
            Parity::Undefined => Err(Error::UndefinedParity),
            parity => Ok(parity),
        }
    }

    /// Interpolation weights of a cosine series at `position`.
    pub fn cos_interp_vector(&self, position: f64) -> Result<Vec<f64>> {
        let theta = self.checked_theta(position)?;
        Ok((0..self.coeff_size())
            .map(|n| (exact_f64(n) * theta).cos())
            .collect())
    }

    /// Interpolation weights of a sine series at `position`.
    pub fn sin_interp_vector(&self, position: f64) -> Result<Vec<f64>> {
        let theta = self.checked_theta(position)?;
        Ok((0..self.coeff_size())
            .map(|n| (exact_f64(n) * theta).sin())
            .collect())
    }

    fn checked_theta(&self, position: f64) -> Result<f64> {
        let theta = self.native_coord(position);
        if !(0.0..=PI).contains(&theta) {
            return Err(Error::PositionOutsideInterval(position));
        }
        Ok(theta)
    }
}

impl Basis for SinCos {
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
        // Native interval: (0, π).
        self.length() / PI
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
        Parity::Even
    }

    fn set_dtype(&mut self, grid_dtype: Dtype) -> Result<Dtype> {
        // The transform retains the data type; one mode per grid point, with
        // wavenumbers scaled into problem coordinates.
        let stretch = self.grid_stretch();
        let elements: Vec<f64> = (0..self.base_grid_size)
            .map(|n| exact_f64(n) / stretch)
            .collect();
        self.state = Some(DtypeState {
            grid_dtype,
            coeff_dtype: grid_dtype,
            coeff_size: self.base_grid_size,
            elements,
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
        let start = self.interval.0;
        let step = self.length() / exact_f64(grid_size);
        Ok((0..grid_size)
            .map(|k| step.mul_add(exact_f64(k) + 0.5, start))
            .collect())
    }

    fn forward(
        &self,
        gdata: &ArrayRef<'_>,
        cdata: &mut ArrayMut<'_>,
        axis: usize,
        meta: &AxisMeta,
    ) -> Result<()> {
        self.check_dtypes(gdata.dtype(), cdata.dtype())?;
        expect_axis_len("cdata", cdata.shape(), axis, self.coeff_size())?;
        let parity = Self::definite_parity(meta)?;
        match (gdata, cdata) {
            (ArrayRef::Real(g), ArrayMut::Real(c)) => {
                plan::apply_lanes(g, c, axis, |gin, cout| self.forward_lane(gin, cout, parity));
            }
            (ArrayRef::Complex(g), ArrayMut::Complex(c)) => {
                plan::apply_lanes(g, c, axis, |gin, cout| {
                    split_complex_lane(gin, cout, &mut |i, o| self.forward_lane(i, o, parity));
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
        let parity = Self::definite_parity(meta)?;
        match (cdata, gdata) {
            (ArrayRef::Real(c), ArrayMut::Real(g)) => {
                plan::apply_lanes(c, g, axis, |cin, gout| self.backward_lane(cin, gout, parity));
            }
            (ArrayRef::Complex(c), ArrayMut::Complex(g)) => {
                plan::apply_lanes(c, g, axis, |cin, gout| {
                    split_complex_lane(cin, gout, &mut |i, o| self.backward_lane(i, o, parity));
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
        meta: &AxisMeta,
    ) -> Result<Parity> {
        expect_axis_len("cdata", cdata.shape(), axis, self.coeff_size())?;
        expect_axis_len("cderiv", out.shape(), axis, self.coeff_size())?;
        let parity = Self::definite_parity(meta)?;
        // d/dx cos(kx) = -k·sin(kx); d/dx sin(kx) = k·cos(kx).
        let signed: Vec<f64> = self
            .state()
            .elements
            .iter()
            .map(|&k| if parity == Parity::Even { -k } else { k })
            .collect();
        match (cdata, out) {
            (ArrayRef::Real(c), ArrayMut::Real(d)) => {
                plan::apply_lanes(c, d, axis, |cin, cout| {
                    for ((dst, src), &k) in cout.iter_mut().zip(cin).zip(&signed) {
                        *dst = k * *src;
                    }
                });
            }
            (ArrayRef::Complex(c), ArrayMut::Complex(d)) => {
                plan::apply_lanes(c, d, axis, |cin, cout| {
                    for ((dst, src), &k) in cout.iter_mut().zip(cin).zip(&signed) {
                        *dst = *src * k;
                    }
                });
            }
            _ => return Err(Error::DtypeMismatch { context: "cderiv" }),
        }
        Ok(parity.flipped())
    }

    fn integrate(
        &self,
        cdata: &ArrayRef<'_>,
        out: &mut ArrayMut<'_>,
        axis: usize,
        meta: &AxisMeta,
    ) -> Result<()> {
        expect_axis_len("cdata", cdata.shape(), axis, self.coeff_size())?;
        expect_axis_len("cint", out.shape(), axis, self.coeff_size())?;
        let parity = Self::definite_parity(meta)?;
        let stretch = self.grid_stretch();
        // ∫cos(nθ)dθ over (0,π) vanishes for n ≥ 1; ∫sin(nθ)dθ = 2/n for
        // odd n.
        let weights: Vec<f64> = (0..self.coeff_size())
            .map(|n| match parity {
                Parity::Even => {
                    if n == 0 {
                        PI * stretch
                    } else {
                        0.0
                    }
                }
                Parity::Odd => {
                    if n % 2 == 1 {
                        2.0 * stretch / exact_f64(n)
                    } else {
                        0.0
                    }
                }
                Parity::Undefined => unreachable!(),
            })
            .collect();
        match (cdata, out) {
            (ArrayRef::Real(c), ArrayMut::Real(d)) => {
                plan::apply_lanes(c, d, axis, |cin, cout| {
                    cout[0] = cin.iter().zip(&weights).map(|(c, w)| *c * *w).sum();
                });
            }
            (ArrayRef::Complex(c), ArrayMut::Complex(d)) => {
                plan::apply_lanes(c, d, axis, |cin, cout| {
                    cout[0] = cin.iter().zip(&weights).map(|(c, w)| *c * *w).sum();
                });
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
        meta: &AxisMeta,
    ) -> Result<()> {
        expect_axis_len("cdata", cdata.shape(), axis, self.coeff_size())?;
        expect_axis_len("cint", out.shape(), axis, self.coeff_size())?;
        let weights = match Self::definite_parity(meta)? {
            Parity::Even => self.cos_interp_vector(position)?,
            Parity::Odd => self.sin_interp_vector(position)?,
            Parity::Undefined => unreachable!(),
        };
        match (cdata, out) {
            (ArrayRef::Real(c), ArrayMut::Real(d)) => {
                plan::apply_lanes(c, d, axis, |cin, cout| {
                    cout[0] = cin.iter().zip(&weights).map(|(c, w)| *c * *w).sum();
                });
            }
            (ArrayRef::Complex(c), ArrayMut::Complex(d)) => {
                plan::apply_lanes(c, d, axis, |cin, cout| {
                    cout[0] = cin.iter().zip(&weights).map(|(c, w)| *c * *w).sum();
                });
            }
            _ => return Err(Error::DtypeMismatch { context: "cint" }),
        }
        Ok(())
    }

    fn preconditioner(&self) -> Result<CsrMatrix> {
        Err(Error::Unsupported("preconditioner"))
    }

    fn diff_matrix(&self) -> Result<CsrMatrix> {
        Err(Error::Unsupported("differentiation matrix"))
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
        Err(Error::Unsupported("boundary-row vector"))
    }

    fn match_vector(&self) -> Result<Vec<f64>> {
        Err(Error::Unsupported("match vector"))
    }

    /// Integration weights of a cosine series; sine-series integration is
    /// parity-dependent and handled by [`Basis::integrate`].
    fn integ_vector(&self) -> Result<Vec<f64>> {
        let mut vector = vec![0.0; self.coeff_size()];
        vector[0] = PI * self.grid_stretch();
        Ok(vector)
    }

    fn interp_vector(&self, _position: f64) -> Result<Vec<Complex64>> {
        Err(Error::Unsupported("parity-free interpolation vector"))
    }

    fn diff_vector(&self) -> Result<Vec<Complex64>> {
        Err(Error::Unsupported("parity-free differentiation vector"))
    }

    fn hilbert_vector(&self) -> Result<Vec<Complex64>> {
        Err(Error::Unsupported("Hilbert transform"))
    }

    fn trans_diff(&self, index: usize) -> Result<Complex64> {
        Ok(Complex64::new(0.0, self.state().elements[index]))
    }
}
