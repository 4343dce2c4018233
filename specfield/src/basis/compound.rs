//! Compound basis joining adjacent subbases.

use super::{expect_axis_len, AxisMeta, Basis, BasisEnum, DtypeState, Parity};
use crate::array::{ArrayMut, ArrayRef, Dtype, DynArray};
use crate::config::{Config, Library};
use crate::convert::exact_f64;
use crate::error::{Error, Result};
use crate::sparse::CsrMatrix;
use num_complex::Complex64;

/// Ordered subbases covering abutting intervals, acting as one basis whose
/// coefficients are the concatenation of the subbasis coefficients.
#[derive(Debug)]
pub struct Compound {
    name: Option<String>,
    subbases: Vec<BasisEnum>,
    interval: (f64, f64),
    base_grid_size: usize,
    state: Option<DtypeState>,
}

impl Compound {
    /// Joins `subbases` into one compound basis.
    ///
    /// # Errors
    ///
    /// Returns an error if consecutive subbases do not share an endpoint.
    ///
    /// # Panics
    ///
    /// Panics if `subbases` is empty.
    pub fn new(subbases: Vec<BasisEnum>) -> Result<Self> {
        assert!(!subbases.is_empty(), "compound basis needs subbases");
        for pair in subbases.windows(2) {
            let left = pair[0].interval().1;
            let right = pair[1].interval().0;
            if left != right {
                return Err(Error::SubbasesNotAdjacent { left, right });
            }
        }
        let interval = (
            subbases[0].interval().0,
            subbases[subbases.len() - 1].interval().1,
        );
        let base_grid_size = subbases.iter().map(Basis::base_grid_size).sum();
        Ok(Self {
            name: None,
            subbases,
            interval,
            base_grid_size,
            state: None,
        })
    }

    /// Names the basis for lookup through the domain.
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// The subbases in interval order.
    pub fn subbases(&self) -> &[BasisEnum] {
        &self.subbases
    }

    /// First coefficient index of subbasis `index`.
    pub fn coeff_start(&self, index: usize) -> usize {
        self.subbases[..index].iter().map(|b| b.coeff_size()).sum()
    }

    /// First grid index of subbasis `index` at the given scale.
    pub fn grid_start(&self, index: usize, scale: f64) -> Result<usize> {
        self.subbases[..index]
            .iter()
            .map(|b| b.grid_size(scale))
            .sum()
    }

    fn state(&self) -> &DtypeState {
        self.state.as_ref().expect("dtype set by the domain")
    }

    // Subbasis index whose interval contains the position, preferring the
    // earliest match at the seams.
    fn containing_subbasis(&self, position: f64) -> Result<usize> {
        self.subbases
            .iter()
            .position(|sub| {
                let (lo, hi) = sub.interval();
                (lo..=hi).contains(&position)
            })
            .ok_or(Error::PositionOutsideInterval(position))
    }

    // Applies a subbasis kernel on a contiguous copy of its coefficient
    // block and writes the result into the matching output block.
    fn each_coeff_block<F>(
        &self,
        cdata: &ArrayRef<'_>,
        out: &mut ArrayMut<'_>,
        axis: usize,
        mut kernel: F,
    ) -> Result<()>
    where
        F: FnMut(&BasisEnum, &ArrayRef<'_>, &mut ArrayMut<'_>) -> Result<()>,
    {
        for (index, sub) in self.subbases.iter().enumerate() {
            let start = self.coeff_start(index);
            let end = self.coeff_start(index + 1);
            let block = cdata.slice_axis(axis, start, end).to_owned_data();
            let mut result = DynArray::zeros(block.shape(), block.dtype());
            kernel(sub, &block.view(), &mut result.view_mut())?;
            out.slice_axis_mut(axis, start, end).assign(&result.view())?;
        }
        Ok(())
    }
}

impl Basis for Compound {
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
        // The most conservative subbasis bounds the usable modes.
        self.subbases
            .iter()
            .map(Basis::dealias)
            .fold(f64::INFINITY, f64::min)
    }

    fn grid_stretch(&self) -> f64 {
        (self.interval.1 - self.interval.0) / 2.0
    }

    fn library(&self) -> Library {
        self.subbases[0].library()
    }

    fn set_library(&mut self, library: Library) {
        for sub in &mut self.subbases {
            sub.set_library(library);
        }
    }

    fn configure(&mut self, config: &Config) {
        for sub in &mut self.subbases {
            sub.configure(config);
        }
    }

    fn default_parity(&self) -> Parity {
        Parity::Undefined
    }

    fn set_dtype(&mut self, grid_dtype: Dtype) -> Result<Dtype> {
        let mut coeff_dtypes = Vec::with_capacity(self.subbases.len());
        for sub in &mut self.subbases {
            coeff_dtypes.push(sub.set_dtype(grid_dtype)?);
        }
        let coeff_dtype = coeff_dtypes[0];
        if coeff_dtypes.iter().any(|&dtype| dtype != coeff_dtype) {
            return Err(Error::SubbasisDtypeMismatch);
        }
        let coeff_size = self.subbases.iter().map(|b| b.coeff_size()).sum();
        self.state = Some(DtypeState {
            grid_dtype,
            coeff_dtype,
            coeff_size,
            elements: (0..coeff_size).map(exact_f64).collect(),
        });
        Ok(coeff_dtype)
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
        self.subbases.iter().map(|b| b.grid_size(scale)).sum()
    }

    fn grid(&self, scale: f64) -> Result<Vec<f64>> {
        let mut grid = Vec::with_capacity(self.grid_size(scale)?);
        for sub in &self.subbases {
            grid.extend(sub.grid(scale)?);
        }
        Ok(grid)
    }

    fn forward(
        &self,
        gdata: &ArrayRef<'_>,
        cdata: &mut ArrayMut<'_>,
        axis: usize,
        meta: &AxisMeta,
    ) -> Result<()> {
        expect_axis_len("cdata", cdata.shape(), axis, self.coeff_size())?;
        // The grid blocks are scale-dependent, so the grid extent is checked
        // against the scale carried in the axis meta.
        let scale = meta.scale;
        expect_axis_len("gdata", gdata.shape(), axis, self.grid_size(scale)?)?;
        for (index, sub) in self.subbases.iter().enumerate() {
            let gstart = self.grid_start(index, scale)?;
            let gend = self.grid_start(index + 1, scale)?;
            // Transforms require contiguous data, so work on a copy.
            let gblock = gdata.slice_axis(axis, gstart, gend).to_owned_data();
            let mut cshape = gblock.shape().to_vec();
            cshape[axis] = sub.coeff_size();
            let mut cblock = DynArray::zeros(&cshape, sub.coeff_dtype());
            sub.forward(&gblock.view(), &mut cblock.view_mut(), axis, meta)?;
            let cstart = self.coeff_start(index);
            let cend = self.coeff_start(index + 1);
            cdata
                .slice_axis_mut(axis, cstart, cend)
                .assign(&cblock.view())?;
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
        expect_axis_len("cdata", cdata.shape(), axis, self.coeff_size())?;
        let scale = meta.scale;
        expect_axis_len("gdata", gdata.shape(), axis, self.grid_size(scale)?)?;
        for (index, sub) in self.subbases.iter().enumerate() {
            let cstart = self.coeff_start(index);
            let cend = self.coeff_start(index + 1);
            let cblock = cdata.slice_axis(axis, cstart, cend).to_owned_data();
            let mut gshape = cblock.shape().to_vec();
            gshape[axis] = sub.grid_size(scale)?;
            let mut gblock = DynArray::zeros(&gshape, sub.grid_dtype());
            sub.backward(&cblock.view(), &mut gblock.view_mut(), axis, meta)?;
            let gstart = self.grid_start(index, scale)?;
            let gend = self.grid_start(index + 1, scale)?;
            gdata
                .slice_axis_mut(axis, gstart, gend)
                .assign(&gblock.view())?;
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
        self.each_coeff_block(cdata, out, axis, |sub, block, result| {
            sub.differentiate(block, result, axis, meta).map(|_| ())
        })?;
        Ok(Parity::Undefined)
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
        out.fill_zero();
        // Subbasis integrals accumulate into the leading mode.
        for (index, sub) in self.subbases.iter().enumerate() {
            let start = self.coeff_start(index);
            let end = self.coeff_start(index + 1);
            let block = cdata.slice_axis(axis, start, end).to_owned_data();
            let mut result = DynArray::zeros(block.shape(), block.dtype());
            sub.integrate(&block.view(), &mut result.view_mut(), axis, meta)?;
            match (out.slice_axis_mut(axis, 0, 1), result.view().slice_axis(axis, 0, 1)) {
                (ArrayMut::Real(mut total), ArrayRef::Real(part)) => total += &part,
                (ArrayMut::Complex(mut total), ArrayRef::Complex(part)) => total += &part,
                _ => return Err(Error::DtypeMismatch { context: "cint" }),
            }
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
        let index = self.containing_subbasis(position)?;
        let sub = &self.subbases[index];
        let start = self.coeff_start(index);
        let end = self.coeff_start(index + 1);
        let block = cdata.slice_axis(axis, start, end).to_owned_data();
        let mut result = DynArray::zeros(block.shape(), block.dtype());
        sub.interpolate(&block.view(), &mut result.view_mut(), position, axis, meta)?;
        out.fill_zero();
        out.slice_axis_mut(axis, 0, 1)
            .assign(&result.view().slice_axis(axis, 0, 1))?;
        Ok(())
    }

    fn preconditioner(&self) -> Result<CsrMatrix> {
        let blocks = self
            .subbases
            .iter()
            .map(Basis::preconditioner)
            .collect::<Result<Vec<_>>>()?;
        Ok(CsrMatrix::block_diag(&blocks))
    }

    fn diff_matrix(&self) -> Result<CsrMatrix> {
        let blocks = self
            .subbases
            .iter()
            .map(Basis::diff_matrix)
            .collect::<Result<Vec<_>>>()?;
        Ok(CsrMatrix::block_diag(&blocks))
    }

    fn mult_matrix(&self, p: usize, subindex: usize) -> Result<CsrMatrix> {
        let size = self.coeff_size();
        let start = self.coeff_start(subindex);
        let sub = self.subbases[subindex].mult_matrix(p, 0)?;
        let triplets = sub
            .iter()
            .map(|(r, c, v)| (start + r, start + c, v))
            .collect();
        Ok(CsrMatrix::from_triplets(size, size, triplets))
    }

    /// One constraint row per internal seam, placed at the left block's
    /// boundary row: right-endpoint of the left subbasis minus left-endpoint
    /// of the right subbasis.
    fn match_matrix(&self) -> Result<CsrMatrix> {
        let size = self.coeff_size();
        let mut triplets = Vec::new();
        for index in 0..self.subbases.len() - 1 {
            let left_basis = &self.subbases[index];
            let right_basis = &self.subbases[index + 1];
            let s1 = self.coeff_start(index);
            let s2 = self.coeff_start(index + 1);
            let bc = left_basis.bc_vector()?;
            let right = left_basis.right_vector()?;
            let left = right_basis.left_vector()?;
            for (r, &weight) in bc.iter().enumerate() {
                if weight == 0.0 {
                    continue;
                }
                for (c, &value) in right.iter().enumerate() {
                    triplets.push((s1 + r, s1 + c, weight * value));
                }
                for (c, &value) in left.iter().enumerate() {
                    triplets.push((s1 + r, s2 + c, -weight * value));
                }
            }
        }
        Ok(CsrMatrix::from_triplets(size, size, triplets))
    }

    fn left_vector(&self) -> Result<Vec<f64>> {
        let mut vector = vec![0.0; self.coeff_size()];
        let sub = self.subbases[0].left_vector()?;
        vector[..sub.len()].copy_from_slice(&sub);
        Ok(vector)
    }

    fn right_vector(&self) -> Result<Vec<f64>> {
        let mut vector = vec![0.0; self.coeff_size()];
        let last = self.subbases.len() - 1;
        let start = self.coeff_start(last);
        let sub = self.subbases[last].right_vector()?;
        vector[start..].copy_from_slice(&sub);
        Ok(vector)
    }

    fn bc_vector(&self) -> Result<Vec<f64>> {
        let mut vector = vec![0.0; self.coeff_size()];
        let last = self.subbases.len() - 1;
        let start = self.coeff_start(last);
        let sub = self.subbases[last].bc_vector()?;
        vector[start..].copy_from_slice(&sub);
        Ok(vector)
    }

    /// Seam-row indicators: the boundary rows of every subbasis but the last.
    fn match_vector(&self) -> Result<Vec<f64>> {
        let mut vector = vec![0.0; self.coeff_size()];
        for (index, sub) in self.subbases[..self.subbases.len() - 1].iter().enumerate() {
            let start = self.coeff_start(index);
            let bc = sub.bc_vector()?;
            vector[start..start + bc.len()].copy_from_slice(&bc);
        }
        Ok(vector)
    }

    fn integ_vector(&self) -> Result<Vec<f64>> {
        let mut vector = Vec::with_capacity(self.coeff_size());
        for sub in &self.subbases {
            vector.extend(sub.integ_vector()?);
        }
        Ok(vector)
    }

    fn interp_vector(&self, position: f64) -> Result<Vec<Complex64>> {
        let index = self.containing_subbasis(position)?;
        let mut vector = vec![Complex64::default(); self.coeff_size()];
        let start = self.coeff_start(index);
        let sub = self.subbases[index].interp_vector(position)?;
        vector[start..start + sub.len()].copy_from_slice(&sub);
        Ok(vector)
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
    use super::super::Chebyshev;
    use super::*;
    use float_cmp::assert_approx_eq;
    use ndarray::{ArrayD, IxDyn};

    fn two_chebyshev() -> Compound {
        let mut compound = Compound::new(vec![
            Chebyshev::new(4, (0.0, 1.0)).into(),
            Chebyshev::new(4, (1.0, 2.0)).into(),
        ])
        .unwrap();
        compound.set_dtype(Dtype::Real).unwrap();
        compound
    }

    fn real_1d(values: Vec<f64>) -> DynArray {
        let len = values.len();
        DynArray::Real(ArrayD::from_shape_vec(IxDyn(&[len]), values).unwrap())
    }

    #[test]
    fn non_adjacent_subbases_are_rejected() {
        let result = Compound::new(vec![
            Chebyshev::new(4, (0.0, 1.0)).into(),
            Chebyshev::new(4, (1.5, 2.0)).into(),
        ]);
        assert!(matches!(result, Err(Error::SubbasesNotAdjacent { .. })));
    }

    #[test]
    fn constant_field_concatenates_mode_zero() {
        let compound = two_chebyshev();
        assert_eq!(compound.coeff_size(), 8);
        let gdata = real_1d(vec![1.0; 8]);
        let mut cdata = DynArray::zeros(&[8], Dtype::Real);
        let meta = AxisMeta::new(Parity::Undefined);
        compound.forward(&gdata.view(), &mut cdata.view_mut(), 0, &meta).unwrap();
        let DynArray::Real(c) = &cdata else { unreachable!() };
        for n in 0..8 {
            let expected = if n == 0 || n == 4 { 1.0 } else { 0.0 };
            assert_approx_eq!(f64, c[[n]], expected, epsilon = 1e-12);
        }

        // Sum of the subbasis integrals: 1.0 over each unit interval.
        let mut cint = DynArray::zeros(&[8], Dtype::Real);
        compound.integrate(&cdata.view(), &mut cint.view_mut(), 0, &meta).unwrap();
        let DynArray::Real(total) = &cint else { unreachable!() };
        assert_approx_eq!(f64, total[[0]], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn round_trip_through_grid_space() {
        let compound = two_chebyshev();
        let meta = AxisMeta::new(Parity::Undefined);
        let coeffs: Vec<f64> = (0..8).map(|n| 0.1 * exact_f64(n) - 0.3).collect();
        let cdata = real_1d(coeffs.clone());
        let mut gdata = DynArray::zeros(&[8], Dtype::Real);
        compound.backward(&cdata.view(), &mut gdata.view_mut(), 0, &meta).unwrap();
        let mut back = DynArray::zeros(&[8], Dtype::Real);
        compound.forward(&gdata.view(), &mut back.view_mut(), 0, &meta).unwrap();
        let DynArray::Real(back) = &back else { unreachable!() };
        for (n, expected) in coeffs.iter().enumerate() {
            assert_approx_eq!(f64, back[[n]], *expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn seam_constraint_pairs_endpoint_rows() {
        let compound = two_chebyshev();
        let matched = compound.match_matrix().unwrap();
        // The left block's boundary row (global row 3) carries the seam.
        for c in 0..4 {
            assert_eq!(matched.get(3, c), 1.0);
            let sign = if c % 2 == 0 { -1.0 } else { 1.0 };
            assert_eq!(matched.get(3, 4 + c), sign);
        }
        // A continuous function satisfies the constraint.
        let coeffs = vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let residual = matched.matvec(&coeffs);
        for value in residual {
            assert_approx_eq!(f64, value, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn interpolation_picks_containing_subbasis() {
        let compound = two_chebyshev();
        let meta = AxisMeta::new(Parity::Undefined);
        // x on [0,1] has coefficients of T1 in the first block only.
        let cdata = real_1d(vec![0.5, 0.5, 0.0, 0.0, 1.5, 0.5, 0.0, 0.0]);
        let mut cint = DynArray::zeros(&[8], Dtype::Real);
        compound
            .interpolate(&cdata.view(), &mut cint.view_mut(), 0.25, 0, &meta)
            .unwrap();
        let DynArray::Real(v) = &cint else { unreachable!() };
        // 0.5 + 0.5·T1(native(0.25)) with native = -0.5.
        assert_approx_eq!(f64, v[[0]], 0.25, epsilon = 1e-12);

        assert!(matches!(
            compound.interpolate(&cdata.view(), &mut cint.view_mut(), 2.5, 0, &meta),
            Err(Error::PositionOutsideInterval(_))
        ));
    }

    #[test]
    fn operators_are_block_diagonal() {
        let compound = two_chebyshev();
        let pre = compound.preconditioner().unwrap();
        assert_eq!(pre.get(0, 0), 1.0);
        assert_eq!(pre.get(4, 4), 1.0);
        assert_eq!(pre.get(2, 4), 0.0);
        let diff = compound.diff_matrix().unwrap();
        assert_eq!(diff.get(0, 4), 0.0);
        // Stretch 1/2 on a unit interval doubles the native weights.
        assert_eq!(diff.get(0, 1), 2.0);
    }
}
