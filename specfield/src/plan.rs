//! Transform kernels: lazily built, retained plans plus their direct
//! definition-sum counterparts.
//!
//! Plans are keyed on transform length, built on first use, and retained for
//! the lifetime of their owning basis. Each build is logged once. The direct
//! kernels evaluate the same conventions with no cached state and exist to
//! cross-check the planned path.

use crate::config::PlanRigor;
use itertools::zip_eq;
use log::debug;
use ndarray::{ArrayViewD, ArrayViewMutD, Axis};
use num_complex::Complex64;
use rustc_hash::FxHashMap;
use rustdct::{DctPlanner, TransformType2And3};
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

/// Retained kernels of one basis.
pub(crate) struct PlanCache {
    rigor: PlanRigor,
    fft_planner: Mutex<FftPlanner<f64>>,
    dct_planner: Mutex<DctPlanner<f64>>,
    ffts: Mutex<FxHashMap<(bool, usize), Arc<dyn Fft<f64>>>>,
    dcts: Mutex<FxHashMap<usize, Arc<dyn TransformType2And3<f64>>>>,
}

impl std::fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ffts = self.ffts.lock().unwrap().len();
        let dcts = self.dcts.lock().unwrap().len();
        f.debug_struct("PlanCache")
            .field("rigor", &self.rigor)
            .field("ffts", &ffts)
            .field("dcts", &dcts)
            .finish()
    }
}

impl PlanCache {
    pub fn new(rigor: PlanRigor) -> Self {
        Self {
            rigor,
            fft_planner: Mutex::new(FftPlanner::new()),
            dct_planner: Mutex::new(DctPlanner::new()),
            ffts: Mutex::new(FxHashMap::default()),
            dcts: Mutex::new(FxHashMap::default()),
        }
    }

    /// Complex transform plan of the given length and direction.
    pub fn fft(&self, len: usize, inverse: bool) -> Arc<dyn Fft<f64>> {
        let mut plans = self.ffts.lock().unwrap();
        Arc::clone(plans.entry((inverse, len)).or_insert_with(|| {
            debug!(
                "building FFT plan for (len, inverse, rigor) = ({}, {}, {})",
                len,
                inverse,
                self.rigor.label()
            );
            let mut planner = self.fft_planner.lock().unwrap();
            if inverse {
                planner.plan_fft_inverse(len)
            } else {
                planner.plan_fft_forward(len)
            }
        }))
    }

    /// Cosine/sine transform plan of the given length; one plan serves the
    /// type-II and type-III variants in both families.
    pub fn dct(&self, len: usize) -> Arc<dyn TransformType2And3<f64>> {
        let mut plans = self.dcts.lock().unwrap();
        Arc::clone(plans.entry(len).or_insert_with(|| {
            debug!(
                "building DCT plan for (len, rigor) = ({}, {})",
                len,
                self.rigor.label()
            );
            self.dct_planner.lock().unwrap().plan_dct2(len)
        }))
    }
}

/// Applies a lane kernel along `axis`, pairing each input lane with the
/// corresponding output lane. Lanes are staged through contiguous scratch
/// slices, which the kernels require; the output scratch arrives zeroed.
pub(crate) fn apply_lanes<T, U, F>(
    input: &ArrayViewD<'_, T>,
    output: &mut ArrayViewMutD<'_, U>,
    axis: usize,
    mut kernel: F,
) where
    T: Copy + Default,
    U: Copy + Default,
    F: FnMut(&[T], &mut [U]),
{
    let n_in = input.len_of(Axis(axis));
    let n_out = output.len_of(Axis(axis));
    let mut scratch_in = vec![T::default(); n_in];
    let mut scratch_out = vec![U::default(); n_out];
    for (in_lane, mut out_lane) in zip_eq(input.lanes(Axis(axis)), output.lanes_mut(Axis(axis))) {
        for (dst, src) in scratch_in.iter_mut().zip(&in_lane) {
            *dst = *src;
        }
        for slot in scratch_out.iter_mut() {
            *slot = U::default();
        }
        kernel(&scratch_in, &mut scratch_out);
        for (dst, src) in out_lane.iter_mut().zip(&scratch_out) {
            *dst = *src;
        }
    }
}

/// Unscaled discrete Fourier transform by the definition sum.
pub(crate) fn direct_dft(buffer: &mut [Complex64], inverse: bool) {
    let n = buffer.len();
    let sign = if inverse { 1.0 } else { -1.0 };
    let mut out = vec![Complex64::new(0.0, 0.0); n];
    for (k, slot) in out.iter_mut().enumerate() {
        for (j, &x) in buffer.iter().enumerate() {
            let angle = sign * 2.0 * PI * ((k * j) % n) as f64 / n as f64;
            *slot += x * Complex64::new(angle.cos(), angle.sin());
        }
    }
    buffer.copy_from_slice(&out);
}

/// Type-II cosine transform, matching the planned kernel's convention:
/// `out[k] = Σ_n in[n]·cos(π(n+½)k/N)`.
pub(crate) fn direct_dct2(buffer: &mut [f64]) {
    let n = buffer.len();
    let mut out = vec![0.0; n];
    for (k, slot) in out.iter_mut().enumerate() {
        for (j, &x) in buffer.iter().enumerate() {
            *slot += x * (PI * (j as f64 + 0.5) * k as f64 / n as f64).cos();
        }
    }
    buffer.copy_from_slice(&out);
}

/// Type-III cosine transform, matching the planned kernel's convention:
/// `out[k] = in[0]/2 + Σ_{n≥1} in[n]·cos(πn(k+½)/N)`.
pub(crate) fn direct_dct3(buffer: &mut [f64]) {
    let n = buffer.len();
    let mut out = vec![0.0; n];
    for (k, slot) in out.iter_mut().enumerate() {
        *slot = buffer[0] / 2.0;
        for (j, &x) in buffer.iter().enumerate().skip(1) {
            *slot += x * (PI * j as f64 * (k as f64 + 0.5) / n as f64).cos();
        }
    }
    buffer.copy_from_slice(&out);
}

/// Type-II sine transform, matching the planned kernel's convention:
/// `out[k] = Σ_n in[n]·sin(π(n+½)(k+1)/N)`.
pub(crate) fn direct_dst2(buffer: &mut [f64]) {
    let n = buffer.len();
    let mut out = vec![0.0; n];
    for (k, slot) in out.iter_mut().enumerate() {
        for (j, &x) in buffer.iter().enumerate() {
            *slot += x * (PI * (j as f64 + 0.5) * (k as f64 + 1.0) / n as f64).sin();
        }
    }
    buffer.copy_from_slice(&out);
}

/// Type-III sine transform, matching the planned kernel's convention:
/// `out[k] = (−1)^k·in[N−1]/2 + Σ_{n<N−1} in[n]·sin(π(n+1)(k+½)/N)`.
pub(crate) fn direct_dst3(buffer: &mut [f64]) {
    let n = buffer.len();
    let mut out = vec![0.0; n];
    for (k, slot) in out.iter_mut().enumerate() {
        *slot = buffer[n - 1] / 2.0 * if k % 2 == 0 { 1.0 } else { -1.0 };
        for (j, &x) in buffer.iter().enumerate().take(n - 1) {
            *slot += x * (PI * (j as f64 + 1.0) * (k as f64 + 0.5) / n as f64).sin();
        }
    }
    buffer.copy_from_slice(&out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn planned_and_direct_fft_agree() {
        let cache = PlanCache::new(PlanRigor::Estimate);
        let mut planned: Vec<_> = (0..8)
            .map(|i| Complex64::new(f64::from(i), f64::from(i % 3)))
            .collect();
        let mut direct = planned.clone();
        cache.fft(8, false).process(&mut planned);
        direct_dft(&mut direct, false);
        for (p, d) in planned.iter().zip(&direct) {
            assert_approx_eq!(f64, p.re, d.re, epsilon = 1e-10);
            assert_approx_eq!(f64, p.im, d.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn planned_and_direct_cosine_agree() {
        let cache = PlanCache::new(PlanRigor::Estimate);
        let data: Vec<f64> = (0..6).map(|i| f64::from(i) - 2.5).collect();

        let mut planned = data.clone();
        let mut direct = data.clone();
        cache.dct(6).process_dct2(&mut planned);
        direct_dct2(&mut direct);
        for (p, d) in planned.iter().zip(&direct) {
            assert_approx_eq!(f64, *p, *d, epsilon = 1e-10);
        }

        let mut planned = data.clone();
        let mut direct = data;
        cache.dct(6).process_dct3(&mut planned);
        direct_dct3(&mut direct);
        for (p, d) in planned.iter().zip(&direct) {
            assert_approx_eq!(f64, *p, *d, epsilon = 1e-10);
        }
    }

    #[test]
    fn planned_and_direct_sine_agree() {
        let cache = PlanCache::new(PlanRigor::Estimate);
        let data: Vec<f64> = (0..6).map(|i| (f64::from(i) * 0.7).sin()).collect();

        let mut planned = data.clone();
        let mut direct = data.clone();
        cache.dct(6).process_dst2(&mut planned);
        direct_dst2(&mut direct);
        for (p, d) in planned.iter().zip(&direct) {
            assert_approx_eq!(f64, *p, *d, epsilon = 1e-10);
        }

        // The engine always feeds a zero trailing slot into the type-III
        // sine transform (there is no stored mode at the grid frequency).
        let mut data = data;
        data[5] = 0.0;
        let mut planned = data.clone();
        let mut direct = data;
        cache.dct(6).process_dst3(&mut planned);
        direct_dst3(&mut direct);
        for (p, d) in planned.iter().zip(&direct) {
            assert_approx_eq!(f64, *p, *d, epsilon = 1e-10);
        }
    }

    #[test]
    fn dft_inverse_round_trip() {
        let mut data: Vec<_> = (0..5).map(|i| Complex64::new(f64::from(i), -1.0)).collect();
        let original = data.clone();
        direct_dft(&mut data, false);
        direct_dft(&mut data, true);
        for (x, y) in data.iter().zip(&original) {
            assert_approx_eq!(f64, x.re / 5.0, y.re, epsilon = 1e-12);
            assert_approx_eq!(f64, x.im / 5.0, y.im, epsilon = 1e-12);
        }
    }
}
