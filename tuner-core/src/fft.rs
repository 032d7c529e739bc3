//! # Fast Fourier Transform (FFT) Module
//!
//! FFT-backed autocorrelation for real-time pitch analysis.
//!
//! ## Features
//! - High-performance FFT using RustFFT
//! - DC offset removal for accurate analysis
//! - Linear (non-circular) autocorrelation in O(n log n) via zero padding
//! - Plans and scratch space allocated once per window size

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Removes the DC offset from a signal by making its average value zero.
///
/// A constant offset adds a large lag-independent term to the
/// autocorrelation, which flattens the normalized difference function
/// and hides the pitch period.
///
/// # Arguments
/// * `signal` - Audio signal to process (modified in-place)
pub fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Computes autocorrelations of fixed-size windows.
///
/// The window is zero-padded to at least twice its length before the
/// transform so the result is the linear autocorrelation
/// `r(tau) = sum_j x[j] * x[j + tau]` rather than the circular one.
pub struct Autocorrelator {
    window_size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Autocorrelator {
    pub fn new(window_size: usize) -> Self {
        let fft_size = (window_size * 2).next_power_of_two();
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Self {
            window_size,
            forward,
            inverse,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Writes `r(tau)` for `tau` in `0..out.len()` into `out`.
    ///
    /// At most `window_size` samples of `signal` are used and at most
    /// `window_size` lags are written.
    pub fn autocorrelate(&mut self, signal: &[f32], out: &mut [f32]) {
        let n = signal.len().min(self.window_size);
        let fft_size = self.buffer.len();

        for (slot, &sample) in self.buffer.iter_mut().zip(&signal[..n]) {
            *slot = Complex::new(sample, 0.0);
        }
        for slot in &mut self.buffer[n..] {
            *slot = Complex::new(0.0, 0.0);
        }

        self.forward
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        for bin in self.buffer.iter_mut() {
            // Power spectrum: X * conj(X)
            *bin = Complex::new(bin.norm_sqr(), 0.0);
        }
        self.inverse
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        // RustFFT does not normalize the inverse transform.
        let scale = 1.0 / fft_size as f32;
        let lags = out.len().min(self.window_size);
        for (tau, value) in out[..lags].iter_mut().enumerate() {
            *value = if tau < n { self.buffer[tau].re * scale } else { 0.0 };
        }
        for value in &mut out[lags..] {
            *value = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn naive_autocorrelation(signal: &[f32], lags: usize) -> Vec<f32> {
        (0..lags)
            .map(|tau| {
                signal[..signal.len() - tau]
                    .iter()
                    .zip(&signal[tau..])
                    .map(|(a, b)| a * b)
                    .sum()
            })
            .collect()
    }

    #[test]
    fn matches_direct_computation() {
        let signal: Vec<f32> = (0..256)
            .map(|i| (i as f32 * 0.37).sin() + 0.25 * (i as f32 * 1.3).cos())
            .collect();
        let mut correlator = Autocorrelator::new(signal.len());
        let mut out = vec![0.0; signal.len()];
        correlator.autocorrelate(&signal, &mut out);

        let expected = naive_autocorrelation(&signal, signal.len());
        for (got, want) in out.iter().zip(&expected) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-2);
        }
    }

    #[test]
    fn dc_offset_is_removed() {
        let mut signal = vec![0.5, 1.5, 0.5, 1.5];
        remove_dc_offset(&mut signal);
        assert_abs_diff_eq!(signal.iter().sum::<f32>(), 0.0, epsilon = 1e-6);
        assert_eq!(signal, vec![-0.5, 0.5, -0.5, 0.5]);
    }

    #[test]
    fn empty_signal_is_untouched() {
        let mut signal: Vec<f32> = Vec::new();
        remove_dc_offset(&mut signal);
        assert!(signal.is_empty());
    }
}
