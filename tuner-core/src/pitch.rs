//! # Pitch Detection Module
//!
//! Monophonic fundamental-frequency estimation for instrument tuning.
//! The detector implements the McLeod Pitch Method: a normalized square
//! difference function (NSDF) computed from an FFT autocorrelation,
//! followed by key-maximum picking and parabolic interpolation.
//!
//! ## Features
//! - Clarity score in [0, 1] taken from the NSDF peak height
//! - Octave error prevention by choosing the first key maximum within
//!   a fraction of the highest one
//! - Parabolic interpolation for sub-sample accuracy
//! - Optional RMS noise gate to skip analysis of silence
//!
//! No pitch is reported as a zero reading, never as an error. Callers
//! apply their own clarity threshold.

use serde::{Deserialize, Serialize};

use crate::fft::{remove_dc_offset, Autocorrelator};

/// Fraction of the highest NSDF key maximum a peak must reach to be
/// chosen as the pitch period.
const KEY_MAXIMUM_CUTOFF: f32 = 0.9;

/// Lowest frequency reported; anything below is treated as no pitch.
const MIN_FREQUENCY: f32 = 20.0;

/// One analysis result.
///
/// `frequency_hz` is 0 when no fundamental was found.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PitchReading {
    pub frequency_hz: f32,
    pub clarity: f32,
}

impl PitchReading {
    pub const SILENT: PitchReading = PitchReading {
        frequency_hz: 0.0,
        clarity: 0.0,
    };

    /// Frequency if the clarity is strictly above `threshold`, otherwise 0.
    pub fn gated(&self, threshold: f32) -> f32 {
        if self.clarity > threshold {
            self.frequency_hz
        } else {
            0.0
        }
    }
}

/// Anything that turns a window of samples into a [`PitchReading`].
pub trait PitchEstimator {
    fn analyze(&mut self, samples: &[f32], sample_rate: u32) -> PitchReading;
}

/// McLeod pitch detector for a fixed window size.
///
/// All buffers are allocated up front; [`PitchEstimator::analyze`] does
/// not allocate.
pub struct PitchDetector {
    autocorrelator: Autocorrelator,
    signal: Vec<f32>,
    nsdf: Vec<f32>,
    maxima: Vec<usize>,
    noise_gate_rms: f32,
}

impl PitchDetector {
    pub fn new(window_size: usize) -> Self {
        Self {
            autocorrelator: Autocorrelator::new(window_size),
            signal: vec![0.0; window_size],
            nsdf: vec![0.0; window_size],
            maxima: Vec::with_capacity(window_size / 2),
            noise_gate_rms: 0.0,
        }
    }

    /// Windows whose RMS is below `rms` are reported as silent without
    /// running the analysis.
    pub fn with_noise_gate(mut self, rms: f32) -> Self {
        self.noise_gate_rms = rms.max(0.0);
        self
    }

    pub fn window_size(&self) -> usize {
        self.autocorrelator.window_size()
    }

    /// Fills `self.nsdf[..lags]` for the first `n` samples of
    /// `self.signal`. Lags stop at half the window so every value is
    /// computed over at least `n / 2` overlapping samples.
    fn compute_nsdf(&mut self, n: usize) -> usize {
        let lags = n / 2;
        self.autocorrelator
            .autocorrelate(&self.signal[..n], &mut self.nsdf[..lags]);

        // m(tau) = sum over the overlap of x[j]^2 + x[j + tau]^2, updated
        // incrementally by dropping one sample from each end.
        let mut m = 2.0 * self.nsdf[0];
        for tau in 0..lags {
            if tau > 0 {
                let head = self.signal[tau - 1];
                let tail = self.signal[n - tau];
                m -= head * head + tail * tail;
            }
            self.nsdf[tau] = if m > 0.0 {
                (2.0 * self.nsdf[tau] / m).clamp(-1.0, 1.0)
            } else {
                0.0
            };
        }
        lags
    }

    /// Picks the pitch period from the NSDF and returns the interpolated
    /// lag with its peak height.
    fn pick_period(&mut self, lags: usize) -> Option<(f32, f32)> {
        let nsdf = &self.nsdf[..lags];
        key_maxima(nsdf, &mut self.maxima);

        let highest = self
            .maxima
            .iter()
            .map(|&tau| nsdf[tau])
            .fold(f32::NEG_INFINITY, f32::max);
        if !highest.is_finite() || highest <= 0.0 {
            return None;
        }

        let cutoff = KEY_MAXIMUM_CUTOFF * highest;
        let tau = self.maxima.iter().copied().find(|&tau| nsdf[tau] >= cutoff)?;

        Some(parabolic_peak(nsdf, tau))
    }
}

impl PitchEstimator for PitchDetector {
    /// Estimates the fundamental frequency of one window.
    ///
    /// # Arguments
    /// * `samples` - Time-domain samples; only the first `window_size` are used
    /// * `sample_rate` - Sample rate in Hz
    ///
    /// # Returns
    /// * The detected frequency with its clarity, or [`PitchReading::SILENT`]
    ///   for silence, noise and windows too short to analyze
    fn analyze(&mut self, samples: &[f32], sample_rate: u32) -> PitchReading {
        let n = samples.len().min(self.window_size());
        if n < 4 || sample_rate == 0 {
            return PitchReading::SILENT;
        }

        self.signal[..n].copy_from_slice(&samples[..n]);
        remove_dc_offset(&mut self.signal[..n]);

        // --- Noise Gate: skip silence before spending an FFT on it ---
        let rms = (self.signal[..n].iter().map(|&s| s * s).sum::<f32>() / n as f32).sqrt();
        if rms == 0.0 || rms < self.noise_gate_rms {
            return PitchReading::SILENT;
        }

        let lags = self.compute_nsdf(n);

        let Some((period, clarity)) = self.pick_period(lags) else {
            return PitchReading::SILENT;
        };

        let frequency = sample_rate as f32 / period;
        if !frequency.is_finite() || frequency < MIN_FREQUENCY {
            return PitchReading::SILENT;
        }

        PitchReading {
            frequency_hz: frequency,
            clarity: clarity.clamp(0.0, 1.0),
        }
    }
}

/// Collects into `maxima` the highest local maximum in each positive lobe
/// of the NSDF, skipping the lobe around lag 0.
fn key_maxima(nsdf: &[f32], maxima: &mut Vec<usize>) {
    let len = nsdf.len();
    maxima.clear();

    let mut i = 1;
    while i < len && nsdf[i] > 0.0 {
        i += 1;
    }
    while i < len && nsdf[i] <= 0.0 {
        i += 1;
    }

    let mut current: Option<usize> = None;
    while i + 1 < len {
        if nsdf[i] > 0.0 {
            if nsdf[i] > nsdf[i - 1] && nsdf[i] >= nsdf[i + 1] {
                current = match current {
                    Some(best) if nsdf[best] >= nsdf[i] => Some(best),
                    _ => Some(i),
                };
            }
        } else if let Some(best) = current.take() {
            maxima.push(best);
        }
        i += 1;
    }
    if let Some(best) = current {
        maxima.push(best);
    }
}

/// Fits a parabola through `tau - 1`, `tau`, `tau + 1` and returns the
/// vertex position and height.
fn parabolic_peak(values: &[f32], tau: usize) -> (f32, f32) {
    if tau == 0 || tau + 1 >= values.len() {
        return (tau as f32, values[tau]);
    }

    let y1 = values[tau - 1];
    let y2 = values[tau];
    let y3 = values[tau + 1];

    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() < f32::EPSILON {
        return (tau as f32, y2);
    }

    let shift = (y1 - y3) / (2.0 * denominator);
    (tau as f32 + shift, y2 - 0.25 * (y1 - y3) * shift)
}
