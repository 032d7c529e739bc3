//! # Configuration
//!
//! Tunable parameters for the detect loop and the tone generator, loaded
//! from JSON. Every field has a default, so a config file only lists what
//! it changes. Settings are read, never written back.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audio::WINDOW_SIZE;
use crate::error::{Result, TunerError};
use crate::instrument::Instrument;
use crate::tuning::PitchClass;

/// Clarity a reading must exceed before its pitch is reported.
pub const DEFAULT_CLARITY_THRESHOLD: f32 = 0.9;

/// About one display frame at 60 Hz.
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

const MIN_WINDOW_SIZE: usize = 256;

/// Largest analysis window accepted; several seconds of audio at any
/// common sample rate.
const MAX_WINDOW_SIZE: usize = 1 << 17;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub clarity_threshold: f32,
    /// Per-instrument overrides of `clarity_threshold`.
    pub instrument_thresholds: BTreeMap<Instrument, f32>,
    pub window_size: usize,
    pub frame_interval_ms: u64,
    /// RMS below which a window is treated as silence. 0 disables the gate.
    pub noise_gate_rms: f32,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            clarity_threshold: DEFAULT_CLARITY_THRESHOLD,
            instrument_thresholds: BTreeMap::new(),
            window_size: WINDOW_SIZE,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            noise_gate_rms: 0.0,
        }
    }
}

impl TunerConfig {
    pub fn clarity_threshold_for(&self, instrument: Instrument) -> f32 {
        self.instrument_thresholds
            .get(&instrument)
            .copied()
            .unwrap_or(self.clarity_threshold)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let thresholds = std::iter::once(("default", self.clarity_threshold)).chain(
            self.instrument_thresholds
                .iter()
                .map(|(instrument, &t)| (instrument.label(), t)),
        );
        for (name, threshold) in thresholds {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(TunerError::InvalidConfig(format!(
                    "clarity threshold for {name} must be within [0, 1], got {threshold}"
                )));
            }
        }
        if !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&self.window_size) {
            return Err(TunerError::InvalidConfig(format!(
                "window_size must be within [{MIN_WINDOW_SIZE}, {MAX_WINDOW_SIZE}], got {}",
                self.window_size
            )));
        }
        if self.frame_interval_ms == 0 {
            return Err(TunerError::InvalidConfig(
                "frame_interval_ms must be positive".to_string(),
            ));
        }
        if !(self.noise_gate_rms >= 0.0) {
            return Err(TunerError::InvalidConfig(format!(
                "noise_gate_rms must be non-negative, got {}",
                self.noise_gate_rms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    /// UI volume in [0, 1]; the gain curve is applied on top.
    pub initial_volume: f32,
    /// Fade-in applied to each new oscillator.
    pub attack_ms: f32,
    pub note: PitchClass,
    pub octave: i32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            initial_volume: 1.0,
            attack_ms: 5.0,
            note: PitchClass::A,
            octave: 4,
        }
    }
}

impl ToneConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(TunerError::InvalidConfig(format!(
                "initial_volume must be within [0, 1], got {}",
                self.initial_volume
            )));
        }
        if !(self.attack_ms.is_finite() && self.attack_ms >= 0.0) {
            return Err(TunerError::InvalidConfig(format!(
                "attack_ms must be a non-negative number, got {}",
                self.attack_ms
            )));
        }
        Ok(())
    }
}

/// Top-level config file layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tuner: TunerConfig,
    pub tone: ToneConfig,
}

impl Settings {
    /// Loads and validates a JSON settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let settings = Self::from_json(&data)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(data)?;
        settings.tuner.validate()?;
        settings.tone.validate()?;
        Ok(settings)
    }
}
