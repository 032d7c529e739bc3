//! # Tuning State Machine
//!
//! Drives the detect loop: once per frame the analysis worker samples the
//! capture window, runs the pitch estimator, gates the reading by clarity,
//! converts it to a note and publishes a [`TunerSnapshot`].
//!
//! ## Features
//! - `Inactive <-> Active` lifecycle; `stop()` halts analysis but keeps
//!   the microphone open until `shutdown()`
//! - Per-instrument clarity thresholds
//! - Offset against the selected string as well as the nearest note
//! - Capture failures published once per `start()` and cleared by the next
//!   successful one
//!
//! All readings come from a single worker and are published under one
//! lock, so subscribers always see them in capture order.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::audio::{CaptureSession, CaptureState, CaptureTap, CpalInput, InputDevice};
use crate::config::TunerConfig;
use crate::error::{CaptureFailure, Result, TunerError};
use crate::instrument::{Instrument, TuningTarget};
use crate::observe::StatePublisher;
use crate::pitch::{PitchDetector, PitchEstimator, PitchReading};
use crate::schedule::RepeatingTask;
use crate::tuning::{cents_deviation, note_from_frequency, Accuracy, NoteEstimate, TuningStatus};

/// Everything the tuner view renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TunerSnapshot {
    pub is_active: bool,
    /// Gated frequency; 0 when no pitch passed the clarity threshold.
    pub frequency_hz: f32,
    pub clarity: f32,
    pub note: NoteEstimate,
    pub target: TuningTarget,
    /// Offset from the selected string, absent without a pitch.
    pub target_cents_off: Option<f32>,
    pub error: Option<CaptureFailure>,
}

impl Default for TunerSnapshot {
    fn default() -> Self {
        Self {
            is_active: false,
            frequency_hz: 0.0,
            clarity: 0.0,
            note: NoteEstimate::NONE,
            target: TuningTarget::default(),
            target_cents_off: None,
            error: None,
        }
    }
}

impl TunerSnapshot {
    pub fn note_name(&self) -> &'static str {
        self.note.note_name()
    }

    pub fn cents_off(&self) -> i32 {
        self.note.cents_off
    }

    pub fn status(&self) -> TuningStatus {
        TuningStatus::classify(self.is_active, &self.note)
    }

    pub fn accuracy(&self) -> Accuracy {
        Accuracy::from_cents(self.note.cents_off)
    }

    /// Folds one analysis result into the snapshot.
    fn apply_reading(&mut self, reading: PitchReading, threshold: f32) {
        self.frequency_hz = reading.gated(threshold);
        self.clarity = reading.clarity;
        self.note = note_from_frequency(self.frequency_hz);
        self.refresh_target_offset();
    }

    fn refresh_target_offset(&mut self) {
        self.target_cents_off = (self.frequency_hz > 0.0)
            .then(|| cents_deviation(self.frequency_hz, self.target.frequency_hz()));
    }
}

type BoxedEstimator = Box<dyn PitchEstimator + Send>;

/// State owned by the analysis worker while the tuner is active.
struct Analyzer {
    tap: CaptureTap,
    estimator: BoxedEstimator,
    config: TunerConfig,
    publisher: Arc<StatePublisher<TunerSnapshot>>,
}

impl Analyzer {
    fn tick(&mut self) {
        let samples = self.tap.sample_once();
        if samples.is_empty() {
            trace!("No samples available, skipping frame");
            return;
        }

        let reading = self.estimator.analyze(&samples, self.tap.sample_rate());
        trace!(
            "Reading {:.2} Hz, clarity {:.3}",
            reading.frequency_hz,
            reading.clarity
        );

        let config = &self.config;
        self.publisher.update(|snapshot| {
            let threshold = config.clarity_threshold_for(snapshot.target.instrument());
            snapshot.apply_reading(reading, threshold);
        });
    }
}

pub struct Tuner<D: InputDevice = CpalInput> {
    capture: CaptureSession<D>,
    config: TunerConfig,
    publisher: Arc<StatePublisher<TunerSnapshot>>,
    task: Option<RepeatingTask<Analyzer>>,
    /// Parked here while inactive; moved into the worker while active.
    estimator: Option<BoxedEstimator>,
}

impl Tuner<CpalInput> {
    pub fn with_default_input(config: TunerConfig) -> Result<Self> {
        Self::new(CpalInput::new(), config)
    }
}

impl<D: InputDevice> Tuner<D> {
    /// A tuner using the McLeod detector sized from `config`.
    pub fn new(device: D, config: TunerConfig) -> Result<Self> {
        // Validate before sizing any buffers from the config.
        config.validate()?;
        let detector = default_detector(&config);
        Self::with_estimator(device, config, Box::new(detector))
    }

    pub fn with_estimator(device: D, config: TunerConfig, estimator: BoxedEstimator) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            capture: CaptureSession::new(device, config.window_size),
            config,
            publisher: Arc::new(StatePublisher::new(TunerSnapshot::default())),
            task: None,
            estimator: Some(estimator),
        })
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn capture(&self) -> &CaptureSession<D> {
        &self.capture
    }

    pub fn snapshot(&self) -> TunerSnapshot {
        self.publisher.snapshot()
    }

    pub fn subscribe(&self) -> Receiver<TunerSnapshot> {
        self.publisher.subscribe()
    }

    pub fn target(&self) -> TuningTarget {
        self.snapshot().target
    }

    /// Opens the microphone if needed and starts the detect loop.
    ///
    /// A capture failure is published in the snapshot and returned; the
    /// tuner stays inactive and nothing is retried.
    pub fn start(&mut self) -> Result<()> {
        if self.is_active() {
            debug!("start() while already active, ignoring");
            return Ok(());
        }

        let tap = self
            .capture
            .initialize()
            .and_then(|_| {
                self.capture
                    .tap()
                    .ok_or_else(|| CaptureFailure::Device("capture is not listening".to_string()))
            });
        let tap = match tap {
            Ok(tap) => tap,
            Err(failure) => {
                self.publisher.update(|s| {
                    s.is_active = false;
                    s.error = Some(failure.clone());
                });
                return Err(TunerError::CaptureUnavailable(failure));
            }
        };

        let estimator = self
            .estimator
            .take()
            .unwrap_or_else(|| Box::new(default_detector(&self.config)) as BoxedEstimator);

        self.publisher.update(|s| {
            s.is_active = true;
            s.error = None;
        });

        let analyzer = Analyzer {
            tap,
            estimator,
            config: self.config.clone(),
            publisher: Arc::clone(&self.publisher),
        };
        match RepeatingTask::spawn("tuner-analysis", self.config.frame_interval(), analyzer, Analyzer::tick) {
            Ok(task) => {
                info!("Tuner started");
                self.task = Some(task);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to start analysis worker: {}", e);
                self.publisher.update(|s| s.is_active = false);
                Err(TunerError::Worker(e))
            }
        }
    }

    /// Halts analysis. The microphone stays reserved until
    /// [`Tuner::shutdown`]. No snapshot is published after this returns.
    pub fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        match task.cancel() {
            Some(analyzer) => self.estimator = Some(analyzer.estimator),
            None => warn!("Analysis worker did not finish cleanly, detector will be rebuilt"),
        }
        self.publisher.update(|s| s.is_active = false);
        info!("Tuner stopped");
    }

    /// Stops analysis and releases the microphone.
    pub fn shutdown(&mut self) {
        self.stop();
        self.capture.shutdown();
    }

    /// Switches instrument and resets the target to its first string.
    pub fn select_instrument(&self, instrument: Instrument) {
        debug!("Instrument selected: {}", instrument.label());
        self.publisher.update(|s| {
            s.target = TuningTarget::new(instrument);
            s.refresh_target_offset();
        });
    }

    /// Selects a string of the current instrument.
    pub fn select_target_note_index(&self, index: usize) -> Result<TuningTarget> {
        let instrument = self.target().instrument();
        let target = TuningTarget::with_string(instrument, index)?;
        self.publisher.update(|s| {
            s.target = target;
            s.refresh_target_offset();
        });
        Ok(target)
    }
}

impl<D: InputDevice> Drop for Tuner<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn default_detector(config: &TunerConfig) -> PitchDetector {
    PitchDetector::new(config.window_size).with_noise_gate(config.noise_gate_rms)
}
