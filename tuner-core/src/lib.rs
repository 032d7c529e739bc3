// tuner-core/src/lib.rs

//! The core logic for the instrument tuner and tone generator.
//! This crate is responsible for audio capture, pitch detection, note
//! math and tone synthesis. It is completely headless and contains no
//! presentation code; front ends read published snapshots and call the
//! session commands.

pub mod app;
pub mod audio;
pub mod config;
pub mod error;
pub mod fft;
pub mod instrument;
pub mod observe;
pub mod pitch;
pub mod schedule;
pub mod synth;
pub mod tone;
pub mod tuner;
pub mod tuning;

pub use app::{TunerApp, View};
pub use config::{Settings, ToneConfig, TunerConfig};
pub use error::{CaptureFailure, Result, TunerError};
pub use instrument::{Instrument, TuningTarget};
pub use pitch::{PitchDetector, PitchEstimator, PitchReading};
pub use tone::{ToneGenerator, ToneSnapshot, ToneTarget};
pub use tuner::{Tuner, TunerSnapshot};
pub use tuning::{frequency_from_note, note_from_frequency, NoteEstimate, PitchClass};
