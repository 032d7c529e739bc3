//! # Error Module
//!
//! Error types shared by the capture, synthesis and tuning layers.
//! Resource failures are classified so the presentation layer can show a
//! single inline notice; algorithmic problems (unknown note symbols) are
//! recovered locally by the functions that meet them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::instrument::Instrument;

/// Why the microphone could not be opened.
///
/// Carried in the published tuner snapshot, so it is `Clone` and
/// serializable rather than wrapping the backend error directly.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum CaptureFailure {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("no input device available")]
    NoDevice,
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),
    #[error("input device error: {0}")]
    Device(String),
}

/// A pitch-class symbol outside the twelve sharps-only names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown note symbol `{0}`")]
pub struct UnknownNote(pub String);

#[derive(Error, Debug)]
pub enum TunerError {
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(CaptureFailure),

    #[error("audio output unavailable: {0}")]
    OutputUnavailable(String),

    #[error("string {index} is out of range for {instrument} ({len} strings)")]
    StringIndexOutOfRange {
        instrument: Instrument,
        index: usize,
        len: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn analysis worker: {0}")]
    Worker(#[source] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<CaptureFailure> for TunerError {
    fn from(failure: CaptureFailure) -> Self {
        TunerError::CaptureUnavailable(failure)
    }
}

pub type Result<T> = std::result::Result<T, TunerError>;
