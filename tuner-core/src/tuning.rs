//! # Musical Tuning Module
//!
//! Equal-temperament note math referenced to A4 = 440 Hz.
//! Converts detected frequencies to the nearest pitch class with a cent
//! offset, and note/octave pairs back to frequencies.
//!
//! ## Features
//! - Twelve sharps-only pitch classes starting at C
//! - Frequency to nearest note with cents in [-50, 50]
//! - Note and octave to frequency, falling back to A4 for unknown symbols
//! - Cent deviation against an arbitrary target frequency
//! - Tuning status classification for displays

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownNote;

/// Reference pitch for A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;

/// Note names in table order, starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Position of A in [`NOTE_NAMES`].
const A_INDEX: i32 = 9;

/// Offset (cents) under which a reading counts as in tune.
pub const IN_TUNE_CENTS: i32 = 5;

/// Offset (cents) under which a reading counts as close.
pub const CLOSE_CENTS: i32 = 15;

/// Frequency of C0, 4.75 octaves below A4.
fn c0_frequency() -> f32 {
    A4_FREQUENCY * 2.0_f32.powf(-4.75)
}

/// One of the twelve pitch classes, independent of octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "D#")]
    DSharp,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "G#")]
    GSharp,
    A,
    #[serde(rename = "A#")]
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Index in the C-based table (C = 0, A = 9, B = 11).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Pitch class for any half-step count. Negative counts wrap around
    /// with a non-negative modulo.
    pub fn from_half_steps(half_steps: i32) -> Self {
        Self::ALL[half_steps.rem_euclid(12) as usize]
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES[self.index()]
    }

    /// Equal-temperament frequency of this pitch class in `octave`.
    pub fn frequency(self, octave: i32) -> f32 {
        let semitones_from_a4 = (octave - 4) * 12 + (self.index() as i32 - A_INDEX);
        A4_FREQUENCY * 2.0_f32.powf(semitones_from_a4 as f32 / 12.0)
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = UnknownNote;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NOTE_NAMES
            .iter()
            .position(|name| *name == s)
            .map(|i| Self::ALL[i])
            .ok_or_else(|| UnknownNote(s.to_string()))
    }
}

/// A pitch class in a specific octave, e.g. `A4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub pitch_class: PitchClass,
    pub octave: i32,
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

/// Nearest note to a frequency and how far off it is.
///
/// `note` is `None` when no pitch was detected; `cents_off` is then 0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NoteEstimate {
    pub note: Option<Note>,
    pub cents_off: i32,
}

impl NoteEstimate {
    pub const NONE: NoteEstimate = NoteEstimate {
        note: None,
        cents_off: 0,
    };

    /// Pitch-class symbol, or an empty string when nothing was detected.
    pub fn note_name(&self) -> &'static str {
        self.note.map_or("", |n| n.pitch_class.name())
    }

    pub fn is_detected(&self) -> bool {
        self.note.is_some()
    }
}

/// Finds the nearest equal-tempered note to a frequency.
///
/// Fails closed: non-positive or non-finite input yields
/// [`NoteEstimate::NONE`].
///
/// # Arguments
/// * `freq` - Frequency in Hz
///
/// # Returns
/// * The nearest note and the offset from it in whole cents, in [-50, 50]
pub fn note_from_frequency(freq: f32) -> NoteEstimate {
    if !(freq > 0.0 && freq.is_finite()) {
        return NoteEstimate::NONE;
    }

    let exact_half_steps = 12.0 * (freq / c0_frequency()).log2();
    let half_steps = exact_half_steps.round();
    let cents_off = ((exact_half_steps - half_steps) * 100.0).round() as i32;

    let half_steps = half_steps as i32;
    NoteEstimate {
        note: Some(Note {
            pitch_class: PitchClass::from_half_steps(half_steps),
            octave: half_steps.div_euclid(12),
        }),
        cents_off,
    }
}

/// Frequency of a note given by symbol and octave.
///
/// Unknown symbols fall back to A4 (440 Hz) instead of failing; callers
/// are expected to pass one of [`NOTE_NAMES`].
pub fn frequency_from_note(note: &str, octave: i32) -> f32 {
    match note.parse::<PitchClass>() {
        Ok(pitch_class) => pitch_class.frequency(octave),
        Err(e) => {
            tracing::debug!("{e}, falling back to A4");
            A4_FREQUENCY
        }
    }
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat. 100 cents make a
/// semitone and 1200 an octave.
pub fn cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Coarse verdict shown next to the needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningStatus {
    /// Not listening, or listening without a detected pitch.
    Ready,
    InTune,
    Sharp,
    Flat,
}

impl TuningStatus {
    pub fn classify(is_listening: bool, estimate: &NoteEstimate) -> Self {
        if !is_listening || !estimate.is_detected() {
            return TuningStatus::Ready;
        }
        let cents = estimate.cents_off;
        if cents.abs() < IN_TUNE_CENTS {
            TuningStatus::InTune
        } else if cents > 0 {
            TuningStatus::Sharp
        } else {
            TuningStatus::Flat
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TuningStatus::Ready => "Ready to tune",
            TuningStatus::InTune => "In tune!",
            TuningStatus::Sharp => "Too sharp",
            TuningStatus::Flat => "Too flat",
        }
    }
}

/// Colour band for a cent offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    Good,
    Close,
    Off,
}

impl Accuracy {
    pub fn from_cents(cents: i32) -> Self {
        match cents.abs() {
            c if c < IN_TUNE_CENTS => Accuracy::Good,
            c if c < CLOSE_CENTS => Accuracy::Close,
            _ => Accuracy::Off,
        }
    }
}
