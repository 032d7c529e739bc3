//! # Instrument Tables
//!
//! Fixed open-string tunings for the supported instruments and the
//! user-selected [`TuningTarget`]. The tables are static data owned by the
//! core; frequencies are the rounded values shown to users, not values
//! recomputed from note math.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TunerError;
use crate::tuning::PitchClass;

/// One open string: its pitch class and target frequency in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningString {
    pub note: PitchClass,
    pub frequency_hz: f32,
}

const fn string(note: PitchClass, frequency_hz: f32) -> TuningString {
    TuningString { note, frequency_hz }
}

/// Guitar in standard tuning, low E to high E.
static GUITAR_STANDARD: [TuningString; 6] = [
    string(PitchClass::E, 82.4),
    string(PitchClass::A, 110.0),
    string(PitchClass::D, 146.8),
    string(PitchClass::G, 196.0),
    string(PitchClass::B, 246.9),
    string(PitchClass::E, 329.6),
];

static VIOLIN: [TuningString; 4] = [
    string(PitchClass::G, 196.0),
    string(PitchClass::D, 293.7),
    string(PitchClass::A, 440.0),
    string(PitchClass::E, 659.3),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    #[default]
    Guitar,
    Violin,
}

impl Instrument {
    pub const ALL: [Instrument; 2] = [Instrument::Guitar, Instrument::Violin];

    pub fn strings(self) -> &'static [TuningString] {
        match self {
            Instrument::Guitar => &GUITAR_STANDARD,
            Instrument::Violin => &VIOLIN,
        }
    }

    /// Name of the tuning as shown in selectors.
    pub fn label(self) -> &'static str {
        match self {
            Instrument::Guitar => "Guitar (Standard)",
            Instrument::Violin => "Violin",
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Guitar => f.write_str("guitar"),
            Instrument::Violin => f.write_str("violin"),
        }
    }
}

impl FromStr for Instrument {
    type Err = TunerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "guitar" => Ok(Instrument::Guitar),
            "violin" => Ok(Instrument::Violin),
            other => Err(TunerError::InvalidConfig(format!("unknown instrument `{other}`"))),
        }
    }
}

/// The string the user is tuning.
///
/// `string_index` always indexes validly into the instrument's table; the
/// constructors reject anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TuningTarget {
    instrument: Instrument,
    string_index: usize,
}

impl TuningTarget {
    /// First string of `instrument`.
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            string_index: 0,
        }
    }

    pub fn with_string(instrument: Instrument, string_index: usize) -> Result<Self, TunerError> {
        let len = instrument.strings().len();
        if string_index >= len {
            return Err(TunerError::StringIndexOutOfRange {
                instrument,
                index: string_index,
                len,
            });
        }
        Ok(Self {
            instrument,
            string_index,
        })
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    pub fn string_index(&self) -> usize {
        self.string_index
    }

    fn string(&self) -> TuningString {
        self.instrument.strings()[self.string_index]
    }

    pub fn note(&self) -> PitchClass {
        self.string().note
    }

    pub fn frequency_hz(&self) -> f32 {
        self.string().frequency_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::frequency_from_note;
    use approx::assert_abs_diff_eq;

    #[test]
    fn tables_match_published_tunings() {
        let guitar: Vec<f32> = Instrument::Guitar.strings().iter().map(|s| s.frequency_hz).collect();
        assert_eq!(guitar, vec![82.4, 110.0, 146.8, 196.0, 246.9, 329.6]);
        let violin: Vec<f32> = Instrument::Violin.strings().iter().map(|s| s.frequency_hz).collect();
        assert_eq!(violin, vec![196.0, 293.7, 440.0, 659.3]);
    }

    #[test]
    fn table_frequencies_agree_with_note_math() {
        let guitar_octaves = [2, 2, 3, 3, 3, 4];
        for (s, octave) in Instrument::Guitar.strings().iter().zip(guitar_octaves) {
            assert_abs_diff_eq!(s.frequency_hz, frequency_from_note(s.note.name(), octave), epsilon = 0.1);
        }
        let violin_octaves = [3, 4, 4, 5];
        for (s, octave) in Instrument::Violin.strings().iter().zip(violin_octaves) {
            assert_abs_diff_eq!(s.frequency_hz, frequency_from_note(s.note.name(), octave), epsilon = 0.1);
        }
    }

    #[test]
    fn violin_a_string() {
        let target = TuningTarget::with_string(Instrument::Violin, 2).unwrap();
        assert_eq!(target.note(), PitchClass::A);
        assert_eq!(target.frequency_hz(), 440.0);
    }

    #[test]
    fn default_target_is_low_e() {
        let target = TuningTarget::default();
        assert_eq!(target.instrument(), Instrument::Guitar);
        assert_eq!(target.note(), PitchClass::E);
        assert_eq!(target.frequency_hz(), 82.4);
    }

    #[test]
    fn rejects_out_of_range_strings() {
        let err = TuningTarget::with_string(Instrument::Violin, 4).unwrap_err();
        assert!(matches!(
            err,
            TunerError::StringIndexOutOfRange { index: 4, len: 4, .. }
        ));
        assert!(TuningTarget::with_string(Instrument::Guitar, 5).is_ok());
    }

    #[test]
    fn parses_instrument_names() {
        assert_eq!("Violin".parse::<Instrument>().unwrap(), Instrument::Violin);
        assert!("cello".parse::<Instrument>().is_err());
    }
}
