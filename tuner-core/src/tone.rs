//! # Tone Generator
//!
//! The controller behind the tone generator view: a selected note and
//! octave, a volume, and a [`ToneSession`] that plays the derived
//! frequency. Every change is published as a [`ToneSnapshot`].

use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ToneConfig;
use crate::error::{Result, TunerError};
use crate::observe::StatePublisher;
use crate::synth::{clamp_volume, CpalOutput, OutputDevice, SynthState, ToneSession};
use crate::tuning::{Note, PitchClass};

/// Lowest octave offered by the generator.
pub const MIN_OCTAVE: i32 = 2;
/// Highest octave offered by the generator.
pub const MAX_OCTAVE: i32 = 6;

/// Note and octave to synthesize. The frequency is always derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToneTarget {
    note: PitchClass,
    octave: i32,
}

impl ToneTarget {
    /// Octaves outside [`MIN_OCTAVE`, `MAX_OCTAVE`] are clamped.
    pub fn new(note: PitchClass, octave: i32) -> Self {
        Self {
            note,
            octave: octave.clamp(MIN_OCTAVE, MAX_OCTAVE),
        }
    }

    pub fn note(&self) -> PitchClass {
        self.note
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    pub fn frequency_hz(&self) -> f32 {
        self.note.frequency(self.octave)
    }
}

impl Default for ToneTarget {
    fn default() -> Self {
        Self::new(PitchClass::A, 4)
    }
}

impl From<ToneTarget> for Note {
    fn from(target: ToneTarget) -> Self {
        Note {
            pitch_class: target.note,
            octave: target.octave,
        }
    }
}

/// What the tone generator view renders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToneSnapshot {
    pub selected_note: PitchClass,
    pub selected_octave: i32,
    pub volume: f32,
    pub is_playing: bool,
    pub frequency_hz: f32,
}

impl ToneSnapshot {
    fn new(target: ToneTarget, volume: f32, is_playing: bool) -> Self {
        Self {
            selected_note: target.note(),
            selected_octave: target.octave(),
            volume,
            is_playing,
            frequency_hz: target.frequency_hz(),
        }
    }
}

pub struct ToneGenerator<D: OutputDevice = CpalOutput> {
    session: ToneSession<D>,
    target: ToneTarget,
    volume: f32,
    publisher: Arc<StatePublisher<ToneSnapshot>>,
}

impl ToneGenerator<CpalOutput> {
    pub fn with_default_output(config: &ToneConfig) -> Self {
        Self::new(CpalOutput::new(), config)
    }
}

impl<D: OutputDevice> ToneGenerator<D> {
    pub fn new(device: D, config: &ToneConfig) -> Self {
        let target = ToneTarget::new(config.note, config.octave);
        let volume = clamp_volume(config.initial_volume);
        Self {
            session: ToneSession::new(device, volume, config.attack_ms),
            target,
            volume,
            publisher: Arc::new(StatePublisher::new(ToneSnapshot::new(target, volume, false))),
        }
    }

    pub fn target(&self) -> ToneTarget {
        self.target
    }

    pub fn is_playing(&self) -> bool {
        self.session.state() == SynthState::Playing
    }

    pub fn session(&self) -> &ToneSession<D> {
        &self.session
    }

    pub fn snapshot(&self) -> ToneSnapshot {
        self.publisher.snapshot()
    }

    pub fn subscribe(&self) -> Receiver<ToneSnapshot> {
        self.publisher.subscribe()
    }

    fn publish(&self) {
        let snapshot = ToneSnapshot::new(self.target, self.volume, self.is_playing());
        self.publisher.update(|s| *s = snapshot);
    }

    /// Plays the selected note, opening the output on first use.
    pub fn play(&mut self) -> Result<()> {
        self.session
            .initialize()
            .map_err(TunerError::OutputUnavailable)?;
        let frequency = self.target.frequency_hz();
        info!("Playing {} ({:.2} Hz)", Note::from(self.target), frequency);
        self.session.play(frequency);
        self.publish();
        Ok(())
    }

    pub fn stop(&mut self) {
        let was_playing = self.is_playing();
        self.session.stop();
        if was_playing {
            info!("Tone stopped");
            self.publish();
        }
    }

    pub fn toggle(&mut self) -> Result<()> {
        if self.is_playing() {
            self.stop();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Selects a note. While playing, the new pitch sounds immediately.
    pub fn set_note(&mut self, note: PitchClass) {
        self.retarget(ToneTarget::new(note, self.target.octave()));
    }

    /// Selects an octave, clamped to the supported range. While playing,
    /// the new pitch sounds immediately.
    pub fn set_octave(&mut self, octave: i32) {
        self.retarget(ToneTarget::new(self.target.note(), octave));
    }

    fn retarget(&mut self, target: ToneTarget) {
        self.target = target;
        if self.is_playing() {
            debug!("Retargeting tone to {}", Note::from(target));
            self.session.play(target.frequency_hz());
        }
        self.publish();
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
        self.session.set_volume(self.volume);
        self.publish();
    }

    /// Stops the tone and releases the output device.
    pub fn shutdown(&mut self) {
        self.stop();
        self.session.shutdown();
    }
}
