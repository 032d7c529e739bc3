//! # Tone Synthesis Module
//!
//! A single sine oscillator behind a master gain stage, rendered by the
//! output device's callback.
//!
//! The control side ([`ToneSession`]) and the audio callback share a
//! [`ToneBus`]. Swapping the oscillator happens under the bus lock, so a
//! retarget replaces the old tone in one step and two tones never sound at
//! once.
//!
//! Only the start of a tone is shaped: each new oscillator ramps in over
//! the attack time. `stop()` and retargets cut the outgoing oscillator at
//! the next rendered sample with no release tail. Volume changes are
//! slewed per sample.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Gain at full UI volume.
pub const MAX_GAIN: f32 = 0.3;

/// UI volume limited to [0, 1]. Non-finite input maps to 0.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Perceptual volume curve: `volume^2 * 0.3`, with `volume` passed through
/// [`clamp_volume`] first.
pub fn gain_for_volume(volume: f32) -> f32 {
    clamp_volume(volume).powi(2) * MAX_GAIN
}

/// Per-sample step of the applied gain toward its target, so volume
/// changes do not click.
const GAIN_SLEW_PER_SAMPLE: f32 = 0.001;

/// Sine oscillator with a linear attack ramp.
#[derive(Debug, Clone)]
pub struct Oscillator {
    frequency_hz: f32,
    phase: f32,
    envelope: f32,
    attack_samples: f32,
}

impl Oscillator {
    /// `attack_samples` of 0 starts at full level.
    pub fn new(frequency_hz: f32, attack_samples: f32) -> Self {
        Self {
            frequency_hz,
            phase: 0.0,
            envelope: if attack_samples > 0.0 { 0.0 } else { 1.0 },
            attack_samples,
        }
    }

    pub fn frequency_hz(&self) -> f32 {
        self.frequency_hz
    }

    pub fn next_sample(&mut self, sample_rate: f32) -> f32 {
        let value = (TAU * self.phase).sin() * self.envelope;

        self.phase += self.frequency_hz / sample_rate;
        self.phase -= self.phase.floor();

        if self.envelope < 1.0 {
            self.envelope = (self.envelope + 1.0 / self.attack_samples).min(1.0);
        }
        value
    }
}

struct Voice {
    oscillator: Option<Oscillator>,
    applied_gain: f32,
}

/// State shared between the control thread and the output callback.
pub struct ToneBus {
    voice: Mutex<Voice>,
    gain_bits: AtomicU32,
}

impl ToneBus {
    pub fn new(gain: f32) -> Self {
        Self {
            voice: Mutex::new(Voice {
                oscillator: None,
                applied_gain: gain,
            }),
            gain_bits: AtomicU32::new(gain.to_bits()),
        }
    }

    fn voice(&self) -> std::sync::MutexGuard<'_, Voice> {
        self.voice.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Target master gain.
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Acquire))
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain_bits.store(gain.to_bits(), Ordering::Release);
    }

    /// Replaces whatever is sounding with `oscillator`. Returns the tone it
    /// replaced.
    pub fn replace(&self, oscillator: Option<Oscillator>) -> Option<Oscillator> {
        std::mem::replace(&mut self.voice().oscillator, oscillator)
    }

    /// Number of oscillators currently sounding (0 or 1).
    pub fn active_oscillators(&self) -> usize {
        usize::from(self.voice().oscillator.is_some())
    }

    pub fn frequency_hz(&self) -> Option<f32> {
        self.voice().oscillator.as_ref().map(Oscillator::frequency_hz)
    }

    /// Fills an interleaved buffer with `channels` copies of each sample.
    pub fn render(&self, out: &mut [f32], channels: usize, sample_rate: f32) {
        let target = self.gain();
        let mut voice = self.voice();
        let Voice {
            oscillator,
            applied_gain,
        } = &mut *voice;

        for frame in out.chunks_mut(channels.max(1)) {
            let delta = (target - *applied_gain).clamp(-GAIN_SLEW_PER_SAMPLE, GAIN_SLEW_PER_SAMPLE);
            *applied_gain += delta;

            let value = match oscillator {
                Some(osc) => osc.next_sample(sample_rate) * *applied_gain,
                None => 0.0,
            };
            frame.fill(value);
        }
    }
}

/// Something that can play a [`ToneBus`].
pub trait OutputDevice {
    /// Opens the output and starts rendering `bus`. Returns the sample rate.
    fn open(&mut self, bus: Arc<ToneBus>) -> Result<u32, String>;

    /// Stops rendering and releases the device. Must be safe to call when
    /// nothing is open.
    fn close(&mut self);
}

/// The host's default speakers via CPAL.
#[derive(Default)]
pub struct CpalOutput {
    stream: Option<cpal::Stream>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputDevice for CpalOutput {
    fn open(&mut self, bus: Arc<ToneBus>) -> Result<u32, String> {
        self.close();

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| "No output device available".to_string())?;
        info!(
            "Default output device found: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported = device
            .default_output_config()
            .map_err(|e| format!("Failed to get default output config: {e}"))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        info!("Audio stream configuration: {:?}", config);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_output_stream::<f32>(&device, &config, bus),
            cpal::SampleFormat::I16 => build_output_stream::<i16>(&device, &config, bus),
            cpal::SampleFormat::U16 => build_output_stream::<u16>(&device, &config, bus),
            cpal::SampleFormat::I32 => build_output_stream::<i32>(&device, &config, bus),
            other => return Err(format!("Unsupported output sample format {other:?}")),
        }?;

        stream
            .play()
            .map_err(|e| format!("Failed to play audio stream: {e}"))?;
        self.stream = Some(stream);
        Ok(sample_rate)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Error pausing output stream: {}", e);
            }
            debug!("Output stream released");
        }
    }
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    bus: Arc<ToneBus>,
) -> Result<cpal::Stream, String>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels.max(1));
    let sample_rate = config.sample_rate.0 as f32;
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                bus.render(&mut scratch, channels, sample_rate);
                for (out, &value) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(value);
                }
            },
            |err| error!("An error occurred on the audio stream: {}", err),
            None,
        )
        .map_err(|e| format!("Failed to build audio stream: {e}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthState {
    Idle,
    Playing,
}

/// Exclusive owner of the oscillator and the output device.
pub struct ToneSession<D: OutputDevice = CpalOutput> {
    device: D,
    bus: Arc<ToneBus>,
    state: SynthState,
    sample_rate: Option<u32>,
    attack_ms: f32,
}

impl<D: OutputDevice> ToneSession<D> {
    pub fn new(device: D, volume: f32, attack_ms: f32) -> Self {
        Self {
            device,
            bus: Arc::new(ToneBus::new(gain_for_volume(volume))),
            state: SynthState::Idle,
            sample_rate: None,
            attack_ms: if attack_ms.is_finite() { attack_ms.max(0.0) } else { 0.0 },
        }
    }

    pub fn state(&self) -> SynthState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.sample_rate.is_some()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn bus(&self) -> &Arc<ToneBus> {
        &self.bus
    }

    /// Opens the output pipeline. No-op once ready.
    pub fn initialize(&mut self) -> Result<u32, String> {
        if let Some(rate) = self.sample_rate {
            return Ok(rate);
        }
        match self.device.open(Arc::clone(&self.bus)) {
            Ok(rate) => {
                info!("Tone output ready at {} Hz", rate);
                self.sample_rate = Some(rate);
                Ok(rate)
            }
            Err(e) => {
                warn!("Audio output unavailable: {}", e);
                self.device.close();
                Err(e)
            }
        }
    }

    /// Starts a sine at `frequency_hz`, replacing any tone already playing.
    ///
    /// Ignored until [`ToneSession::initialize`] has succeeded.
    pub fn play(&mut self, frequency_hz: f32) {
        let Some(rate) = self.sample_rate else {
            warn!("play({frequency_hz}) before the output is initialized, ignoring");
            return;
        };
        let attack_samples = self.attack_ms * rate as f32 / 1000.0;
        let previous = self.bus.replace(Some(Oscillator::new(frequency_hz, attack_samples)));
        match previous {
            Some(old) => debug!("Retargeted tone {} Hz -> {} Hz", old.frequency_hz(), frequency_hz),
            None => debug!("Tone started at {} Hz", frequency_hz),
        }
        self.state = SynthState::Playing;
    }

    /// Silences and drops the oscillator. Safe when already idle.
    pub fn stop(&mut self) {
        if self.bus.replace(None).is_some() {
            debug!("Tone stopped");
        }
        self.state = SynthState::Idle;
    }

    pub fn set_volume(&self, volume: f32) {
        self.bus.set_gain(gain_for_volume(volume));
    }

    pub fn gain(&self) -> f32 {
        self.bus.gain()
    }

    pub fn active_oscillators(&self) -> usize {
        self.bus.active_oscillators()
    }

    pub fn frequency_hz(&self) -> Option<f32> {
        self.bus.frequency_hz()
    }

    /// Stops the tone and releases the output device.
    pub fn shutdown(&mut self) {
        self.stop();
        self.device.close();
        if self.sample_rate.take().is_some() {
            info!("Tone output shut down");
        }
    }
}

impl<D: OutputDevice> Drop for ToneSession<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
