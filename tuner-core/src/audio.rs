//! # Audio Capture Module
//!
//! Owns the live microphone stream and the rolling analysis window it
//! feeds. The tuner samples the window once per display frame.
//!
//! ## Features
//! - [`InputDevice`] seam so the session can run against real hardware
//!   ([`CpalInput`]) or a test double
//! - Native sample rate and sample format of the default input device,
//!   downmixed to mono
//! - Lifecycle `Idle -> Initializing -> Listening -> Idle`
//! - [`CaptureTap`] handles that can be moved to an analysis worker and go
//!   quiet as soon as the session shuts down

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::CaptureFailure;

/// Analysis window length in samples.
///
/// Long enough to hold several periods of a guitar's low E (~82 Hz) at
/// common sample rates.
pub const WINDOW_SIZE: usize = 8192;

/// Fixed-length ring of the most recent mono samples.
pub struct SampleWindow {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
        }
    }

    /// Appends samples, overwriting the oldest ones.
    pub fn push(&mut self, samples: &[f32]) {
        let capacity = self.buffer.len();
        // Only the newest `capacity` samples can survive.
        let samples = &samples[samples.len().saturating_sub(capacity)..];
        for &sample in samples {
            self.buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % capacity;
        }
    }

    /// Copies the window out in chronological order, oldest first.
    pub fn snapshot(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.buffer.len());
        out.extend_from_slice(&self.buffer[self.write_pos..]);
        out.extend_from_slice(&self.buffer[..self.write_pos]);
        out
    }
}

pub type SharedWindow = Arc<Mutex<SampleWindow>>;

/// Something that can stream microphone samples into a [`SharedWindow`].
pub trait InputDevice {
    /// Opens the device and starts pushing mono samples into `window`.
    ///
    /// Returns the sample rate the device runs at.
    fn open(&mut self, window: SharedWindow) -> Result<u32, CaptureFailure>;

    /// Stops the stream and releases the device. Must be safe to call when
    /// nothing is open.
    fn close(&mut self);
}

/// The host's default microphone via CPAL.
#[derive(Default)]
pub struct CpalInput {
    stream: Option<cpal::Stream>,
}

impl CpalInput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputDevice for CpalInput {
    fn open(&mut self, window: SharedWindow) -> Result<u32, CaptureFailure> {
        self.close();

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureFailure::NoDevice)?;
        info!(
            "Using audio input device: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let supported = device
            .default_input_config()
            .map_err(|e| match e {
                cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureFailure::NoDevice,
                other => CaptureFailure::Device(other.to_string()),
            })?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        info!(
            "Input stream: {} Hz, {} channel(s), {:?}",
            sample_rate, config.channels, sample_format
        );

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_input_stream::<f32>(&device, &config, window),
            cpal::SampleFormat::I16 => build_input_stream::<i16>(&device, &config, window),
            cpal::SampleFormat::U16 => build_input_stream::<u16>(&device, &config, window),
            cpal::SampleFormat::I32 => build_input_stream::<i32>(&device, &config, window),
            other => {
                return Err(CaptureFailure::UnsupportedFormat(format!("{other:?}")));
            }
        }?;

        stream
            .play()
            .map_err(|e| CaptureFailure::Device(e.to_string()))?;
        self.stream = Some(stream);
        Ok(sample_rate)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Error pausing input stream: {}", e);
            }
            debug!("Input stream released");
        }
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    window: SharedWindow,
) -> Result<cpal::Stream, CaptureFailure>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let mut mono = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.chunks(channels).map(|frame| {
                    frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32
                }));
                window
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(&mono);
            },
            |err| error!("An error occurred on the audio input stream: {}", err),
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => CaptureFailure::NoDevice,
            cpal::BuildStreamError::StreamConfigNotSupported => {
                CaptureFailure::UnsupportedFormat("stream config not supported".to_string())
            }
            other => CaptureFailure::Device(other.to_string()),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Initializing,
    Listening,
}

/// Read-only handle on a listening session's window.
///
/// Safe to move to another thread. Once the session that produced it shuts
/// down, [`CaptureTap::sample_once`] returns an empty buffer.
#[derive(Clone)]
pub struct CaptureTap {
    window: SharedWindow,
    listening: Arc<AtomicBool>,
    sample_rate: u32,
}

impl CaptureTap {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_once(&self) -> Vec<f32> {
        if !self.listening.load(Ordering::Acquire) {
            return Vec::new();
        }
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }
}

/// Exclusive owner of the microphone and the analysis window.
pub struct CaptureSession<D: InputDevice = CpalInput> {
    device: D,
    window_size: usize,
    state: CaptureState,
    window: Option<SharedWindow>,
    sample_rate: Option<u32>,
    listening: Arc<AtomicBool>,
}

impl<D: InputDevice> CaptureSession<D> {
    pub fn new(device: D, window_size: usize) -> Self {
        Self {
            device,
            window_size,
            state: CaptureState::Idle,
            window: None,
            sample_rate: None,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Opens the microphone and starts filling the analysis window.
    ///
    /// Already listening sessions return their current sample rate. On
    /// failure the session is back in `Idle` and nothing is retried.
    pub fn initialize(&mut self) -> Result<u32, CaptureFailure> {
        if let (CaptureState::Listening, Some(rate)) = (self.state, self.sample_rate) {
            return Ok(rate);
        }

        self.state = CaptureState::Initializing;
        let window = Arc::new(Mutex::new(SampleWindow::new(self.window_size)));

        match self.device.open(Arc::clone(&window)) {
            Ok(sample_rate) => {
                // A fresh flag per session so taps from earlier sessions stay dead.
                self.listening = Arc::new(AtomicBool::new(true));
                self.window = Some(window);
                self.sample_rate = Some(sample_rate);
                self.state = CaptureState::Listening;
                info!("Capture listening at {} Hz", sample_rate);
                Ok(sample_rate)
            }
            Err(failure) => {
                warn!("Capture unavailable: {}", failure);
                self.device.close();
                self.state = CaptureState::Idle;
                Err(failure)
            }
        }
    }

    /// The most recent window of samples, oldest first.
    ///
    /// Empty unless the session is listening.
    pub fn sample_once(&self) -> Vec<f32> {
        match (&self.window, self.state) {
            (Some(window), CaptureState::Listening) => window
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot(),
            _ => Vec::new(),
        }
    }

    pub fn tap(&self) -> Option<CaptureTap> {
        match (&self.window, self.sample_rate, self.state) {
            (Some(window), Some(sample_rate), CaptureState::Listening) => Some(CaptureTap {
                window: Arc::clone(window),
                listening: Arc::clone(&self.listening),
                sample_rate,
            }),
            _ => None,
        }
    }

    /// Releases the device and the window. Safe from any state, any number
    /// of times.
    pub fn shutdown(&mut self) {
        self.listening.store(false, Ordering::Release);
        self.device.close();
        if self.state != CaptureState::Idle {
            info!("Capture shut down");
        }
        self.window = None;
        self.sample_rate = None;
        self.state = CaptureState::Idle;
    }
}

impl<D: InputDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fills the window with a ramp on open, or fails.
    struct RampInput {
        fail_with: Option<CaptureFailure>,
        opened: usize,
        closed: usize,
    }

    impl RampInput {
        fn new() -> Self {
            Self { fail_with: None, opened: 0, closed: 0 }
        }
    }

    impl InputDevice for RampInput {
        fn open(&mut self, window: SharedWindow) -> Result<u32, CaptureFailure> {
            if let Some(failure) = self.fail_with.clone() {
                return Err(failure);
            }
            self.opened += 1;
            let ramp: Vec<f32> = (0..16).map(|i| i as f32).collect();
            window.lock().unwrap().push(&ramp);
            Ok(48_000)
        }

        fn close(&mut self) {
            self.closed += 1;
        }
    }

    #[test]
    fn window_keeps_newest_samples_in_order() {
        let mut window = SampleWindow::new(4);
        window.push(&[1.0, 2.0, 3.0]);
        assert_eq!(window.snapshot(), vec![0.0, 1.0, 2.0, 3.0]);
        window.push(&[4.0, 5.0]);
        assert_eq!(window.snapshot(), vec![2.0, 3.0, 4.0, 5.0]);
        window.push(&[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(window.snapshot(), vec![8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn sampling_while_idle_is_empty() {
        let session = CaptureSession::new(RampInput::new(), 8);
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(session.sample_once().is_empty());
        assert!(session.tap().is_none());
    }

    #[test]
    fn initialize_then_sample() {
        let mut session = CaptureSession::new(RampInput::new(), 8);
        assert_eq!(session.initialize(), Ok(48_000));
        assert_eq!(session.state(), CaptureState::Listening);
        assert_eq!(session.sample_once(), vec![8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);

        // A second initialize does not reopen the device.
        assert_eq!(session.initialize(), Ok(48_000));
        assert_eq!(session.device().opened, 1);
    }

    #[test]
    fn failure_returns_to_idle() {
        let mut input = RampInput::new();
        input.fail_with = Some(CaptureFailure::PermissionDenied);
        let mut session = CaptureSession::new(input, 8);
        assert_eq!(session.initialize(), Err(CaptureFailure::PermissionDenied));
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(session.sample_once().is_empty());
    }

    #[test]
    fn shutdown_is_idempotent_and_silences_taps() {
        let mut session = CaptureSession::new(RampInput::new(), 8);
        session.initialize().unwrap();
        let tap = session.tap().unwrap();
        assert_eq!(tap.sample_rate(), 48_000);
        assert_eq!(tap.sample_once().len(), 8);

        session.shutdown();
        session.shutdown();
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(tap.sample_once().is_empty());
        assert!(session.sample_once().is_empty());
    }

    #[test]
    fn old_taps_stay_dead_after_restart() {
        let mut session = CaptureSession::new(RampInput::new(), 8);
        session.initialize().unwrap();
        let old_tap = session.tap().unwrap();
        session.shutdown();
        session.initialize().unwrap();
        assert!(old_tap.sample_once().is_empty());
        assert_eq!(session.tap().unwrap().sample_once().len(), 8);
    }
}
