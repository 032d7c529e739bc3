#![allow(dead_code)]
//! Fake audio devices and helpers for tuner-core integration tests.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tuner_core::audio::{InputDevice, SharedWindow};
use tuner_core::synth::{OutputDevice, ToneBus};
use tuner_core::{CaptureFailure, TunerConfig};

pub const SAMPLE_RATE: u32 = 44_100;

pub fn sine(frequency: f32, amplitude: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (TAU * frequency * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

/// Microphone that fills the window with a fixed signal on open.
pub struct FakeInput {
    samples: Vec<f32>,
    fail_first: usize,
    pub opens: usize,
    pub closes: usize,
}

impl FakeInput {
    pub fn playing(samples: Vec<f32>) -> Self {
        Self {
            samples,
            fail_first: 0,
            opens: 0,
            closes: 0,
        }
    }

    /// Denies permission for the first `n` opens.
    pub fn denying(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }
}

impl InputDevice for FakeInput {
    fn open(&mut self, window: SharedWindow) -> Result<u32, CaptureFailure> {
        if self.fail_first > 0 {
            self.fail_first -= 1;
            return Err(CaptureFailure::PermissionDenied);
        }
        self.opens += 1;
        window
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(&self.samples);
        Ok(SAMPLE_RATE)
    }

    fn close(&mut self) {
        self.closes += 1;
    }
}

/// Speakers that accept the bus and render nothing on their own.
#[derive(Default)]
pub struct FakeOutput {
    pub bus: Option<Arc<ToneBus>>,
    pub closes: usize,
}

impl OutputDevice for FakeOutput {
    fn open(&mut self, bus: Arc<ToneBus>) -> Result<u32, String> {
        self.bus = Some(bus);
        Ok(SAMPLE_RATE)
    }

    fn close(&mut self) {
        self.bus = None;
        self.closes += 1;
    }
}

/// Frame pacing fast enough to keep the tests short.
pub fn fast_config() -> TunerConfig {
    TunerConfig {
        frame_interval_ms: 2,
        ..TunerConfig::default()
    }
}

/// Receives until `pred` matches or `timeout` passes.
pub fn wait_for<T, F>(rx: &Receiver<T>, timeout: Duration, mut pred: F) -> Option<T>
where
    F: FnMut(&T) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(value) if pred(&value) => return Some(value),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}
