//! Detect-loop tests against a fake microphone.

mod common;

use std::thread;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use common::{fast_config, sine, wait_for, FakeInput};
use tuner_core::audio::CaptureState;
use tuner_core::tuning::TuningStatus;
use tuner_core::{
    CaptureFailure, Instrument, PitchClass, PitchEstimator, PitchReading, Tuner, TunerError,
};

const WINDOW: usize = 8192;

#[test]
fn detects_concert_a() {
    let mut tuner = Tuner::new(FakeInput::playing(sine(440.0, 0.5, WINDOW)), fast_config()).unwrap();
    let rx = tuner.subscribe();
    tuner.start().unwrap();

    let snapshot = wait_for(&rx, Duration::from_secs(5), |s| s.note.is_detected())
        .expect("no pitch published");
    assert_eq!(snapshot.note_name(), "A");
    assert_eq!(snapshot.note.note.unwrap().octave, 4);
    assert!(snapshot.cents_off().abs() <= 2, "cents {}", snapshot.cents_off());
    assert_abs_diff_eq!(snapshot.frequency_hz, 440.0, epsilon = 1.0);
    assert_eq!(snapshot.status(), TuningStatus::InTune);
    assert!(snapshot.is_active);

    tuner.shutdown();
}

#[test]
fn target_offset_against_selected_string() {
    let mut tuner = Tuner::new(FakeInput::playing(sine(440.0, 0.5, WINDOW)), fast_config()).unwrap();
    tuner.select_instrument(Instrument::Violin);
    tuner.select_target_note_index(2).unwrap();
    let rx = tuner.subscribe();
    tuner.start().unwrap();

    let snapshot = wait_for(&rx, Duration::from_secs(5), |s| s.target_cents_off.is_some()).unwrap();
    assert_abs_diff_eq!(snapshot.target_cents_off.unwrap(), 0.0, epsilon = 5.0);
}

#[test]
fn nothing_is_published_after_stop() {
    let mut tuner = Tuner::new(FakeInput::playing(sine(196.0, 0.5, WINDOW)), fast_config()).unwrap();
    let rx = tuner.subscribe();
    tuner.start().unwrap();
    wait_for(&rx, Duration::from_secs(5), |s| s.note.is_detected()).unwrap();

    tuner.stop();
    let drained: Vec<_> = rx.try_iter().collect();
    assert!(!drained.last().unwrap().is_active);

    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_recv().is_err());
    assert_eq!(tuner.snapshot().status(), TuningStatus::Ready);
}

#[test]
fn stop_keeps_the_microphone_until_shutdown() {
    let mut tuner = Tuner::new(FakeInput::playing(sine(440.0, 0.5, WINDOW)), fast_config()).unwrap();
    tuner.start().unwrap();
    tuner.stop();
    assert!(!tuner.is_active());
    assert_eq!(tuner.capture_state(), CaptureState::Listening);
    assert_eq!(tuner.capture().device().closes, 0);

    tuner.start().unwrap();
    assert_eq!(tuner.capture().device().opens, 1);

    tuner.shutdown();
    assert_eq!(tuner.capture_state(), CaptureState::Idle);
    assert!(tuner.capture().device().closes >= 1);
    assert!(tuner.capture().sample_once().is_empty());
}

#[test]
fn stop_twice_is_harmless() {
    let mut tuner = Tuner::new(FakeInput::playing(sine(440.0, 0.5, WINDOW)), fast_config()).unwrap();
    tuner.start().unwrap();
    tuner.stop();
    tuner.stop();
    assert!(!tuner.is_active());
    assert!(!tuner.snapshot().is_active);
}

#[test]
fn capture_failure_is_cleared_by_next_successful_start() {
    let input = FakeInput::playing(sine(440.0, 0.5, WINDOW)).denying(1);
    let mut tuner = Tuner::new(input, fast_config()).unwrap();

    let err = tuner.start().unwrap_err();
    assert!(matches!(
        err,
        TunerError::CaptureUnavailable(CaptureFailure::PermissionDenied)
    ));
    assert_eq!(tuner.snapshot().error, Some(CaptureFailure::PermissionDenied));
    assert_eq!(tuner.capture_state(), CaptureState::Idle);

    tuner.start().unwrap();
    let snapshot = tuner.snapshot();
    assert_eq!(snapshot.error, None);
    assert!(snapshot.is_active);
    assert_eq!(tuner.capture_state(), CaptureState::Listening);
}

#[test]
fn violin_a_string_target() {
    let tuner = Tuner::new(FakeInput::playing(Vec::new()), fast_config()).unwrap();
    tuner.select_instrument(Instrument::Violin);
    let target = tuner.select_target_note_index(2).unwrap();
    assert_eq!(target.note(), PitchClass::A);
    assert_eq!(target.frequency_hz(), 440.0);
    assert_eq!(tuner.snapshot().target, target);
}

/// Reports a fixed reading for any non-empty window.
struct FixedReading(PitchReading);

impl PitchEstimator for FixedReading {
    fn analyze(&mut self, _samples: &[f32], _sample_rate: u32) -> PitchReading {
        self.0
    }
}

#[test]
fn thresholds_apply_per_instrument() {
    let mut config = fast_config();
    config.instrument_thresholds.insert(Instrument::Violin, 0.8);
    let estimator = FixedReading(PitchReading {
        frequency_hz: 293.7,
        clarity: 0.85,
    });
    let mut tuner = Tuner::with_estimator(
        FakeInput::playing(sine(293.7, 0.5, WINDOW)),
        config,
        Box::new(estimator),
    )
    .unwrap();
    let rx = tuner.subscribe();
    tuner.start().unwrap();

    // Guitar keeps the 0.9 default, so the reading is discarded.
    let guitar = wait_for(&rx, Duration::from_secs(5), |s| s.clarity > 0.0).unwrap();
    assert_eq!(guitar.frequency_hz, 0.0);

    tuner.select_instrument(Instrument::Violin);
    let violin = wait_for(&rx, Duration::from_secs(5), |s| s.note.is_detected()).unwrap();
    assert_eq!(violin.note_name(), "D");
    assert_eq!(violin.target.instrument(), Instrument::Violin);
}
