//! Tone generator and application tests against fake devices.

mod common;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use common::{fast_config, sine, FakeInput, FakeOutput, SAMPLE_RATE};
use tuner_core::synth::{SynthState, ToneSession};
use tuner_core::{
    PitchClass, PitchDetector, PitchEstimator, Settings, ToneConfig, ToneGenerator, TunerApp, View,
};

fn session() -> ToneSession<FakeOutput> {
    let mut session = ToneSession::new(FakeOutput::default(), 1.0, 5.0);
    session.initialize().unwrap();
    session
}

#[test]
fn retargeting_never_layers_tones() {
    let mut session = session();
    session.play(440.0);
    assert_eq!(session.active_oscillators(), 1);
    session.play(880.0);
    assert_eq!(session.active_oscillators(), 1);
    assert_eq!(session.frequency_hz(), Some(880.0));
}

#[test]
fn volume_follows_the_square_curve() {
    let session = session();
    session.set_volume(1.0);
    assert_relative_eq!(session.gain(), 0.3);
    session.set_volume(0.5);
    assert_relative_eq!(session.gain(), 0.075);
    session.set_volume(0.0);
    assert_eq!(session.gain(), 0.0);
}

#[test]
fn stop_twice_leaves_session_idle() {
    let mut session = session();
    session.play(440.0);
    session.stop();
    assert_eq!(session.state(), SynthState::Idle);
    session.stop();
    assert_eq!(session.state(), SynthState::Idle);
}

#[test]
fn shutdown_releases_the_output() {
    let mut session = session();
    session.play(440.0);
    session.shutdown();
    assert!(session.device().bus.is_none());
    assert!(session.device().closes >= 1);
    session.shutdown();
}

#[test]
fn rendered_tone_is_detected_at_its_pitch() {
    let mut generator = ToneGenerator::new(FakeOutput::default(), &ToneConfig::default());
    generator.set_note(PitchClass::G);
    generator.set_octave(3);
    generator.play().unwrap();

    let bus = generator.session().device().bus.clone().unwrap();
    let sample_rate = SAMPLE_RATE as f32;
    // Skip the attack.
    let mut warmup = vec![0.0; 2048];
    bus.render(&mut warmup, 1, sample_rate);
    let mut window = vec![0.0; 8192];
    bus.render(&mut window, 1, sample_rate);

    let reading = PitchDetector::new(8192).analyze(&window, SAMPLE_RATE);
    assert!(reading.clarity > 0.9, "clarity {}", reading.clarity);
    assert_abs_diff_eq!(reading.frequency_hz, 196.0, epsilon = 1.0);
}

#[test]
fn switching_views_stops_both_sessions() {
    let settings = Settings {
        tuner: fast_config(),
        ..Settings::default()
    };
    let input = FakeInput::playing(sine(440.0, 0.5, 8192));
    let mut app = TunerApp::new(input, FakeOutput::default(), &settings).unwrap();
    assert_eq!(app.view(), View::Tuner);

    app.tuner().start().unwrap();
    app.switch_view(View::ToneGenerator);
    assert!(!app.tuner().is_active());
    assert_eq!(app.view(), View::ToneGenerator);

    app.tone().play().unwrap();
    app.switch_view(View::Tuner);
    assert!(!app.tone().is_playing());
    assert_eq!(app.tone().session().active_oscillators(), 0);

    app.shutdown();
    assert!(app.tuner().capture().sample_once().is_empty());
}

#[test]
fn default_state() {
    let mut app = TunerApp::new(
        FakeInput::playing(Vec::new()),
        FakeOutput::default(),
        &Settings::default(),
    )
    .unwrap();

    let tuner = app.tuner().snapshot();
    assert!(!tuner.is_active);
    assert_eq!(tuner.target.note(), PitchClass::E);
    assert_eq!(tuner.target.frequency_hz(), 82.4);

    let tone = app.tone().snapshot();
    assert_eq!(tone.selected_note, PitchClass::A);
    assert_eq!(tone.selected_octave, 4);
    assert!(!tone.is_playing);
    assert_eq!(tone.volume, 1.0);
}
