//! Tuner CLI
//!
//! A headless front end for the instrument tuner and tone generator.
//!
//! # Usage
//!
//! ```bash
//! # Tune the A string of a violin for 30 seconds
//! tuner listen --instrument violin --string 2 --seconds 30
//!
//! # Play E2 at half volume
//! tuner tone --note E --octave 2 --volume 0.5
//!
//! # Show the built-in tunings
//! tuner strings
//! ```

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tuner_core::tuning::Accuracy;
use tuner_core::{Instrument, PitchClass, Settings, ToneGenerator, Tuner, TunerSnapshot};

#[derive(Parser)]
#[command(name = "tuner")]
#[command(about = "Instrument tuner and tone generator")]
#[command(version)]
struct Cli {
    /// JSON settings file (read-only)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen to the microphone and report the detected note
    Listen {
        /// Instrument whose tuning to target (guitar, violin)
        #[arg(short, long, default_value = "guitar")]
        instrument: Instrument,

        /// Index of the target string, lowest first
        #[arg(short, long, default_value = "0")]
        string: usize,

        /// Clarity a reading must exceed to count as a pitch
        #[arg(long)]
        threshold: Option<f32>,

        /// How long to listen
        #[arg(long, default_value = "30")]
        seconds: u64,

        /// Print every snapshot as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Play a sine tone
    Tone {
        /// Note symbol (C, C#, D, ... B)
        #[arg(short, long)]
        note: Option<PitchClass>,

        /// Octave, 2 to 6
        #[arg(short, long)]
        octave: Option<i32>,

        /// Volume, 0 to 1
        #[arg(short, long)]
        volume: Option<f32>,

        /// How long to play
        #[arg(long, default_value = "3")]
        seconds: u64,
    },

    /// List the built-in instrument tunings
    Strings,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Listen {
            instrument,
            string,
            threshold,
            seconds,
            json,
        } => {
            let mut config = settings.tuner;
            if let Some(threshold) = threshold {
                config.clarity_threshold = threshold;
                config.instrument_thresholds.clear();
            }
            listen(config, instrument, string, Duration::from_secs(seconds), json)
        }
        Commands::Tone {
            note,
            octave,
            volume,
            seconds,
        } => {
            let mut config = settings.tone;
            config.note = note.unwrap_or(config.note);
            config.octave = octave.unwrap_or(config.octave);
            config.initial_volume = volume.unwrap_or(config.initial_volume);
            config.validate()?;
            tone(&config, Duration::from_secs(seconds))
        }
        Commands::Strings => {
            strings();
            Ok(())
        }
    }
}

fn listen(
    config: tuner_core::TunerConfig,
    instrument: Instrument,
    string: usize,
    duration: Duration,
    json: bool,
) -> anyhow::Result<()> {
    let mut tuner = Tuner::with_default_input(config)?;
    tuner.select_instrument(instrument);
    let target = tuner.select_target_note_index(string)?;
    info!(
        "Target: {} string {} ({} {:.1} Hz)",
        instrument.label(),
        string,
        target.note(),
        target.frequency_hz()
    );

    let updates = tuner.subscribe();
    tuner.start().context("Failed to start listening")?;

    let deadline = Instant::now() + duration;
    let mut last_line = String::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match updates.recv_timeout(remaining) {
            Ok(snapshot) => {
                if json {
                    println!("{}", serde_json::to_string(&snapshot)?);
                    continue;
                }
                let line = render(&snapshot);
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tuner.shutdown();
    Ok(())
}

/// One status line per distinct reading.
fn render(snapshot: &TunerSnapshot) -> String {
    if !snapshot.note.is_detected() {
        return format!("--     {}", snapshot.status().label());
    }
    let band = match snapshot.accuracy() {
        Accuracy::Good => "good",
        Accuracy::Close => "close",
        Accuracy::Off => "off",
    };
    let target = snapshot
        .target_cents_off
        .map(|c| format!("  target {c:+.1}c"))
        .unwrap_or_default();
    format!(
        "{:<3}  {:>8.2} Hz  {:+3}c [{band}]  {}{target}",
        snapshot.note_name(),
        snapshot.frequency_hz,
        snapshot.cents_off(),
        snapshot.status().label(),
    )
}

fn tone(config: &tuner_core::ToneConfig, duration: Duration) -> anyhow::Result<()> {
    let mut generator = ToneGenerator::with_default_output(config);
    generator.play().context("Failed to start the tone")?;

    let snapshot = generator.snapshot();
    println!(
        "{}{}  {:.2} Hz  volume {:.2}",
        snapshot.selected_note, snapshot.selected_octave, snapshot.frequency_hz, snapshot.volume
    );

    thread::sleep(duration);
    generator.shutdown();
    Ok(())
}

fn strings() {
    for instrument in Instrument::ALL {
        println!("{}", instrument.label());
        for (index, string) in instrument.strings().iter().enumerate() {
            println!("  {index}  {:<2}  {:>6.1} Hz", string.note.name(), string.frequency_hz);
        }
    }
}
