//! One tuner and one tone generator for the lifetime of the application,
//! plus the view that is currently shown.

use tracing::info;

use crate::audio::{CpalInput, InputDevice};
use crate::config::Settings;
use crate::error::Result;
use crate::synth::{CpalOutput, OutputDevice};
use crate::tone::ToneGenerator;
use crate::tuner::Tuner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Tuner,
    ToneGenerator,
}

pub struct TunerApp<I: InputDevice = CpalInput, O: OutputDevice = CpalOutput> {
    tuner: Tuner<I>,
    tone: ToneGenerator<O>,
    view: View,
}

impl TunerApp<CpalInput, CpalOutput> {
    pub fn with_default_devices(settings: &Settings) -> Result<Self> {
        Self::new(CpalInput::new(), CpalOutput::new(), settings)
    }
}

impl<I: InputDevice, O: OutputDevice> TunerApp<I, O> {
    pub fn new(input: I, output: O, settings: &Settings) -> Result<Self> {
        Ok(Self {
            tuner: Tuner::new(input, settings.tuner.clone())?,
            tone: ToneGenerator::new(output, &settings.tone),
            view: View::default(),
        })
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn tuner(&mut self) -> &mut Tuner<I> {
        &mut self.tuner
    }

    pub fn tone(&mut self) -> &mut ToneGenerator<O> {
        &mut self.tone
    }

    /// Stops both sessions, then makes `view` current.
    pub fn switch_view(&mut self, view: View) {
        self.tuner.stop();
        self.tone.stop();
        if self.view != view {
            info!("Switching view {:?} -> {:?}", self.view, view);
        }
        self.view = view;
    }

    /// Releases the microphone and the speakers.
    pub fn shutdown(&mut self) {
        self.tuner.shutdown();
        self.tone.shutdown();
    }
}

impl<I: InputDevice, O: OutputDevice> Drop for TunerApp<I, O> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
