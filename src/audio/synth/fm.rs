use std::f32::consts::TAU;

use super::Synth;
use crate::audio::instrument::param;
use crate::audio::oscillator::{Phase, waveform};
use crate::audio::{InstrumentSettings, Wave};

/// Two-operator FM: one modulator phase-modulating a sine carrier.
#[derive(Debug, Clone)]
pub struct Fm {
    sample_rate: f32,
    carrier: Phase,
    modulator: Phase,
    ratio: f32,
    index: f32,
    modulator_wave: Wave,
}

impl Fm {
    pub fn new(settings: &InstrumentSettings, sample_rate: f32) -> Self {
        let mut fm = Self {
            sample_rate,
            carrier: Phase::default(),
            modulator: Phase::default(),
            ratio: 2.0,
            index: 2.0,
            modulator_wave: Wave::Sine,
        };
        fm.update_settings(settings);
        fm
    }
}

impl Synth for Fm {
    fn note_on(&mut self, _freq: f32) {}

    fn next_sample(&mut self, freq: f32, cutoff_scale: f32) -> f32 {
        let m = waveform(
            self.modulator_wave,
            self.modulator.advance(freq * self.ratio, self.sample_rate),
        );
        let c = self.carrier.advance(freq, self.sample_rate);
        // No filter here, so filter automation scales brightness through the index.
        let index = self.index * cutoff_scale.clamp(0.0, 4.0);
        (TAU * c + index * m).sin()
    }

    fn update_settings(&mut self, settings: &InstrumentSettings) {
        self.ratio = param(settings.ratio, 2.0, 0.01, 32.0);
        self.index = param(settings.index, 2.0, 0.0, 50.0);
        self.modulator_wave = settings.modulator_wave.unwrap_or(Wave::Sine);
    }
}
