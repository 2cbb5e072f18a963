use std::f32::consts::TAU;

use super::Synth;
use crate::audio::filter::LowPass;
use crate::audio::instrument::param;
use crate::audio::oscillator::{Oscillator, Phase};
use crate::audio::{InstrumentSettings, Wave};

#[derive(Debug, Clone, Copy)]
struct ToneDefaults {
    wave: Wave,
    wave2: Wave,
    detune: f32,
    osc_mix: f32,
    cutoff: f32,
    resonance: f32,
}

const SUBTRACTIVE: ToneDefaults = ToneDefaults {
    wave: Wave::Saw,
    wave2: Wave::Square,
    detune: 7.0,
    osc_mix: 0.5,
    cutoff: 2000.0,
    resonance: 1.0,
};

const BASS: ToneDefaults = ToneDefaults {
    wave: Wave::Saw,
    wave2: Wave::Square,
    detune: 3.0,
    osc_mix: 0.3,
    cutoff: 800.0,
    resonance: 1.2,
};

/// Two detuned oscillators into a resonant low-pass.
#[derive(Debug, Clone)]
pub struct Subtractive {
    sample_rate: f32,
    defaults: ToneDefaults,
    osc1: Oscillator,
    osc2: Oscillator,
    filter: LowPass,
    /// Frequency ratio of the second oscillator.
    detune_ratio: f32,
    osc_mix: f32,
    cutoff: f32,
    resonance: f32,
}

impl Subtractive {
    pub fn new(settings: &InstrumentSettings, sample_rate: f32) -> Self {
        Self::with_defaults(SUBTRACTIVE, settings, sample_rate)
    }

    fn with_defaults(
        defaults: ToneDefaults,
        settings: &InstrumentSettings,
        sample_rate: f32,
    ) -> Self {
        let mut synth = Self {
            sample_rate,
            defaults,
            osc1: Oscillator::new(defaults.wave),
            osc2: Oscillator::new(defaults.wave2),
            filter: LowPass::new(sample_rate, defaults.cutoff, defaults.resonance),
            detune_ratio: 1.0,
            osc_mix: defaults.osc_mix,
            cutoff: defaults.cutoff,
            resonance: defaults.resonance,
        };
        synth.update_settings(settings);
        synth
    }

    fn oscillators(&mut self, freq: f32) -> f32 {
        let a = self.osc1.next(freq, self.sample_rate);
        let b = self.osc2.next(freq * self.detune_ratio, self.sample_rate);
        a * (1.0 - self.osc_mix) + b * self.osc_mix
    }

    fn filtered(&mut self, input: f32, cutoff_scale: f32) -> f32 {
        self.filter.set(self.cutoff * cutoff_scale, self.resonance);
        self.filter.process(input)
    }
}

impl Synth for Subtractive {
    fn note_on(&mut self, _freq: f32) {}

    fn next_sample(&mut self, freq: f32, cutoff_scale: f32) -> f32 {
        let raw = self.oscillators(freq);
        self.filtered(raw, cutoff_scale)
    }

    fn update_settings(&mut self, settings: &InstrumentSettings) {
        let d = self.defaults;
        self.osc1.wave = settings.wave.unwrap_or(d.wave);
        self.osc2.wave = settings.wave2.unwrap_or(d.wave2);
        let cents = param(settings.detune, d.detune, -100.0, 100.0);
        self.detune_ratio = 2.0_f32.powf(cents / 1200.0);
        self.osc_mix = param(settings.osc_mix, d.osc_mix, 0.0, 1.0);
        self.cutoff = param(settings.cutoff, d.cutoff, 20.0, 20_000.0);
        self.resonance = param(settings.resonance, d.resonance, 0.1, 20.0);
    }
}

/// Subtractive voice with a sine sub-octave and soft-clip drive.
#[derive(Debug, Clone)]
pub struct Bass {
    tone: Subtractive,
    sub: Phase,
    sub_level: f32,
    drive: f32,
}

impl Bass {
    pub fn new(settings: &InstrumentSettings, sample_rate: f32) -> Self {
        let mut bass = Self {
            tone: Subtractive::with_defaults(BASS, settings, sample_rate),
            sub: Phase::default(),
            sub_level: 0.5,
            drive: 1.5,
        };
        bass.update_settings(settings);
        bass
    }
}

impl Synth for Bass {
    fn note_on(&mut self, _freq: f32) {}

    fn next_sample(&mut self, freq: f32, cutoff_scale: f32) -> f32 {
        let sr = self.tone.sample_rate;
        let sub = (TAU * self.sub.advance(freq * 0.5, sr)).sin() * self.sub_level;
        let raw = self.tone.oscillators(freq) + sub;
        let x = self.tone.filtered(raw, cutoff_scale) * self.drive;
        x / (1.0 + x.abs())
    }

    fn update_settings(&mut self, settings: &InstrumentSettings) {
        self.tone.update_settings(settings);
        self.sub_level = param(settings.sub_level, 0.5, 0.0, 1.0);
        self.drive = param(settings.drive, 1.5, 0.1, 20.0);
    }
}
