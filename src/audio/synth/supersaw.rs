use std::f32::consts::TAU;

use super::Synth;
use crate::audio::filter::LowPass;
use crate::audio::instrument::param;
use crate::audio::oscillator::{Oscillator, Phase};
use crate::audio::{InstrumentSettings, Wave};

const MAX_VOICES: u32 = 16;

#[derive(Debug, Clone, Copy)]
struct StackDefaults {
    voices: u32,
    spread: f32,
    cutoff: f32,
    resonance: f32,
    lfo_rate: f32,
    lfo_depth: f32,
}

const SUPERSAW: StackDefaults = StackDefaults {
    voices: 7,
    spread: 25.0,
    cutoff: 6000.0,
    resonance: 0.8,
    lfo_rate: 0.0,
    lfo_depth: 0.0,
};

const PAD: StackDefaults = StackDefaults {
    voices: 5,
    spread: 15.0,
    cutoff: 1800.0,
    resonance: 0.7,
    lfo_rate: 0.25,
    lfo_depth: 0.35,
};

#[derive(Debug, Clone)]
struct StackVoice {
    osc: Oscillator,
    ratio: f32,
    weight: f32,
}

/// Detuned saw stack with an LFO on the filter cutoff. Also drives the pad.
#[derive(Debug, Clone)]
pub struct Supersaw {
    sample_rate: f32,
    defaults: StackDefaults,
    stack: Vec<StackVoice>,
    weight_sum: f32,
    voices: u32,
    spread: f32,
    filter: LowPass,
    cutoff: f32,
    resonance: f32,
    lfo: Phase,
    lfo_rate: f32,
    lfo_depth: f32,
}

impl Supersaw {
    pub fn new(settings: &InstrumentSettings, sample_rate: f32) -> Self {
        Self::with_defaults(SUPERSAW, settings, sample_rate)
    }

    pub fn pad(settings: &InstrumentSettings, sample_rate: f32) -> Self {
        Self::with_defaults(PAD, settings, sample_rate)
    }

    fn with_defaults(
        defaults: StackDefaults,
        settings: &InstrumentSettings,
        sample_rate: f32,
    ) -> Self {
        let mut synth = Self {
            sample_rate,
            defaults,
            stack: Vec::new(),
            weight_sum: 1.0,
            voices: 0,
            spread: f32::NAN,
            filter: LowPass::new(sample_rate, defaults.cutoff, defaults.resonance),
            cutoff: defaults.cutoff,
            resonance: defaults.resonance,
            lfo: Phase::default(),
            lfo_rate: defaults.lfo_rate,
            lfo_depth: defaults.lfo_depth,
        };
        synth.update_settings(settings);
        synth
    }

    fn rebuild_stack(&mut self) {
        let n = self.voices;
        self.stack = (0..n)
            .map(|i| {
                // Position across the stack in [-1, 1]; centre voices weigh more.
                let pos = if n == 1 {
                    0.0
                } else {
                    2.0 * i as f32 / (n - 1) as f32 - 1.0
                };
                StackVoice {
                    osc: Oscillator::with_phase(Wave::Saw, i as f32 * 0.618_034),
                    ratio: 2.0_f32.powf(pos * self.spread / 1200.0),
                    weight: 1.0 - 0.5 * pos.abs(),
                }
            })
            .collect();
        self.weight_sum = self.stack.iter().map(|v| v.weight).sum::<f32>().max(1e-6);
    }
}

impl Synth for Supersaw {
    fn note_on(&mut self, _freq: f32) {}

    fn next_sample(&mut self, freq: f32, cutoff_scale: f32) -> f32 {
        let sr = self.sample_rate;
        let sum: f32 = self
            .stack
            .iter_mut()
            .map(|v| v.osc.next(freq * v.ratio, sr) * v.weight)
            .sum();
        let raw = sum / self.weight_sum;

        let lfo = (TAU * self.lfo.advance(self.lfo_rate, sr)).sin();
        let cutoff = self.cutoff * (1.0 + self.lfo_depth * lfo) * cutoff_scale;
        self.filter.set(cutoff, self.resonance);
        self.filter.process(raw)
    }

    fn update_settings(&mut self, settings: &InstrumentSettings) {
        let d = self.defaults;
        let voices = settings.voices.unwrap_or(d.voices).clamp(1, MAX_VOICES);
        let spread = param(settings.spread, d.spread, 0.0, 100.0);
        if voices != self.voices || spread != self.spread {
            self.voices = voices;
            self.spread = spread;
            self.rebuild_stack();
        }
        self.cutoff = param(settings.cutoff, d.cutoff, 20.0, 20_000.0);
        self.resonance = param(settings.resonance, d.resonance, 0.1, 20.0);
        self.lfo_rate = param(settings.lfo_rate, d.lfo_rate, 0.0, 20.0);
        self.lfo_depth = param(settings.lfo_depth, d.lfo_depth, 0.0, 0.95);
    }
}
