use std::f32::consts::TAU;

use super::Synth;
use crate::audio::filter::{OnePole, OnePoleMode};
use crate::audio::instrument::param;
use crate::audio::oscillator::{Noise, Phase, waveform};
use crate::audio::{InstrumentSettings, InstrumentType, Wave};

/// MIDI 60; drum tuning is relative to this.
const MIDDLE_C: f32 = 261.625_58;
/// Square-wave cluster behind the hat and cymbal, Hz.
const METAL: [f32; 6] = [205.3, 304.4, 369.6, 522.7, 540.0, 800.0];

#[derive(Debug, Clone, Copy)]
struct DrumParams {
    pitch_start: f32,
    pitch_end: f32,
    pitch_decay: f32,
    click: f32,
    noise: f32,
    open: bool,
}

impl DrumParams {
    fn resolve(kind: InstrumentType, settings: &InstrumentSettings) -> Self {
        let (start, end, decay, click, noise) = match kind {
            InstrumentType::Kick => (150.0, 45.0, 0.05, 0.4, 0.0),
            InstrumentType::Snare => (220.0, 180.0, 0.03, 0.0, 0.65),
            InstrumentType::HiHat => (0.0, 0.0, 0.01, 0.0, 0.4),
            InstrumentType::Clap => (0.0, 0.0, 0.01, 0.0, 1.0),
            InstrumentType::Tom => (180.0, 110.0, 0.12, 0.0, 0.1),
            InstrumentType::Cymbal => (0.0, 0.0, 0.01, 0.0, 0.5),
            InstrumentType::Shaker => (0.0, 0.0, 0.01, 0.0, 1.0),
            _ => (1700.0, 1600.0, 0.01, 0.6, 0.2),
        };
        Self {
            pitch_start: param(settings.pitch_start, start, 0.0, 20_000.0),
            pitch_end: param(settings.pitch_end, end, 0.0, 20_000.0),
            pitch_decay: param(settings.pitch_decay, decay, 0.001, 2.0),
            click: param(settings.click, click, 0.0, 1.0),
            noise: param(settings.noise, noise, 0.0, 1.0),
            open: settings.open.unwrap_or(false),
        }
    }
}

/// Every percussive type: a swept sine body, shaped noise and metallic
/// partials, combined per kind.
#[derive(Debug, Clone)]
pub struct Drum {
    kind: InstrumentType,
    sample_rate: f32,
    params: DrumParams,
    noise: Noise,
    body: Phase,
    overtone: Phase,
    metal: [Phase; 6],
    high_pass: OnePole,
    low_pass: OnePole,
    elapsed: u32,
}

impl Drum {
    pub fn new(
        kind: InstrumentType,
        settings: &InstrumentSettings,
        sample_rate: f32,
        seed: u64,
    ) -> Self {
        let (high, low) = match kind {
            InstrumentType::Snare => (1500.0, 12_000.0),
            InstrumentType::HiHat => (7000.0, 16_000.0),
            InstrumentType::Clap => (900.0, 2800.0),
            InstrumentType::Cymbal | InstrumentType::Shaker => (5000.0, 16_000.0),
            InstrumentType::Rimshot => (3000.0, 12_000.0),
            _ => (200.0, 8000.0),
        };
        Self {
            kind,
            sample_rate,
            params: DrumParams::resolve(kind, settings),
            noise: Noise::new(seed),
            body: Phase::default(),
            overtone: Phase::default(),
            metal: [Phase::default(); 6],
            high_pass: OnePole::new(OnePoleMode::HighPass, high, sample_rate),
            low_pass: OnePole::new(OnePoleMode::LowPass, low, sample_rate),
            elapsed: 0,
        }
    }

    fn sweep(&self, t: f32) -> f32 {
        let p = &self.params;
        p.pitch_end + (p.pitch_start - p.pitch_end) * (-t / p.pitch_decay).exp()
    }

    fn metallic(&mut self, ratio: f32) -> f32 {
        let sr = self.sample_rate;
        let sum: f32 = self
            .metal
            .iter_mut()
            .zip(METAL)
            .map(|(phase, f)| waveform(Wave::Square, phase.advance(f * ratio, sr)))
            .sum();
        sum / METAL.len() as f32
    }

    fn sine(phase: &mut Phase, freq: f32, sample_rate: f32) -> f32 {
        (TAU * phase.advance(freq, sample_rate)).sin()
    }
}

impl Synth for Drum {
    fn note_on(&mut self, _freq: f32) {
        // Each hit is a fresh transient.
        self.elapsed = 0;
        self.body.reset();
        self.overtone.reset();
        self.metal.iter_mut().for_each(Phase::reset);
        self.high_pass.reset();
        self.low_pass.reset();
    }

    fn next_sample(&mut self, freq: f32, _cutoff_scale: f32) -> f32 {
        let sr = self.sample_rate;
        let ratio = if freq.is_finite() && freq > 0.0 {
            freq / MIDDLE_C
        } else {
            1.0
        };
        let t = self.elapsed as f32 / sr;
        self.elapsed = self.elapsed.saturating_add(1);
        let p = self.params;

        match self.kind {
            InstrumentType::Kick => {
                // Second, faster stage gives the initial thump its snap.
                let f = (self.sweep(t) + p.pitch_start * (-t / 0.004).exp()) * ratio;
                let body = Self::sine(&mut self.body, f, sr);
                let click = (Self::sine(&mut self.overtone, 3200.0 * ratio, sr) * 0.5
                    + self.noise.next() * 0.5)
                    * (-t / 0.0015).exp()
                    * p.click;
                body + click
            }
            InstrumentType::Snare => {
                let f = self.sweep(t) * ratio;
                let body = Self::sine(&mut self.body, f, sr) * (-t / 0.1).exp();
                let n = self.noise.next();
                let wires = self.high_pass.process(n) * (-t / 0.15).exp();
                body * (1.0 - 0.5 * p.noise) + wires * p.noise
            }
            InstrumentType::HiHat => {
                let metal = self.metallic(ratio);
                let n = self.noise.next();
                let decay = if p.open { 0.35 } else { 0.05 };
                let mixed = metal * (1.0 - p.noise) + n * p.noise;
                self.high_pass.process(mixed) * (-t / decay).exp()
            }
            InstrumentType::Clap => {
                let n = self.noise.next();
                let band = self.low_pass.process(self.high_pass.process(n));
                let bursts: f32 = (0..3)
                    .map(|k| k as f32 * 0.01)
                    .filter(|start| t >= *start)
                    .map(|start| (-(t - start) / 0.004).exp())
                    .sum();
                let tail = if t >= 0.03 {
                    0.7 * (-(t - 0.03) / 0.12).exp()
                } else {
                    0.0
                };
                band * (bursts + tail) * 2.0 * p.noise
            }
            InstrumentType::Tom => {
                let f = self.sweep(t) * ratio;
                let body = Self::sine(&mut self.body, f, sr);
                let n = self.low_pass.process(self.noise.next());
                body + n * p.noise * (-t / 0.02).exp()
            }
            InstrumentType::Cymbal => {
                let metal = self.metallic(ratio * 1.5);
                let n = self.noise.next();
                let mixed = metal * (1.0 - p.noise) + n * p.noise;
                self.high_pass.process(mixed) * (-t / 1.2).exp()
            }
            InstrumentType::Shaker => {
                let n = self.high_pass.process(self.noise.next());
                let wobble = 0.75 + 0.25 * Self::sine(&mut self.body, 18.0, sr);
                n * wobble * (-t / 0.06).exp() * p.noise
            }
            _ => {
                let f = self.sweep(t) * ratio;
                let body = Self::sine(&mut self.body, f, sr) * (-t / 0.012).exp()
                    + Self::sine(&mut self.overtone, 455.0 * ratio, sr) * 0.5 * (-t / 0.02).exp();
                let n = self.noise.next();
                let click = n * (-t / 0.001).exp() * p.click;
                let rattle = self.high_pass.process(n) * p.noise * (-t / 0.02).exp();
                body + click + rattle
            }
        }
    }

    fn update_settings(&mut self, settings: &InstrumentSettings) {
        self.params = DrumParams::resolve(self.kind, settings);
    }
}
