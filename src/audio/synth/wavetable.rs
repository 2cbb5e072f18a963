use super::Synth;
use crate::audio::filter::LowPass;
use crate::audio::instrument::param;
use crate::audio::oscillator::Phase;
use crate::audio::{InstrumentSettings, Wave};

const TABLE_SIZE: usize = 2048;
const HARMONICS: usize = 32;

/// Single-cycle table built additively, read with linear interpolation.
#[derive(Debug, Clone)]
pub struct Wavetable {
    sample_rate: f32,
    shape: Wave,
    table: Vec<f32>,
    phase: Phase,
    filter: LowPass,
    cutoff: f32,
    resonance: f32,
}

impl Wavetable {
    pub fn new(settings: &InstrumentSettings, sample_rate: f32) -> Self {
        let shape = settings.table.unwrap_or(Wave::Saw);
        let mut synth = Self {
            sample_rate,
            shape,
            table: build_table(shape),
            phase: Phase::default(),
            filter: LowPass::new(sample_rate, 8000.0, 0.707),
            cutoff: 8000.0,
            resonance: 0.707,
        };
        synth.update_settings(settings);
        synth
    }

    fn read(&self, phase: f32) -> f32 {
        let pos = phase * TABLE_SIZE as f32;
        let i = (pos as usize).min(TABLE_SIZE - 1);
        let frac = pos - i as f32;
        let a = self.table[i];
        let b = self.table[(i + 1) % TABLE_SIZE];
        a + (b - a) * frac
    }
}

fn build_table(shape: Wave) -> Vec<f32> {
    // Band-limited sum of sines; harmonic n gets amplitude `amp(n)`.
    let amp = |n: usize| -> f32 {
        let n_f = n as f32;
        match shape {
            Wave::Sine => {
                if n == 1 {
                    1.0
                } else {
                    0.0
                }
            }
            Wave::Saw => 1.0 / n_f,
            Wave::Square => {
                if n % 2 == 1 {
                    1.0 / n_f
                } else {
                    0.0
                }
            }
            Wave::Triangle => {
                if n % 2 == 1 {
                    let sign = if (n / 2) % 2 == 0 { 1.0 } else { -1.0 };
                    sign / (n_f * n_f)
                } else {
                    0.0
                }
            }
        }
    };
    let mut table: Vec<f32> = (0..TABLE_SIZE)
        .map(|i| {
            let x = std::f32::consts::TAU * i as f32 / TABLE_SIZE as f32;
            (1..=HARMONICS).map(|n| amp(n) * (n as f32 * x).sin()).sum()
        })
        .collect();
    let peak = table.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        table.iter_mut().for_each(|s| *s /= peak);
    }
    table
}

impl Synth for Wavetable {
    fn note_on(&mut self, _freq: f32) {}

    fn next_sample(&mut self, freq: f32, cutoff_scale: f32) -> f32 {
        let phase = self.phase.advance(freq, self.sample_rate);
        let raw = self.read(phase);
        self.filter.set(self.cutoff * cutoff_scale, self.resonance);
        self.filter.process(raw)
    }

    fn update_settings(&mut self, settings: &InstrumentSettings) {
        let shape = settings.table.unwrap_or(Wave::Saw);
        if shape != self.shape {
            self.shape = shape;
            self.table = build_table(shape);
        }
        self.cutoff = param(settings.cutoff, 8000.0, 20.0, 20_000.0);
        self.resonance = param(settings.resonance, 0.707, 0.1, 20.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_normalized() {
        for shape in [Wave::Sine, Wave::Saw, Wave::Square, Wave::Triangle] {
            let table = build_table(shape);
            assert_eq!(table.len(), TABLE_SIZE);
            let peak = table.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!((peak - 1.0).abs() < 1e-4, "{shape:?} peak {peak}");
        }
    }

    #[test]
    fn interpolates_between_entries() {
        let synth = Wavetable::new(
            &InstrumentSettings {
                table: Some(Wave::Sine),
                ..Default::default()
            },
            44100.0,
        );
        let between = synth.read(0.5 / TABLE_SIZE as f32);
        let expected = (synth.table[0] + synth.table[1]) / 2.0;
        assert!((between - expected).abs() < 1e-6);
    }

    #[test]
    fn changing_table_rebuilds() {
        let mut synth = Wavetable::new(&InstrumentSettings::default(), 44100.0);
        let saw = synth.table.clone();
        synth.update_settings(&InstrumentSettings {
            table: Some(Wave::Square),
            ..Default::default()
        });
        assert_ne!(saw, synth.table);
    }
}
