use std::f32::consts::TAU;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::Wave;

/// Normalized phase accumulator in [0, 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct Phase(f32);

impl Phase {
    pub fn new(start: f32) -> Self {
        Self(start.rem_euclid(1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Returns the phase for this sample, then steps by `freq / sample_rate`.
    pub fn advance(&mut self, freq: f32, sample_rate: f32) -> f32 {
        let current = self.0;
        let step = freq / sample_rate;
        if step.is_finite() {
            self.0 = (self.0 + step).rem_euclid(1.0);
        }
        current
    }

    pub fn reset(&mut self) {
        self.0 = 0.0;
    }
}

/// Naive (aliasing) waveform lookup.
pub fn waveform(wave: Wave, phase: f32) -> f32 {
    match wave {
        Wave::Sine => (phase * TAU).sin(),
        Wave::Saw => 2.0 * phase - 1.0,
        Wave::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Wave::Triangle => {
            if phase < 0.5 {
                4.0 * phase - 1.0
            } else {
                3.0 - 4.0 * phase
            }
        }
    }
}

/// Oscillator with PolyBLEP correction on the saw and square edges.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub wave: Wave,
    phase: Phase,
}

impl Oscillator {
    pub fn new(wave: Wave) -> Self {
        Self {
            wave,
            phase: Phase::default(),
        }
    }

    pub fn with_phase(wave: Wave, start: f32) -> Self {
        Self {
            wave,
            phase: Phase::new(start),
        }
    }

    pub fn next(&mut self, freq: f32, sample_rate: f32) -> f32 {
        let dt = (freq / sample_rate).abs().min(0.5);
        let t = self.phase.advance(freq, sample_rate);
        match self.wave {
            Wave::Sine | Wave::Triangle => waveform(self.wave, t),
            Wave::Saw => waveform(Wave::Saw, t) - poly_blep(t, dt),
            Wave::Square => {
                waveform(Wave::Square, t) + poly_blep(t, dt) - poly_blep((t + 0.5) % 1.0, dt)
            }
        }
    }
}

fn poly_blep(t: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

/// Seeded white noise so renders are repeatable.
#[derive(Debug, Clone)]
pub struct Noise {
    rng: SmallRng,
}

impl Noise {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn next(&mut self) -> f32 {
        self.rng.gen_range(-1.0..1.0)
    }
}

pub fn midi_to_freq(note: f32) -> f32 {
    440.0 * 2.0_f32.powf((note - 69.0) / 12.0)
}
