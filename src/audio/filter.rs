//! Filter sections used by the synth voices.

use std::f32::consts::PI;

const MIN_CUTOFF: f32 = 20.0;
const MAX_CUTOFF_RATIO: f32 = 0.45;

/// Resonant low-pass biquad (RBJ cookbook coefficients, direct form I).
///
/// Cutoff is clamped below Nyquist. If the coefficients come out non-finite
/// the section passes its input through untouched until a later `set` fixes it.
#[derive(Debug, Clone)]
pub struct LowPass {
    sample_rate: f32,
    cutoff: f32,
    q: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
    bypass: bool,
}

impl LowPass {
    pub fn new(sample_rate: f32, cutoff: f32, q: f32) -> Self {
        let mut filter = Self {
            sample_rate,
            cutoff: f32::NAN,
            q: f32::NAN,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            bypass: false,
        };
        filter.set(cutoff, q);
        filter
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// Recomputes coefficients only when the parameters actually move.
    pub fn set(&mut self, cutoff: f32, q: f32) {
        let nyquist_guard = (self.sample_rate * MAX_CUTOFF_RATIO).max(MIN_CUTOFF);
        let cutoff = if cutoff.is_finite() {
            cutoff.clamp(MIN_CUTOFF, nyquist_guard)
        } else {
            nyquist_guard
        };
        let q = if q.is_finite() { q.clamp(0.1, 20.0) } else { 0.707 };
        if (cutoff - self.cutoff).abs() < 0.01 && (q - self.q).abs() < 1e-4 {
            return;
        }
        self.cutoff = cutoff;
        self.q = q;

        let w0 = 2.0 * PI * cutoff / self.sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let a0 = 1.0 + alpha;
        if a0.abs() < f32::EPSILON {
            self.bypass = true;
            return;
        }

        let b1 = (1.0 - cos_w0) / a0;
        let coefficients = [b1 / 2.0, b1, b1 / 2.0, (-2.0 * cos_w0) / a0, (1.0 - alpha) / a0];
        if coefficients.iter().any(|c| !c.is_finite()) {
            self.bypass = true;
            return;
        }
        [self.b0, self.b1, self.b2, self.a1, self.a2] = coefficients;
        self.bypass = false;
    }

    pub fn process(&mut self, input: f32) -> f32 {
        if self.bypass {
            return input;
        }
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        if !output.is_finite() {
            self.reset();
            return 0.0;
        }
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = if output.abs() < 1e-20 { 0.0 } else { output };
        output
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnePoleMode {
    LowPass,
    HighPass,
}

/// One-pole section for shaping drum noise.
#[derive(Debug, Clone)]
pub struct OnePole {
    mode: OnePoleMode,
    coefficient: f32,
    state: f32,
}

impl OnePole {
    pub fn new(mode: OnePoleMode, cutoff: f32, sample_rate: f32) -> Self {
        let cutoff = cutoff.clamp(MIN_CUTOFF, sample_rate * MAX_CUTOFF_RATIO);
        let coefficient = 1.0 - (-2.0 * PI * cutoff / sample_rate).exp();
        Self {
            mode,
            coefficient,
            state: 0.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        self.state += self.coefficient * (input - self.state);
        match self.mode {
            OnePoleMode::LowPass => self.state,
            OnePoleMode::HighPass => input - self.state,
        }
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}
