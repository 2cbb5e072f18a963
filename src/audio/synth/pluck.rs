use super::Synth;
use crate::audio::instrument::param;
use crate::audio::oscillator::Noise;
use crate::audio::InstrumentSettings;

/// Lowest pitch the preallocated delay line can hold, Hz.
const MIN_FREQ: f32 = 20.0;
/// Pitch bend range of a ringing string, as a rate relative to the plucked
/// note.
const MIN_RATE: f32 = 0.25;
const MAX_RATE: f32 = 4.0;

/// Karplus-Strong string. The delay line is allocated once; a trigger only
/// refills the active part with filtered noise.
#[derive(Debug, Clone)]
pub struct Pluck {
    sample_rate: f32,
    line: Vec<f32>,
    len: usize,
    pos: usize,
    /// Frequency the string was plucked at. Playing at another frequency
    /// walks the loop faster or slower.
    base_freq: f32,
    /// Fractional read position between `pos` and the next slot.
    frac: f32,
    noise: Noise,
    feedback: f32,
    /// Weight of the next sample in the loop's averaging filter.
    blend: f32,
    brightness: f32,
}

impl Pluck {
    pub fn new(settings: &InstrumentSettings, sample_rate: f32, seed: u64) -> Self {
        let capacity = ((sample_rate / MIN_FREQ).ceil() as usize).max(2);
        let mut pluck = Self {
            sample_rate,
            line: vec![0.0; capacity],
            len: 0,
            pos: 0,
            base_freq: 0.0,
            frac: 0.0,
            noise: Noise::new(seed),
            feedback: 0.99,
            blend: 0.2,
            brightness: 0.8,
        };
        pluck.update_settings(settings);
        pluck
    }

    fn excite(&mut self, freq: f32) {
        let period = if freq.is_finite() && freq > 0.0 {
            (self.sample_rate / freq).round() as usize
        } else {
            self.line.len()
        };
        self.len = period.clamp(2, self.line.len());
        self.pos = 0;
        self.frac = 0.0;
        self.base_freq = self.sample_rate / self.len as f32;
        let mut smoothed = 0.0;
        for slot in &mut self.line[..self.len] {
            smoothed += self.brightness * (self.noise.next() - smoothed);
            *slot = smoothed;
        }
    }
}

impl Pluck {
    /// Moves the loop one slot through its averaging filter.
    fn step(&mut self) {
        let current = self.line[self.pos];
        let next = self.line[(self.pos + 1) % self.len];
        self.line[self.pos] = self.feedback * (current * (1.0 - self.blend) + next * self.blend);
        self.pos = (self.pos + 1) % self.len;
    }
}

impl Synth for Pluck {
    fn note_on(&mut self, freq: f32) {
        self.excite(freq);
    }

    fn next_sample(&mut self, freq: f32, _cutoff_scale: f32) -> f32 {
        if self.len < 2 {
            return 0.0;
        }
        let rate = if freq.is_finite() && freq > 0.0 {
            (freq / self.base_freq).clamp(MIN_RATE, MAX_RATE)
        } else {
            1.0
        };
        let current = self.line[self.pos];
        let next = self.line[(self.pos + 1) % self.len];
        let out = current + (next - current) * self.frac;
        self.frac += rate;
        while self.frac >= 1.0 {
            self.step();
            self.frac -= 1.0;
        }
        out
    }

    fn update_settings(&mut self, settings: &InstrumentSettings) {
        let damping = param(settings.damping, 0.3, 0.0, 1.0);
        self.feedback = 0.999 - 0.04 * damping;
        self.blend = 0.1 + 0.4 * damping;
        self.brightness = 1.0 - 0.8 * damping;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44100.0;

    fn energy(pluck: &mut Pluck, n: usize) -> f32 {
        (0..n).map(|_| pluck.next_sample(0.0, 1.0).powi(2)).sum()
    }

    #[test]
    fn silent_until_plucked() {
        let mut pluck = Pluck::new(&InstrumentSettings::default(), SR, 3);
        assert_eq!(pluck.next_sample(440.0, 1.0), 0.0);
    }

    #[test]
    fn string_decays() {
        let mut pluck = Pluck::new(&InstrumentSettings::default(), SR, 3);
        pluck.note_on(220.0);
        let early = energy(&mut pluck, 4410);
        energy(&mut pluck, 44100);
        let late = energy(&mut pluck, 4410);
        assert!(late < early * 0.5);
    }

    #[test]
    fn period_matches_pitch_and_fits_buffer() {
        let mut pluck = Pluck::new(&InstrumentSettings::default(), SR, 3);
        pluck.note_on(441.0);
        assert_eq!(pluck.len, 100);
        pluck.note_on(1.0);
        assert_eq!(pluck.len, pluck.line.len());
        let capacity = pluck.line.len();
        pluck.note_on(10_000.0);
        assert_eq!(pluck.line.len(), capacity);
    }

    #[test]
    fn bent_pitch_walks_the_loop_faster() {
        let mut pluck = Pluck::new(&InstrumentSettings::default(), SR, 3);
        pluck.note_on(441.0);
        for _ in 0..50 {
            pluck.next_sample(441.0, 1.0);
        }
        assert_eq!(pluck.pos, 50);

        pluck.note_on(441.0);
        for _ in 0..50 {
            pluck.next_sample(882.0, 1.0);
        }
        // An octave up covers the whole 100-slot loop in 50 samples.
        assert_eq!(pluck.pos, 0);
        assert_eq!(pluck.frac, 0.0);
    }

    #[test]
    fn heavy_damping_dies_faster() {
        let decay_ratio = |damping: f32| {
            let mut pluck = Pluck::new(
                &InstrumentSettings {
                    damping: Some(damping),
                    ..Default::default()
                },
                SR,
                3,
            );
            pluck.note_on(220.0);
            let early = energy(&mut pluck, 4410);
            energy(&mut pluck, 8820);
            energy(&mut pluck, 4410) / early.max(1e-12)
        };
        assert!(decay_ratio(1.0) < decay_ratio(0.0));
    }
}
