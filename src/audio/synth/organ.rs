use std::f32::consts::TAU;

use super::Synth;
use crate::audio::InstrumentSettings;
use crate::audio::oscillator::Phase;

/// Footages 16', 5 1/3', 8', 4', 2 2/3', 2', 1 3/5', 1 1/3', 1' as
/// multiples of the played note.
const DRAWBAR_RATIOS: [f32; 9] = [0.5, 1.5, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0];
const DEFAULT_DRAWBARS: [f32; 9] = [8.0, 8.0, 8.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

/// Tonewheel-style additive organ.
#[derive(Debug, Clone)]
pub struct Organ {
    sample_rate: f32,
    /// Drawbar positions scaled to 0.0 -> 1.0.
    levels: [f32; 9],
    wheels: [Phase; 9],
    active: usize,
}

impl Organ {
    pub fn new(settings: &InstrumentSettings, sample_rate: f32) -> Self {
        let mut organ = Self {
            sample_rate,
            levels: [0.0; 9],
            wheels: [Phase::default(); 9],
            active: 0,
        };
        organ.update_settings(settings);
        organ
    }
}

fn tone_weight(f: f32, ceiling: f32, cutoff_scale: f32) -> f32 {
    if cutoff_scale >= 1.0 {
        1.0
    } else if ceiling <= 0.0 {
        0.0
    } else {
        ((ceiling - f) / (0.5 * ceiling)).clamp(0.0, 1.0)
    }
}

impl Synth for Organ {
    fn note_on(&mut self, _freq: f32) {}

    /// A `cutoff_scale` below 1.0 lowers a tone ceiling from Nyquist;
    /// partials fade out over the octave beneath it.
    fn next_sample(&mut self, freq: f32, cutoff_scale: f32) -> f32 {
        let nyquist = self.sample_rate * 0.5;
        let ceiling = nyquist * cutoff_scale.clamp(0.0, 1.0);
        let mut sum = 0.0;
        let stops = self.wheels.iter_mut().zip(DRAWBAR_RATIOS).zip(self.levels);
        for ((wheel, ratio), level) in stops {
            let f = freq * ratio;
            let phase = wheel.advance(f, self.sample_rate);
            if level > 0.0 && f < nyquist {
                sum += (TAU * phase).sin() * level * tone_weight(f, ceiling, cutoff_scale);
            }
        }
        sum / self.active.max(1) as f32
    }

    fn update_settings(&mut self, settings: &InstrumentSettings) {
        let drawbars = settings.drawbars.as_deref().unwrap_or(&DEFAULT_DRAWBARS);
        self.levels = [0.0; 9];
        for (level, value) in self.levels.iter_mut().zip(drawbars) {
            if value.is_finite() {
                *level = value.clamp(0.0, 8.0) / 8.0;
            }
        }
        self.active = self.levels.iter().filter(|l| **l > 0.0).count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registration_uses_three_drawbars() {
        let organ = Organ::new(&InstrumentSettings::default(), 44100.0);
        assert_eq!(organ.active, 3);
        assert_eq!(organ.levels[0], 1.0);
        assert_eq!(organ.levels[3], 0.0);
    }

    #[test]
    fn output_is_normalized_by_active_drawbars() {
        let mut organ = Organ::new(
            &InstrumentSettings {
                drawbars: Some(vec![8.0; 9]),
                ..Default::default()
            },
            44100.0,
        );
        for _ in 0..44100 {
            assert!(organ.next_sample(110.0, 1.0).abs() <= 1.0);
        }
    }

    #[test]
    fn harmonics_above_nyquist_are_skipped() {
        let mut organ = Organ::new(
            &InstrumentSettings {
                drawbars: Some(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 8.0]),
                ..Default::default()
            },
            1000.0,
        );
        // 1' drawbar of a 100 Hz note sits at 800 Hz, above the 500 Hz Nyquist.
        for _ in 0..100 {
            assert_eq!(organ.next_sample(100.0, 1.0), 0.0);
        }
    }

    #[test]
    fn lowered_cutoff_darkens_the_registration() {
        let settings = InstrumentSettings {
            drawbars: Some(vec![8.0, 0.0, 8.0, 0.0, 0.0, 0.0, 0.0, 0.0, 8.0]),
            ..Default::default()
        };
        let energy = |cutoff_scale: f32| {
            let mut organ = Organ::new(&settings, 44100.0);
            (0..4410)
                .map(|_| organ.next_sample(800.0, cutoff_scale).powi(2))
                .sum::<f32>()
        };
        // The 1' partial sits at 6.4 kHz, above a 4.4 kHz ceiling.
        let open = energy(1.0);
        let closed = energy(0.2);
        assert!(closed < open * 0.8);
        assert!(closed > 0.0);
    }

    #[test]
    fn extra_drawbars_are_ignored() {
        let organ = Organ::new(
            &InstrumentSettings {
                drawbars: Some(vec![4.0; 20]),
                ..Default::default()
            },
            44100.0,
        );
        assert_eq!(organ.active, 9);
        assert_eq!(organ.levels[8], 0.5);
    }
}
