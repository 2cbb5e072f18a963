//! Procedural sound generators, one per instrument type.
//!
//! Synths produce the raw signal only; amplitude envelope, velocity and
//! retrigger crossfading live in [`super::Voice`].

mod fm;
mod organ;
mod percussion;
mod pluck;
mod subtractive;
mod supersaw;
mod wavetable;

pub use fm::Fm;
pub use organ::Organ;
pub use percussion::Drum;
pub use pluck::Pluck;
pub use subtractive::{Bass, Subtractive};
pub use supersaw::Supersaw;
pub use wavetable::Wavetable;

use super::{InstrumentSettings, InstrumentType};

pub trait Synth {
    /// Called on every trigger with the note's base frequency.
    fn note_on(&mut self, freq: f32);

    /// `cutoff_scale` multiplies the synth's filter cutoff (1.0 = unchanged).
    fn next_sample(&mut self, freq: f32, cutoff_scale: f32) -> f32;

    fn update_settings(&mut self, settings: &InstrumentSettings);
}

#[derive(Debug, Clone)]
pub enum SynthEngine {
    Drum(Drum),
    Subtractive(Subtractive),
    Bass(Bass),
    Supersaw(Supersaw),
    Fm(Fm),
    Wavetable(Wavetable),
    Pluck(Pluck),
    Organ(Organ),
}

impl SynthEngine {
    pub fn new(
        kind: InstrumentType,
        settings: &InstrumentSettings,
        sample_rate: f32,
        seed: u64,
    ) -> Self {
        match kind {
            InstrumentType::Kick
            | InstrumentType::Snare
            | InstrumentType::HiHat
            | InstrumentType::Clap
            | InstrumentType::Tom
            | InstrumentType::Cymbal
            | InstrumentType::Shaker
            | InstrumentType::Rimshot => {
                SynthEngine::Drum(Drum::new(kind, settings, sample_rate, seed))
            }
            InstrumentType::Subtractive => {
                SynthEngine::Subtractive(Subtractive::new(settings, sample_rate))
            }
            InstrumentType::Bass => SynthEngine::Bass(Bass::new(settings, sample_rate)),
            InstrumentType::Supersaw => {
                SynthEngine::Supersaw(Supersaw::new(settings, sample_rate))
            }
            InstrumentType::Pad => SynthEngine::Supersaw(Supersaw::pad(settings, sample_rate)),
            InstrumentType::Fm => SynthEngine::Fm(Fm::new(settings, sample_rate)),
            InstrumentType::Wavetable => {
                SynthEngine::Wavetable(Wavetable::new(settings, sample_rate))
            }
            InstrumentType::Pluck => SynthEngine::Pluck(Pluck::new(settings, sample_rate, seed)),
            InstrumentType::Organ => SynthEngine::Organ(Organ::new(settings, sample_rate)),
        }
    }

    fn inner(&mut self) -> &mut dyn Synth {
        match self {
            SynthEngine::Drum(s) => s,
            SynthEngine::Subtractive(s) => s,
            SynthEngine::Bass(s) => s,
            SynthEngine::Supersaw(s) => s,
            SynthEngine::Fm(s) => s,
            SynthEngine::Wavetable(s) => s,
            SynthEngine::Pluck(s) => s,
            SynthEngine::Organ(s) => s,
        }
    }
}

impl Synth for SynthEngine {
    fn note_on(&mut self, freq: f32) {
        self.inner().note_on(freq);
    }

    fn next_sample(&mut self, freq: f32, cutoff_scale: f32) -> f32 {
        self.inner().next_sample(freq, cutoff_scale)
    }

    fn update_settings(&mut self, settings: &InstrumentSettings) {
        self.inner().update_settings(settings);
    }
}
