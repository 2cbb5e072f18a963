use serde::{Deserialize, Serialize};

use super::envelope::Adsr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wave {
    #[default]
    Sine,
    Saw,
    Square,
    Triangle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentType {
    Kick,
    Snare,
    HiHat,
    Clap,
    Tom,
    Cymbal,
    Shaker,
    Rimshot,
    Subtractive,
    Bass,
    Supersaw,
    Pad,
    Fm,
    Wavetable,
    Pluck,
    Organ,
}

impl InstrumentType {
    pub fn is_percussive(self) -> bool {
        matches!(
            self,
            InstrumentType::Kick
                | InstrumentType::Snare
                | InstrumentType::HiHat
                | InstrumentType::Clap
                | InstrumentType::Tom
                | InstrumentType::Cymbal
                | InstrumentType::Shaker
                | InstrumentType::Rimshot
        )
    }

    /// Seconds
    pub fn retrigger_crossfade(self) -> f32 {
        if self.is_percussive() { 0.005 } else { 0.010 }
    }

    pub fn default_adsr(self) -> Adsr {
        let (attack, decay, sustain, release) = match self {
            InstrumentType::Kick => (0.001, 0.45, 0.0, 0.05),
            InstrumentType::Snare => (0.001, 0.25, 0.0, 0.05),
            InstrumentType::HiHat => (0.001, 0.12, 0.0, 0.03),
            InstrumentType::Clap => (0.001, 0.3, 0.0, 0.05),
            InstrumentType::Tom => (0.001, 0.4, 0.0, 0.06),
            InstrumentType::Cymbal => (0.001, 1.5, 0.0, 0.3),
            InstrumentType::Shaker => (0.002, 0.15, 0.0, 0.03),
            InstrumentType::Rimshot => (0.001, 0.1, 0.0, 0.03),
            InstrumentType::Subtractive => (0.01, 0.2, 0.7, 0.3),
            InstrumentType::Bass => (0.005, 0.15, 0.8, 0.15),
            InstrumentType::Supersaw => (0.02, 0.3, 0.8, 0.4),
            InstrumentType::Pad => (0.6, 0.8, 0.8, 1.5),
            InstrumentType::Fm => (0.005, 0.3, 0.6, 0.3),
            InstrumentType::Wavetable => (0.01, 0.2, 0.7, 0.3),
            InstrumentType::Pluck => (0.001, 1.2, 0.0, 0.2),
            InstrumentType::Organ => (0.005, 0.05, 1.0, 0.08),
        };
        Adsr {
            attack,
            decay,
            sustain,
            release,
        }
    }
}

/// Per-instrument settings. Every field is optional; each synth documents
/// its own default and range and ignores the fields it does not use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentSettings {
    /// Seconds
    pub attack: Option<f32>,
    /// Seconds
    pub decay: Option<f32>,
    /// 0.0 -> 1.0
    pub sustain: Option<f32>,
    /// Seconds
    pub release: Option<f32>,
    /// Seconds a melodic note sustains before releasing on its own.
    pub hold: Option<f32>,

    /// Semitones
    pub tune: Option<f32>,
    /// Hz, drum body sweep start
    pub pitch_start: Option<f32>,
    /// Hz, drum body sweep end
    pub pitch_end: Option<f32>,
    /// Seconds
    pub pitch_decay: Option<f32>,
    pub click: Option<f32>,
    pub noise: Option<f32>,
    pub open: Option<bool>,

    pub wave: Option<Wave>,
    pub wave2: Option<Wave>,
    /// Cents
    pub detune: Option<f32>,
    pub osc_mix: Option<f32>,
    pub sub_level: Option<f32>,
    pub drive: Option<f32>,

    /// Hz
    pub cutoff: Option<f32>,
    pub resonance: Option<f32>,

    pub voices: Option<u32>,
    /// Cents
    pub spread: Option<f32>,
    /// Hz
    pub lfo_rate: Option<f32>,
    pub lfo_depth: Option<f32>,

    pub ratio: Option<f32>,
    pub index: Option<f32>,
    pub modulator_wave: Option<Wave>,

    pub table: Option<Wave>,

    pub damping: Option<f32>,

    pub drawbars: Option<Vec<f32>>,
}

impl InstrumentSettings {
    pub fn adsr(&self, kind: InstrumentType) -> Adsr {
        let defaults = kind.default_adsr();
        Adsr {
            attack: param(self.attack, defaults.attack, 0.0, 10.0),
            decay: param(self.decay, defaults.decay, 0.0, 10.0),
            sustain: param(self.sustain, defaults.sustain, 0.0, 1.0),
            release: param(self.release, defaults.release, 0.0, 10.0),
        }
    }

    pub fn hold(&self) -> Option<f32> {
        self.hold.filter(|h| h.is_finite() && *h > 0.0)
    }

    pub fn tune(&self) -> f32 {
        param(self.tune, 0.0, -48.0, 48.0)
    }
}

/// Falls back to `default` for missing or non-finite values and clamps the rest.
pub(crate) fn param(value: Option<f32>, default: f32, min: f32, max: f32) -> f32 {
    match value {
        Some(v) if v.is_finite() => v.clamp(min, max),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_use_type_defaults() {
        let settings = InstrumentSettings::default();
        assert_eq!(
            settings.adsr(InstrumentType::Pad),
            InstrumentType::Pad.default_adsr()
        );
    }

    #[test]
    fn non_finite_settings_fall_back() {
        let settings = InstrumentSettings {
            attack: Some(f32::NAN),
            sustain: Some(4.0),
            ..Default::default()
        };
        let adsr = settings.adsr(InstrumentType::Subtractive);
        assert_eq!(adsr.attack, InstrumentType::Subtractive.default_adsr().attack);
        assert_eq!(adsr.sustain, 1.0);
    }

    #[test]
    fn crossfade_length_depends_on_family() {
        assert_eq!(InstrumentType::Kick.retrigger_crossfade(), 0.005);
        assert_eq!(InstrumentType::Organ.retrigger_crossfade(), 0.010);
    }

    #[test]
    fn instrument_type_names_are_lowercase() {
        let parsed: InstrumentType = ron::from_str("hihat").unwrap();
        assert_eq!(parsed, InstrumentType::HiHat);
    }
}
