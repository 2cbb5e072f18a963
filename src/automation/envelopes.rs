use serde::{Deserialize, Serialize};

use super::Curve;

/// What an automation envelope drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeTarget {
    /// Gain multiplier
    Volume,
    /// Added to the track pan
    Pan,
    /// Cutoff multiplier
    Filter,
    /// Semitones
    Pitch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeDefinition {
    pub id: String,
    pub target: EnvelopeTarget,
    pub curve: Curve,
}

/// Everything envelope automation contributes to one voice at one beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modulation {
    pub volume: f32,
    pub pan: f32,
    pub cutoff_scale: f32,
    /// Semitones
    pub pitch: f32,
}

impl Modulation {
    pub const NEUTRAL: Modulation = Modulation {
        volume: 1.0,
        pan: 0.0,
        cutoff_scale: 1.0,
        pitch: 0.0,
    };

    pub(crate) fn apply(&mut self, target: EnvelopeTarget, value: f32) {
        if !value.is_finite() {
            return;
        }
        match target {
            EnvelopeTarget::Volume => self.volume *= value.max(0.0),
            EnvelopeTarget::Pan => self.pan = (self.pan + value).clamp(-1.0, 1.0),
            EnvelopeTarget::Filter => self.cutoff_scale *= value.max(0.0),
            EnvelopeTarget::Pitch => self.pitch += value,
        }
    }
}

impl Default for Modulation {
    fn default() -> Self {
        Self::NEUTRAL
    }
}
