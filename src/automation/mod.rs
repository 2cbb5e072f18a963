//! Timeline-driven parameter automation.
//!
//! Effects and envelopes are defined once and placed on the timeline. A
//! placement is active while `start_beat <= beat < start_beat + duration` and
//! applies to every voice, or only to the voices of its pattern.

mod curve;
mod effects;
mod envelopes;

pub use curve::{Curve, CurveShape};
pub use effects::{EffectDefinition, EffectKind};
pub use envelopes::{EnvelopeDefinition, EnvelopeTarget, Modulation};

use effects::EffectProcessor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub definition_id: String,
    pub start_beat: f64,
    /// Beats
    pub duration: f64,
    /// Restricts the placement to one pattern's voices.
    #[serde(default)]
    pub pattern_id: Option<String>,
}

impl Placement {
    /// Progress through the placement, or `None` when inactive at `beat`.
    pub fn progress(&self, beat: f64) -> Option<f32> {
        if self.duration.is_nan() || self.duration <= 0.0 || !beat.is_finite() {
            return None;
        }
        let offset = beat - self.start_beat;
        (offset >= 0.0 && offset < self.duration).then(|| (offset / self.duration) as f32)
    }

    pub fn applies_to(&self, pattern_id: Option<&str>) -> bool {
        match &self.pattern_id {
            None => true,
            Some(own) => pattern_id == Some(own.as_str()),
        }
    }

    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration.max(0.0)
    }

    fn progress_for(&self, beat: f64, pattern_id: Option<&str>) -> Option<f32> {
        if self.applies_to(pattern_id) {
            self.progress(beat)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
struct PlacedEffect {
    placement: Placement,
    processor: EffectProcessor,
}

#[derive(Debug, Clone)]
struct PlacedEnvelope {
    placement: Placement,
    target: EnvelopeTarget,
    curve: Curve,
}

/// Placements joined with their definitions.
#[derive(Debug, Clone, Default)]
pub struct Automation {
    effects: Vec<PlacedEffect>,
    envelopes: Vec<PlacedEnvelope>,
}

impl Automation {
    /// Placements whose definition is missing are logged and dropped.
    pub fn new(
        effect_definitions: &[EffectDefinition],
        envelope_definitions: &[EnvelopeDefinition],
        effect_placements: &[Placement],
        envelope_placements: &[Placement],
    ) -> Self {
        let effects = effect_placements
            .iter()
            .filter_map(|placement| {
                let definition = effect_definitions
                    .iter()
                    .find(|d| d.id == placement.definition_id);
                if definition.is_none() {
                    tracing::warn!(
                        id = %placement.definition_id,
                        "effect placement without definition"
                    );
                }
                definition.map(|d| PlacedEffect {
                    placement: placement.clone(),
                    processor: EffectProcessor::new(d),
                })
            })
            .collect();
        let envelopes = envelope_placements
            .iter()
            .filter_map(|placement| {
                let definition = envelope_definitions
                    .iter()
                    .find(|d| d.id == placement.definition_id);
                if definition.is_none() {
                    tracing::warn!(
                        id = %placement.definition_id,
                        "envelope placement without definition"
                    );
                }
                definition.map(|d| PlacedEnvelope {
                    placement: placement.clone(),
                    target: d.target,
                    curve: d.curve,
                })
            })
            .collect();
        Self { effects, envelopes }
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.envelopes.is_empty()
    }

    /// Latest placement end, in beats.
    pub fn last_beat(&self) -> f64 {
        let effects = self.effects.iter().map(|e| e.placement.end_beat());
        let envelopes = self.envelopes.iter().map(|e| e.placement.end_beat());
        effects.chain(envelopes).fold(0.0, f64::max)
    }

    /// Combined envelope modulation for a voice at `beat`.
    pub fn modulation(&self, beat: f64, pattern_id: Option<&str>) -> Modulation {
        let mut modulation = Modulation::NEUTRAL;
        for envelope in &self.envelopes {
            if let Some(t) = envelope.placement.progress_for(beat, pattern_id) {
                modulation.apply(envelope.target, envelope.curve.value_at(t));
            }
        }
        modulation
    }

    /// Runs `sample` through every active effect in placement order.
    pub fn apply_effects(&self, sample: f32, beat: f64, pattern_id: Option<&str>) -> f32 {
        self.effects.iter().fold(sample, |x, effect| {
            match effect.placement.progress_for(beat, pattern_id) {
                Some(t) => effect.processor.process(x, effect.processor.amount.value_at(t)),
                None => x,
            }
        })
    }
}
