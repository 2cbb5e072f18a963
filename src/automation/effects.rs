use serde::{Deserialize, Serialize};

use super::Curve;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Distortion,
    Compressor,
    Reverb,
    Delay,
    Chorus,
    Filter,
}

fn full_amount() -> Curve {
    Curve::constant(1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDefinition {
    pub id: String,
    pub kind: EffectKind,
    /// Wet amount over the placement, 0.0 -> 1.0.
    #[serde(default = "full_amount")]
    pub amount: Curve,
    /// Compressor threshold, linear amplitude.
    #[serde(default)]
    pub threshold: Option<f32>,
    /// Compressor ratio, N:1.
    #[serde(default)]
    pub ratio: Option<f32>,
}

/// A definition with its parameters sanitized, ready for the audio thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct EffectProcessor {
    pub kind: EffectKind,
    pub amount: Curve,
    threshold: f32,
    ratio: f32,
}

impl EffectProcessor {
    pub fn new(definition: &EffectDefinition) -> Self {
        let threshold = definition
            .threshold
            .filter(|t| t.is_finite())
            .map_or(0.5, |t| t.clamp(0.01, 1.0));
        let ratio = definition
            .ratio
            .filter(|r| r.is_finite())
            .map_or(4.0, |r| r.clamp(1.0, 100.0));
        Self {
            kind: definition.kind,
            amount: definition.amount,
            threshold,
            ratio,
        }
    }

    /// Processes one sample at the given wet amount.
    pub fn process(&self, x: f32, amount: f32) -> f32 {
        let amount = if amount.is_finite() {
            amount.clamp(0.0, 1.0)
        } else {
            0.0
        };
        match self.kind {
            EffectKind::Distortion => {
                let drive = 1.0 + 20.0 * amount;
                let shaped = x * drive / (1.0 + (x * drive).abs());
                x * (1.0 - amount) + shaped * amount
            }
            EffectKind::Compressor => {
                let magnitude = x.abs();
                let compressed = if magnitude > self.threshold {
                    (self.threshold + (magnitude - self.threshold) / self.ratio) * x.signum()
                } else {
                    x
                };
                x * (1.0 - amount) + compressed * amount
            }
            // Gain stand-ins; there is no delay line or convolution behind these.
            EffectKind::Reverb => x * (1.0 + 0.25 * amount),
            EffectKind::Delay => x * (1.0 + 0.2 * amount),
            EffectKind::Chorus => x * (1.0 + 0.15 * amount),
            EffectKind::Filter => x * (1.0 - 0.5 * amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(kind: EffectKind) -> EffectProcessor {
        EffectProcessor::new(&EffectDefinition {
            id: "fx".into(),
            kind,
            amount: full_amount(),
            threshold: None,
            ratio: None,
        })
    }

    #[test]
    fn zero_amount_is_transparent() {
        for kind in [
            EffectKind::Distortion,
            EffectKind::Compressor,
            EffectKind::Reverb,
            EffectKind::Delay,
            EffectKind::Chorus,
            EffectKind::Filter,
        ] {
            assert_eq!(processor(kind).process(0.7, 0.0), 0.7, "{kind:?}");
        }
    }

    #[test]
    fn distortion_soft_clips() {
        let fx = processor(EffectKind::Distortion);
        let out = fx.process(0.9, 1.0);
        let expected = 0.9 * 21.0 / (1.0 + 0.9 * 21.0);
        assert!((out - expected).abs() < 1e-6);
        assert!(fx.process(10.0, 1.0) < 1.0);
    }

    #[test]
    fn compressor_reduces_only_above_threshold() {
        let fx = processor(EffectKind::Compressor);
        assert_eq!(fx.process(0.3, 1.0), 0.3);
        assert!((fx.process(0.9, 1.0) - 0.6).abs() < 1e-6);
        assert!((fx.process(-0.9, 1.0) + 0.6).abs() < 1e-6);
    }

    #[test]
    fn bad_compressor_parameters_fall_back() {
        let fx = EffectProcessor::new(&EffectDefinition {
            id: "c".into(),
            kind: EffectKind::Compressor,
            amount: full_amount(),
            threshold: Some(f32::NAN),
            ratio: Some(0.0),
        });
        assert_eq!(fx.threshold, 0.5);
        assert_eq!(fx.ratio, 1.0);
    }
}
