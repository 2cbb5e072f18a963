use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveShape {
    #[default]
    Linear,
    /// Slow start: `t²`
    Exponential,
    /// Fast start: `1 - (1 - t)²`
    Logarithmic,
}

impl CurveShape {
    pub fn apply(self, t: f32) -> f32 {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        match self {
            CurveShape::Linear => t,
            CurveShape::Exponential => t * t,
            CurveShape::Logarithmic => 1.0 - (1.0 - t) * (1.0 - t),
        }
    }
}

/// A parameter ramp from `start` to `end` over a placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub start: f32,
    pub end: f32,
    #[serde(default)]
    pub shape: CurveShape,
}

impl Curve {
    pub fn constant(value: f32) -> Self {
        Self {
            start: value,
            end: value,
            shape: CurveShape::Linear,
        }
    }

    pub fn value_at(&self, progress: f32) -> f32 {
        self.start + (self.end - self.start) * self.shape.apply(progress)
    }
}
