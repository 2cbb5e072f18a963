use std::f32::consts::FRAC_PI_4;

/// Constant-power pan law. -1.0 is hard left, 1.0 hard right.
pub fn pan_to_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Places one voice sample in the stereo field.
pub fn mix_sample(raw: f32, volume: f32, pan: f32) -> (f32, f32) {
    let (left, right) = pan_to_gains(pan);
    let scaled = raw * volume;
    (scaled * left, scaled * right)
}

/// Stereo accumulator for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    pub fn add(&mut self, (left, right): (f32, f32)) {
        self.left += left;
        self.right += right;
    }

    /// Applies master gain and clamps to the legal output range.
    pub fn finish(self, master_gain: f32) -> Frame {
        Frame {
            left: clamp_output(self.left * master_gain),
            right: clamp_output(self.right * master_gain),
        }
    }

    pub fn mono(self) -> f32 {
        (self.left + self.right) * 0.5
    }

    /// Writes this frame into an interleaved host frame of any width.
    pub fn write_to(self, out: &mut [f32]) {
        match out {
            [] => {}
            [mono] => *mono = self.mono(),
            [left, right, rest @ ..] => {
                *left = self.left;
                *right = self.right;
                rest.fill(0.0);
            }
        }
    }
}

fn clamp_output(sample: f32) -> f32 {
    if sample.is_finite() {
        sample.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_pan_is_equal_power() {
        let (left, right) = mix_sample(1.0, 0.5, 0.0);
        assert!((left - 0.3536).abs() < 1e-4);
        assert!((right - 0.3536).abs() < 1e-4);
    }

    #[test]
    fn hard_pans() {
        let (left, right) = pan_to_gains(-1.0);
        assert!((left - 1.0).abs() < 1e-6 && right.abs() < 1e-6);
        let (left, right) = pan_to_gains(1.0);
        assert!(left.abs() < 1e-6 && (right - 1.0).abs() < 1e-6);
    }

    #[test]
    fn power_is_constant_across_the_field() {
        for i in 0..=20 {
            let (l, r) = pan_to_gains(-1.0 + i as f32 * 0.1);
            assert!((l * l + r * r - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn output_is_clamped() {
        let frame = Frame {
            left: 5.0,
            right: f32::NAN,
        }
        .finish(0.5);
        assert_eq!(frame.left, 1.0);
        assert_eq!(frame.right, 0.0);
    }

    #[test]
    fn host_layouts() {
        let frame = Frame {
            left: 0.2,
            right: 0.4,
        };
        let mut mono = [0.0];
        frame.write_to(&mut mono);
        assert!((mono[0] - 0.3).abs() < 1e-6);

        let mut quad = [9.0; 4];
        frame.write_to(&mut quad);
        assert_eq!(quad, [0.2, 0.4, 0.0, 0.0]);
    }
}
