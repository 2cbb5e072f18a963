use serde::{Deserialize, Serialize};

use super::instrument::param;

/// Time constant shared by the exponential segments: each one ends at e^-5 of its span.
const CURVE: f32 = 5.0;
/// Seconds
const MIN_FADE_TAIL: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adsr {
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub decay: f32,
    /// 0.0 -> 1.0
    pub sustain: f32,
    /// Seconds
    pub release: f32,
}

impl Adsr {
    pub fn with_override(self, over: &AdsrOverride) -> Self {
        Self {
            attack: param(over.attack, self.attack, 0.0, 10.0),
            decay: param(over.decay, self.decay, 0.0, 10.0),
            sustain: param(over.sustain, self.sustain, 0.0, 1.0),
            release: param(over.release, self.release, 0.0, 10.0),
        }
    }
}

/// Per-node or per-event ADSR tweaks layered over the instrument's settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdsrOverride {
    pub attack: Option<f32>,
    pub decay: Option<f32>,
    pub sustain: Option<f32>,
    pub release: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
    FadeOut,
}

/// Amplitude envelope: cosine attack, exponential decay and release, then a
/// linear fade tail so the voice always ends at zero.
#[derive(Debug, Clone)]
pub struct AmpEnvelope {
    adsr: Adsr,
    sample_rate: f32,
    one_shot: bool,
    hold_samples: Option<u64>,
    stage: EnvelopeStage,
    stage_len: u64,
    counter: u64,
    held: u64,
    level: f32,
    /// Level the current release or fade started from.
    from: f32,
}

impl AmpEnvelope {
    /// `one_shot` envelopes release on their own once decay ends.
    pub fn new(adsr: Adsr, one_shot: bool, hold: Option<f32>, sample_rate: f32) -> Self {
        let mut env = Self {
            adsr,
            sample_rate,
            one_shot,
            hold_samples: None,
            stage: EnvelopeStage::Idle,
            stage_len: 0,
            counter: 0,
            held: 0,
            level: 0.0,
            from: 0.0,
        };
        env.set_hold(hold);
        env
    }

    pub fn set_adsr(&mut self, adsr: Adsr) {
        self.adsr = adsr;
    }

    pub fn set_hold(&mut self, hold: Option<f32>) {
        self.hold_samples = hold.map(|h| self.samples(h).max(1));
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    pub fn gate_on(&mut self) {
        self.level = 0.0;
        self.held = 0;
        self.enter(EnvelopeStage::Attack, self.adsr.attack);
    }

    /// Releases from whatever level the envelope holds right now.
    pub fn gate_off(&mut self) {
        match self.stage {
            EnvelopeStage::Attack | EnvelopeStage::Decay | EnvelopeStage::Sustain => {
                self.from = self.level;
                self.enter(EnvelopeStage::Release, self.adsr.release);
            }
            EnvelopeStage::Idle | EnvelopeStage::Release | EnvelopeStage::FadeOut => {}
        }
    }

    /// Skips release and fades linearly to silence over `seconds`.
    pub fn fade_out(&mut self, seconds: f32) {
        if self.stage == EnvelopeStage::Idle {
            return;
        }
        self.from = self.level;
        self.enter(EnvelopeStage::FadeOut, seconds);
    }

    pub fn next_level(&mut self) -> f32 {
        if self.stage != EnvelopeStage::Idle {
            self.held += 1;
        }
        match self.stage {
            EnvelopeStage::Idle => self.level = 0.0,
            EnvelopeStage::Attack => {
                if self.stage_len == 0 {
                    self.level = 1.0;
                    self.enter(EnvelopeStage::Decay, self.adsr.decay);
                } else {
                    let t = self.progress();
                    self.level = 0.5 - 0.5 * (std::f32::consts::PI * t).cos();
                    if self.tick() {
                        self.level = 1.0;
                        self.enter(EnvelopeStage::Decay, self.adsr.decay);
                    }
                }
            }
            EnvelopeStage::Decay => {
                let sustain = self.adsr.sustain;
                if self.stage_len == 0 {
                    self.level = sustain;
                    self.finish_decay();
                } else {
                    let t = self.progress();
                    self.level = sustain + (1.0 - sustain) * (-CURVE * t).exp();
                    if self.tick() {
                        self.finish_decay();
                    }
                }
            }
            EnvelopeStage::Sustain => {
                if let Some(hold) = self.hold_samples {
                    if self.held >= hold {
                        self.gate_off();
                    }
                }
            }
            EnvelopeStage::Release => {
                if self.stage_len == 0 {
                    self.start_fade();
                } else {
                    let t = self.progress();
                    self.level = self.from * (-CURVE * t).exp();
                    if self.tick() {
                        self.start_fade();
                    }
                }
            }
            EnvelopeStage::FadeOut => {
                let t = self.progress();
                self.level = self.from * (1.0 - t);
                if self.tick() {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }
        self.level
    }

    fn finish_decay(&mut self) {
        // Sustain holds the level decay actually reached, not the nominal one.
        if self.one_shot || self.adsr.sustain <= 0.001 {
            self.from = self.level;
            self.enter(EnvelopeStage::Release, self.adsr.release);
        } else {
            self.stage = EnvelopeStage::Sustain;
        }
    }

    fn start_fade(&mut self) {
        self.from = self.level;
        let tail = (self.adsr.release * 0.25).max(MIN_FADE_TAIL);
        self.enter(EnvelopeStage::FadeOut, tail);
    }

    fn enter(&mut self, stage: EnvelopeStage, seconds: f32) {
        self.stage = stage;
        self.stage_len = self.samples(seconds);
        self.counter = 0;
    }

    fn progress(&self) -> f32 {
        self.counter as f32 / self.stage_len.max(1) as f32
    }

    /// Advances within the stage; true once the stage is complete.
    fn tick(&mut self) -> bool {
        self.counter += 1;
        self.counter >= self.stage_len
    }

    fn samples(&self, seconds: f32) -> u64 {
        (seconds.max(0.0) * self.sample_rate) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 1000.0;

    fn adsr(attack: f32, decay: f32, sustain: f32, release: f32) -> Adsr {
        Adsr {
            attack,
            decay,
            sustain,
            release,
        }
    }

    fn run(env: &mut AmpEnvelope, samples: usize) -> f32 {
        let mut last = 0.0;
        for _ in 0..samples {
            last = env.next_level();
        }
        last
    }

    #[test]
    fn starts_idle_and_silent() {
        let mut env = AmpEnvelope::new(adsr(0.01, 0.1, 0.5, 0.1), false, None, SR);
        assert!(env.is_idle());
        assert_eq!(env.next_level(), 0.0);
    }

    #[test]
    fn attack_follows_cosine_and_reaches_one() {
        let mut env = AmpEnvelope::new(adsr(0.1, 0.1, 0.5, 0.1), false, None, SR);
        env.gate_on();
        let first = env.next_level();
        assert_eq!(first, 0.0);
        let halfway = run(&mut env, 49);
        assert!((halfway - 0.5).abs() < 0.05, "halfway level {halfway}");
        run(&mut env, 51);
        assert_eq!(env.stage(), EnvelopeStage::Decay);
        assert_eq!(env.level(), 1.0);
    }

    #[test]
    fn decay_settles_near_sustain() {
        let mut env = AmpEnvelope::new(adsr(0.0, 0.1, 0.6, 0.1), false, None, SR);
        env.gate_on();
        run(&mut env, 200);
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        assert!((env.level() - 0.6).abs() < 0.01);
    }

    #[test]
    fn early_release_starts_from_current_level() {
        let mut env = AmpEnvelope::new(adsr(0.0, 0.5, 0.2, 0.1), false, None, SR);
        env.gate_on();
        let before = run(&mut env, 50);
        env.gate_off();
        let after = env.next_level();
        assert_eq!(env.stage(), EnvelopeStage::Release);
        assert!((after - before).abs() < 0.01, "{before} -> {after}");
    }

    #[test]
    fn release_is_followed_by_fade_tail_to_zero() {
        let mut env = AmpEnvelope::new(adsr(0.0, 0.0, 1.0, 0.1), false, None, SR);
        env.gate_on();
        run(&mut env, 10);
        env.gate_off();
        run(&mut env, 100);
        assert_eq!(env.stage(), EnvelopeStage::FadeOut);
        assert!(env.level() > 0.0);
        // tail is at least 100 ms
        run(&mut env, 99);
        assert_eq!(env.stage(), EnvelopeStage::FadeOut);
        run(&mut env, 2);
        assert!(env.is_idle());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn one_shot_releases_without_gate_off() {
        let mut env = AmpEnvelope::new(adsr(0.001, 0.05, 0.5, 0.02), true, None, SR);
        env.gate_on();
        run(&mut env, 2000);
        assert!(env.is_idle());
    }

    #[test]
    fn hold_releases_sustained_note() {
        let mut env = AmpEnvelope::new(adsr(0.0, 0.0, 0.8, 0.01), false, Some(0.05), SR);
        env.gate_on();
        run(&mut env, 40);
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        run(&mut env, 20);
        assert_ne!(env.stage(), EnvelopeStage::Sustain);
    }

    #[test]
    fn level_stays_in_range_and_continuous() {
        let mut env = AmpEnvelope::new(adsr(0.02, 0.05, 0.5, 0.2), false, None, SR);
        env.gate_on();
        let mut prev = 0.0f32;
        for i in 0..1500 {
            if i == 300 {
                env.gate_off();
            }
            let level = env.next_level();
            assert!((0.0..=1.0).contains(&level));
            assert!((level - prev).abs() < 0.1, "jump at {i}: {prev} -> {level}");
            prev = level;
        }
    }

    #[test]
    fn fade_out_cuts_a_long_release_short() {
        let mut env = AmpEnvelope::new(adsr(0.0, 0.0, 1.0, 5.0), false, None, SR);
        env.gate_on();
        run(&mut env, 10);
        env.fade_out(0.005);
        assert_eq!(env.stage(), EnvelopeStage::FadeOut);
        run(&mut env, 5);
        assert!(env.is_idle());
    }

    #[test]
    fn override_replaces_only_given_fields() {
        let base = adsr(0.01, 0.2, 0.5, 0.3);
        let merged = base.with_override(&AdsrOverride {
            release: Some(1.0),
            ..Default::default()
        });
        assert_eq!(merged.release, 1.0);
        assert_eq!(merged.attack, 0.01);
    }
}
