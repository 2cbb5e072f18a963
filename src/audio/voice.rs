use super::envelope::{Adsr, AdsrOverride, AmpEnvelope, EnvelopeStage};
use super::synth::{Synth, SynthEngine};
use super::{InstrumentSettings, InstrumentType, midi_to_freq};

/// Seconds a replaced voice's last sample takes to fade out.
const HANDOVER_FADE: f32 = 0.010;

/// Blends a frozen sample into the live signal.
#[derive(Debug, Clone, Copy)]
struct Crossfade {
    from: f32,
    position: u32,
    length: u32,
}

impl Crossfade {
    fn new(from: f32, seconds: f32, sample_rate: f32) -> Self {
        Self {
            from,
            position: 0,
            length: ((seconds * sample_rate) as u32).max(1),
        }
    }

    fn mix(&mut self, fresh: f32) -> (f32, bool) {
        let t = self.position as f32 / self.length as f32;
        self.position += 1;
        (self.from * (1.0 - t) + fresh * t, self.position >= self.length)
    }
}

/// One sounding instrument: a synth, its amplitude envelope and the
/// retrigger crossfade. There is one voice per engine track id.
#[derive(Debug, Clone)]
pub struct Voice {
    kind: InstrumentType,
    sample_rate: f32,
    synth: SynthEngine,
    envelope: AmpEnvelope,
    adsr: Adsr,
    tune: f32,
    velocity: f32,
    pitch: u8,
    freq: f32,
    active: bool,
    was_active: bool,
    crossfade: Option<Crossfade>,
    last_output: f32,
    /// Semitones from pitch automation.
    pitch_offset: f32,
    cutoff_scale: f32,
}

impl Voice {
    pub fn new(
        kind: InstrumentType,
        settings: &InstrumentSettings,
        sample_rate: f32,
        seed: u64,
    ) -> Self {
        let adsr = settings.adsr(kind);
        let hold = if kind.is_percussive() {
            None
        } else {
            settings.hold()
        };
        let pitch = 60;
        let tune = settings.tune();
        Self {
            kind,
            sample_rate,
            synth: SynthEngine::new(kind, settings, sample_rate, seed),
            envelope: AmpEnvelope::new(adsr, kind.is_percussive(), hold, sample_rate),
            adsr,
            tune,
            velocity: 0.0,
            pitch,
            freq: midi_to_freq(pitch as f32 + tune),
            active: false,
            was_active: false,
            crossfade: None,
            last_output: 0.0,
            pitch_offset: 0.0,
            cutoff_scale: 1.0,
        }
    }

    /// Builds the voice that takes over from `previous` after an instrument
    /// type change, fading the old voice's last sample out.
    pub fn replacing(
        previous: &Voice,
        kind: InstrumentType,
        settings: &InstrumentSettings,
        seed: u64,
    ) -> Self {
        let mut voice = Self::new(kind, settings, previous.sample_rate, seed);
        if previous.active && previous.last_output != 0.0 {
            voice.crossfade = Some(Crossfade::new(
                previous.last_output,
                HANDOVER_FADE,
                voice.sample_rate,
            ));
            voice.active = true;
            voice.last_output = previous.last_output;
        }
        voice
    }

    pub fn kind(&self) -> InstrumentType {
        self.kind
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True when the most recent trigger landed on a voice that was still sounding.
    pub fn was_active(&self) -> bool {
        self.was_active
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.envelope.stage()
    }

    pub fn last_output(&self) -> f32 {
        self.last_output
    }

    pub fn trigger(&mut self, velocity: f32, pitch: u8, adsr: Option<&AdsrOverride>) {
        if velocity <= 0.0 {
            self.release();
            return;
        }
        self.was_active = self.active;
        if self.active {
            self.crossfade = Some(Crossfade::new(
                self.last_output,
                self.kind.retrigger_crossfade(),
                self.sample_rate,
            ));
        }
        self.velocity = velocity.min(1.0);
        self.pitch = pitch;
        self.update_freq();
        self.envelope.set_adsr(match adsr {
            Some(over) => self.adsr.with_override(over),
            None => self.adsr,
        });
        self.synth.note_on(self.freq);
        self.envelope.gate_on();
        self.active = true;
    }

    pub fn release(&mut self) {
        self.envelope.gate_off();
    }

    /// Cuts the voice off over the retrigger crossfade time.
    pub fn choke(&mut self) {
        self.envelope.fade_out(self.kind.retrigger_crossfade());
    }

    pub fn update_settings(&mut self, settings: &InstrumentSettings) {
        self.adsr = settings.adsr(self.kind);
        self.envelope.set_adsr(self.adsr);
        if !self.kind.is_percussive() {
            self.envelope.set_hold(settings.hold());
        }
        self.tune = settings.tune();
        self.update_freq();
        self.synth.update_settings(settings);
    }

    /// Applies pitch (semitones) and filter (cutoff multiplier) automation.
    pub fn set_modulation(&mut self, pitch_offset: f32, cutoff_scale: f32) {
        let pitch_offset = if pitch_offset.is_finite() {
            pitch_offset.clamp(-48.0, 48.0)
        } else {
            0.0
        };
        self.cutoff_scale = if cutoff_scale.is_finite() {
            cutoff_scale.clamp(0.0, 16.0)
        } else {
            1.0
        };
        if pitch_offset != self.pitch_offset {
            self.pitch_offset = pitch_offset;
            self.update_freq();
        }
    }

    pub fn process(&mut self) -> f32 {
        if !self.active {
            return 0.0;
        }
        let level = self.envelope.next_level();
        let raw = self.synth.next_sample(self.freq, self.cutoff_scale);
        let mut out = raw * level * self.velocity;
        if let Some(fade) = &mut self.crossfade {
            let (mixed, done) = fade.mix(out);
            out = mixed;
            if done {
                self.crossfade = None;
            }
        }
        if !out.is_finite() {
            out = 0.0;
        }
        self.last_output = out;
        if self.envelope.is_idle() && self.crossfade.is_none() {
            self.active = false;
            self.was_active = false;
            self.last_output = 0.0;
        }
        out
    }

    fn update_freq(&mut self) {
        self.freq = midi_to_freq(self.pitch as f32 + self.tune + self.pitch_offset);
    }
}
