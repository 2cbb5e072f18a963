use serde::{Deserialize, Serialize};

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 500.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    Playing,
    #[default]
    Stopped,
    Paused,
}

/// Tempo, play state and the sample clock within the current loop.
///
/// All beat/sample conversions go through here. The loop length is derived
/// from full precision each time it is refreshed and floored once, so loop
/// `n` always starts `n * loop_length_samples()` samples after loop 0.
#[derive(Debug, Clone)]
pub struct Transport {
    bpm: f64,
    sample_rate: f64,
    state: TransportState,
    current_time: u64,
    loop_index: u64,
    loop_beats: f64,
    loop_length: u64,
}

impl Transport {
    pub fn new(sample_rate: u32, bpm: f64) -> Self {
        let mut transport = Self {
            bpm: clamp_bpm(bpm),
            sample_rate: f64::from(sample_rate.max(1)),
            state: TransportState::Stopped,
            current_time: 0,
            loop_index: 0,
            loop_beats: crate::timing::DEFAULT_METER,
            loop_length: 1,
        };
        transport.refresh_loop_length();
        transport
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Samples since the start of the current loop.
    pub fn current_time(&self) -> u64 {
        self.current_time
    }

    pub fn loop_index(&self) -> u64 {
        self.loop_index
    }

    pub fn loop_beats(&self) -> f64 {
        self.loop_beats
    }

    pub fn loop_length_samples(&self) -> u64 {
        self.loop_length
    }

    pub fn beats_per_second(&self) -> f64 {
        self.bpm / 60.0
    }

    pub fn samples_per_beat(&self) -> f64 {
        self.sample_rate / self.beats_per_second()
    }

    pub fn beats_to_samples(&self, beats: f64) -> f64 {
        beats * self.samples_per_beat()
    }

    pub fn samples_to_beats(&self, samples: f64) -> f64 {
        samples / self.samples_per_beat()
    }

    pub fn millis_to_beats(&self, millis: f64) -> f64 {
        millis / 1000.0 * self.beats_per_second()
    }

    /// Beat position within the current loop.
    pub fn current_beat(&self) -> f64 {
        self.samples_to_beats(self.current_time as f64)
    }

    /// Beat position counting every completed loop.
    pub fn absolute_beat(&self) -> f64 {
        self.loop_index as f64 * self.loop_beats + self.current_beat()
    }

    /// Changes the loop length in beats. Takes effect immediately.
    pub fn set_loop_beats(&mut self, beats: f64) {
        if beats.is_finite() && beats > 0.0 {
            self.loop_beats = beats;
        }
        self.refresh_loop_length();
    }

    /// Recomputes the loop length in samples from the exact tempo.
    pub fn refresh_loop_length(&mut self) {
        let exact = self.loop_beats * 60.0 / self.bpm * self.sample_rate;
        self.loop_length = (exact.floor() as u64).max(1);
        if self.current_time >= self.loop_length {
            self.current_time = self.loop_length - 1;
        }
    }

    /// Changes tempo while keeping the current beat position.
    pub fn set_tempo(&mut self, bpm: f64) {
        let beat = self.current_beat();
        self.bpm = clamp_bpm(bpm);
        self.refresh_loop_length();
        self.current_time = self.beat_to_loop_sample(beat);
    }

    pub fn set_state(&mut self, state: TransportState) {
        self.state = state;
    }

    /// Moves to an absolute beat position.
    pub fn locate(&mut self, position: f64) {
        let position = if position.is_finite() {
            position.max(0.0)
        } else {
            0.0
        };
        let loop_index = (position / self.loop_beats).floor();
        self.loop_index = loop_index as u64;
        self.current_time = self.beat_to_loop_sample(position - loop_index * self.loop_beats);
    }

    /// Rewinds to the very start.
    pub fn rewind(&mut self) {
        self.current_time = 0;
        self.loop_index = 0;
    }

    pub fn advance(&mut self) {
        self.advance_by(1);
    }

    /// Moves the clock forward while playing. Never moves past the loop end;
    /// call [`Transport::wrap_if_at_boundary`] to start the next loop.
    pub fn advance_by(&mut self, samples: u64) {
        if self.is_playing() {
            self.current_time = (self.current_time + samples).min(self.loop_length);
        }
    }

    pub fn samples_until_boundary(&self) -> u64 {
        self.loop_length.saturating_sub(self.current_time)
    }

    /// Starts the next loop when the clock has reached the end of this one.
    pub fn wrap_if_at_boundary(&mut self) -> bool {
        if self.current_time < self.loop_length {
            return false;
        }
        self.current_time = 0;
        self.loop_index += 1;
        true
    }

    fn beat_to_loop_sample(&self, beat: f64) -> u64 {
        let sample = self.beats_to_samples(beat).floor();
        if sample.is_finite() && sample > 0.0 {
            (sample as u64).min(self.loop_length - 1)
        } else {
            0
        }
    }
}

fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() {
        bpm.clamp(MIN_BPM, MAX_BPM)
    } else {
        120.0
    }
}
