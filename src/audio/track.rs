use std::collections::HashMap;

use crate::events::VoiceKey;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackState {
    pub volume: f32,
    /// -1.0 (left) -> 1.0 (right)
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
}

impl Default for TrackState {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
        }
    }
}

/// Mix parameters after combining every state that applies to a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedMix {
    pub volume: f32,
    pub pan: f32,
    pub silenced: bool,
}

/// Volume, pan, mute and solo per engine track id. Only commands write here.
#[derive(Debug, Default)]
pub struct TrackStateRegistry {
    states: HashMap<String, TrackState>,
    soloed: usize,
}

impl TrackStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, track_id: &str) -> Option<&TrackState> {
        self.states.get(track_id)
    }

    pub fn insert(&mut self, track_id: &str, state: TrackState) {
        self.states.insert(track_id.to_string(), sanitize(state));
        self.recount();
    }

    pub fn set_volume(&mut self, track_id: &str, volume: f32) {
        self.entry(track_id).volume = sanitize_volume(volume);
    }

    pub fn set_pan(&mut self, track_id: &str, pan: f32) {
        self.entry(track_id).pan = sanitize_pan(pan);
    }

    pub fn set_mute(&mut self, track_id: &str, mute: bool) {
        self.entry(track_id).mute = mute;
    }

    pub fn set_solo(&mut self, track_id: &str, solo: bool) {
        self.entry(track_id).solo = solo;
        self.recount();
    }

    pub fn remove(&mut self, track_id: &str) -> Option<TrackState> {
        let removed = self.states.remove(track_id);
        self.recount();
        removed
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.soloed = 0;
    }

    pub fn any_solo(&self) -> bool {
        self.soloed > 0
    }

    /// Solo beats mute: with any solo active, only soloed tracks sound.
    pub fn is_silenced(&self, track_id: &str) -> bool {
        let state = self.states.get(track_id).copied().unwrap_or_default();
        silenced(state.mute, state.solo, self.any_solo())
    }

    /// Combines the voice's own state, its instrument's state and the timeline
    /// track its pattern is placed on.
    pub fn resolve(&self, key: &VoiceKey, timeline_track: Option<&str>) -> ResolvedMix {
        let mut ids: [Option<&str>; 3] = [Some(key.id()), None, None];
        if key.pattern_id().is_some() {
            ids[1] = Some(key.instrument_id());
        }
        ids[2] = timeline_track.filter(|t| !ids[..2].contains(&Some(*t)));

        let mut volume = 1.0;
        let mut pan = 0.0;
        let mut mute = false;
        let mut solo = false;
        for state in ids.iter().flatten().filter_map(|id| self.states.get(*id)) {
            volume *= state.volume;
            pan += state.pan;
            mute |= state.mute;
            solo |= state.solo;
        }
        ResolvedMix {
            volume,
            pan: pan.clamp(-1.0, 1.0),
            silenced: silenced(mute, solo, self.any_solo()),
        }
    }

    fn entry(&mut self, track_id: &str) -> &mut TrackState {
        self.states.entry(track_id.to_string()).or_default()
    }

    fn recount(&mut self) {
        self.soloed = self.states.values().filter(|s| s.solo).count();
    }
}

fn silenced(mute: bool, solo: bool, any_solo: bool) -> bool {
    if any_solo { !solo } else { mute }
}

fn sanitize(state: TrackState) -> TrackState {
    TrackState {
        volume: sanitize_volume(state.volume),
        pan: sanitize_pan(state.pan),
        ..state
    }
}

fn sanitize_volume(volume: f32) -> f32 {
    if volume.is_finite() {
        volume.clamp(0.0, 4.0)
    } else {
        1.0
    }
}

fn sanitize_pan(pan: f32) -> f32 {
    if pan.is_finite() {
        pan.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
