use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audio::AdsrOverride;

const PATTERN_PREFIX: &str = "pattern:";

/// Identifier echoed back in `PlaybackUpdate` so the UI can highlight what fired.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl EventId {
    /// Placeholder for events that have not been given an id yet.
    pub const UNASSIGNED: EventId = EventId(0);
}

/// A note in beat time. Velocity 0 is a note-off marker for the same
/// voice and pitch and never sounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    #[serde(default)]
    pub id: EventId,
    /// Beats
    pub time: f64,
    pub pitch: u8,
    /// 0.0 -> 1.0
    pub velocity: f32,
    pub instrument_id: String,
    #[serde(default)]
    pub pattern_id: Option<String>,
    #[serde(default)]
    pub choke: bool,
    #[serde(default)]
    pub adsr: Option<AdsrOverride>,
}

impl NoteEvent {
    pub fn new(time: f64, pitch: u8, velocity: f32, instrument_id: impl Into<String>) -> Self {
        Self {
            id: EventId::UNASSIGNED,
            time,
            pitch,
            velocity,
            instrument_id: instrument_id.into(),
            pattern_id: None,
            choke: false,
            adsr: None,
        }
    }

    pub fn in_pattern(mut self, pattern_id: impl Into<String>) -> Self {
        self.pattern_id = Some(pattern_id.into());
        self
    }

    pub fn is_note_off(&self) -> bool {
        self.velocity <= 0.0
    }

    pub fn voice_key(&self) -> VoiceKey {
        match &self.pattern_id {
            Some(pattern_id) => VoiceKey::in_pattern(pattern_id, &self.instrument_id),
            None => VoiceKey::standalone(&self.instrument_id),
        }
    }
}

/// Engine track id: either a bare instrument id or
/// `pattern:<patternId>:<instrumentId>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoiceKey {
    id: String,
    pattern_id: Option<String>,
    instrument_id: String,
}

impl VoiceKey {
    pub fn standalone(instrument_id: &str) -> Self {
        Self {
            id: instrument_id.to_string(),
            pattern_id: None,
            instrument_id: instrument_id.to_string(),
        }
    }

    pub fn in_pattern(pattern_id: &str, instrument_id: &str) -> Self {
        Self {
            id: format!("{PATTERN_PREFIX}{pattern_id}:{instrument_id}"),
            pattern_id: Some(pattern_id.to_string()),
            instrument_id: instrument_id.to_string(),
        }
    }

    /// Anything that does not look like a composite id is a standalone one.
    pub fn parse(track_id: &str) -> Self {
        track_id
            .strip_prefix(PATTERN_PREFIX)
            .and_then(|rest| rest.split_once(':'))
            .filter(|(pattern_id, instrument_id)| {
                !pattern_id.is_empty() && !instrument_id.is_empty()
            })
            .map(|(pattern_id, instrument_id)| Self::in_pattern(pattern_id, instrument_id))
            .unwrap_or_else(|| Self::standalone(track_id))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pattern_id(&self) -> Option<&str> {
        self.pattern_id.as_deref()
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }
}

impl fmt::Display for VoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Index into [`KeyTable`]; lets the audio thread refer to voices without
/// hashing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub u32);

impl KeyId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Default)]
pub struct KeyTable {
    keys: Vec<VoiceKey>,
    index: HashMap<VoiceKey, KeyId>,
}

impl KeyTable {
    pub fn intern(&mut self, key: VoiceKey) -> KeyId {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = KeyId(self.keys.len() as u32);
        self.keys.push(key.clone());
        self.index.insert(key, id);
        id
    }

    pub fn get(&self, id: KeyId) -> Option<&VoiceKey> {
        self.keys.get(id.index())
    }

    pub fn lookup(&self, key: &VoiceKey) -> Option<KeyId> {
        self.index.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.index.clear();
    }
}

#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub event: NoteEvent,
    pub key: KeyId,
}

/// Every known event, grouped by the engine track id that owns it.
#[derive(Debug, Default)]
pub struct EventStore {
    keys: KeyTable,
    tracks: HashMap<String, Vec<StoredEvent>>,
    next_id: u64,
}

/// Flattened events get ids from a range the control layer is unlikely to use.
const GENERATED_ID_BASE: u64 = 1 << 48;

impl EventStore {
    pub fn new() -> Self {
        Self {
            keys: KeyTable::default(),
            tracks: HashMap::new(),
            next_id: GENERATED_ID_BASE,
        }
    }

    pub fn keys(&self) -> &KeyTable {
        &self.keys
    }

    pub fn intern(&mut self, key: VoiceKey) -> KeyId {
        self.keys.intern(key)
    }

    /// Replaces one track's events; other tracks are untouched.
    pub fn replace_track(&mut self, track_id: &str, events: Vec<NoteEvent>) {
        let mut stored = Vec::with_capacity(events.len());
        for mut event in events {
            if !event.time.is_finite() || event.time < 0.0 {
                tracing::warn!(track_id, time = event.time, "dropping event with invalid time");
                continue;
            }
            if event.id == EventId::UNASSIGNED {
                event.id = EventId(self.next_id);
                self.next_id += 1;
            }
            let key = self.keys.intern(event.voice_key());
            stored.push(StoredEvent { event, key });
        }
        stored.sort_by(|a, b| a.event.time.total_cmp(&b.event.time));
        self.tracks.insert(track_id.to_string(), stored);
    }

    /// Groups events by their own voice key and stores each group.
    pub fn replace_all(&mut self, events: Vec<NoteEvent>) {
        self.tracks.clear();
        let mut grouped: HashMap<String, Vec<NoteEvent>> = HashMap::new();
        for event in events {
            grouped
                .entry(event.voice_key().id().to_string())
                .or_default()
                .push(event);
        }
        for (track_id, events) in grouped {
            self.replace_track(&track_id, events);
        }
    }

    pub fn remove_track(&mut self, track_id: &str) -> Option<Vec<StoredEvent>> {
        self.tracks.remove(track_id)
    }

    pub fn track(&self, track_id: &str) -> Option<&[StoredEvent]> {
        self.tracks.get(track_id).map(Vec::as_slice)
    }

    pub fn has_track(&self, track_id: &str) -> bool {
        self.tracks.contains_key(track_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredEvent> {
        self.tracks.values().flatten()
    }

    /// Latest event time, used to size a timeline that has no explicit length.
    pub fn last_beat(&self) -> f64 {
        self.iter().map(|e| e.event.time).fold(0.0, f64::max)
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.tracks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
