use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::{
    audio::{InstrumentSettings, InstrumentType, TrackState},
    automation::{EffectDefinition, EnvelopeDefinition, Placement},
    error::ProjectError,
    events::NoteEvent,
    timing::{PatternNode, ViewMode},
};

const BAR_BEATS: f64 = 4.0;

fn unity() -> f32 {
    1.0
}

fn default_bpm() -> f64 {
    120.0
}

/// One instrument as the engine sees it. `id` is a standalone instrument id
/// or a composite `pattern:<patternId>:<instrumentId>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub id: String,
    pub instrument_type: InstrumentType,
    #[serde(default)]
    pub settings: InstrumentSettings,
    #[serde(default = "unity")]
    pub volume: f32,
    #[serde(default)]
    pub pan: f32,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub pattern_tree: Option<PatternNode>,
}

impl TrackDescriptor {
    pub fn new(id: impl Into<String>, instrument_type: InstrumentType) -> Self {
        Self {
            id: id.into(),
            instrument_type,
            settings: InstrumentSettings::default(),
            volume: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
            pattern_tree: None,
        }
    }

    pub fn with_pattern(mut self, tree: PatternNode) -> Self {
        self.pattern_tree = Some(tree);
        self
    }

    pub fn state(&self) -> TrackState {
        TrackState {
            volume: self.volume,
            pan: self.pan,
            mute: self.mute,
            solo: self.solo,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeline {
    /// Beats. Derived from the content when unset.
    pub length_beats: Option<f64>,
    pub effects: Vec<Placement>,
    pub envelopes: Vec<Placement>,
}

impl Timeline {
    /// Loop length of the arrangement. Without an explicit length this is
    /// the smallest whole number of bars that holds every event start and
    /// every placement end.
    pub fn resolved_length(&self, last_event_beat: f64, last_placement_end: f64) -> f64 {
        if let Some(length) = self.length_beats.filter(|l| l.is_finite() && *l > 0.0) {
            return length;
        }
        let event_bars = if last_event_beat.is_finite() && last_event_beat >= 0.0 {
            (last_event_beat / BAR_BEATS).floor() + 1.0
        } else {
            1.0
        };
        let placement_bars = if last_placement_end.is_finite() {
            (last_placement_end / BAR_BEATS).ceil()
        } else {
            1.0
        };
        event_bars.max(placement_bars).max(1.0) * BAR_BEATS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    /// Track whose pattern root sets the preview loop length.
    #[serde(default)]
    pub base_meter_track_id: Option<String>,
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(default)]
    pub tracks: Vec<TrackDescriptor>,
    /// Timeline events, already expanded from pattern placements.
    #[serde(default)]
    pub events: Vec<NoteEvent>,
    #[serde(default)]
    pub timeline: Timeline,
    #[serde(default)]
    pub effects: Vec<EffectDefinition>,
    #[serde(default)]
    pub envelopes: Vec<EnvelopeDefinition>,
    /// Pattern id -> timeline track id whose mix state also applies.
    #[serde(default)]
    pub pattern_to_track_map: HashMap<String, String>,
}

impl Project {
    pub fn new(name: impl Into<String>, bpm: f64) -> Self {
        Self {
            name: name.into(),
            bpm,
            base_meter_track_id: None,
            view_mode: ViewMode::Pattern,
            tracks: Vec::new(),
            events: Vec::new(),
            timeline: Timeline::default(),
            effects: Vec::new(),
            envelopes: Vec::new(),
            pattern_to_track_map: HashMap::new(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ProjectError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;

        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let ron_string = fs::read_to_string(path)?;
        let project: Project = ron::from_str(&ron_string)?;

        Ok(project)
    }
}
