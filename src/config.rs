use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ProjectError;

/// Tunables for the real-time engine. Every field has a default, so a
/// config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Slots in the control -> audio command queue.
    pub command_capacity: usize,
    /// Slots in the audio -> control notification channel.
    pub update_capacity: usize,
    /// Scheduling window while previewing a pattern.
    pub preview_lookahead_ms: f64,
    /// Scheduling window while playing the arrangement.
    pub arrangement_lookahead_beats: f64,
    pub position_interval_ms: f64,
    pub master_gain: f32,
    /// Frames rendered between scheduling passes.
    pub block_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_capacity: 1024,
            update_capacity: 256,
            preview_lookahead_ms: 150.0,
            arrangement_lookahead_beats: 4.0,
            position_interval_ms: 50.0,
            master_gain: 0.5,
            block_size: 256,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let ron_string = fs::read_to_string(path)?;
        let config: EngineConfig = ron::from_str(&ron_string)?;
        Ok(config.sanitized())
    }

    /// Replaces values the engine cannot run with by their defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.command_capacity == 0 {
            self.command_capacity = defaults.command_capacity;
        }
        if self.update_capacity == 0 {
            self.update_capacity = defaults.update_capacity;
        }
        if !(self.preview_lookahead_ms.is_finite() && self.preview_lookahead_ms >= 0.0) {
            self.preview_lookahead_ms = defaults.preview_lookahead_ms;
        }
        let lookahead = self.arrangement_lookahead_beats;
        if !(lookahead.is_finite() && lookahead >= 0.0) {
            self.arrangement_lookahead_beats = defaults.arrangement_lookahead_beats;
        }
        if !(self.position_interval_ms.is_finite() && self.position_interval_ms > 0.0) {
            self.position_interval_ms = defaults.position_interval_ms;
        }
        if !(self.master_gain.is_finite() && self.master_gain >= 0.0) {
            self.master_gain = defaults.master_gain;
        }
        if self.block_size == 0 {
            self.block_size = defaults.block_size;
        }
        self
    }
}
