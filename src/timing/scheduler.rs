use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Transport;
use crate::audio::AdsrOverride;
use crate::events::{EventId, KeyId, StoredEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewMode {
    /// Loop the base meter cycle.
    #[default]
    Pattern,
    /// Play the timeline.
    Arrangement,
}

/// A trigger placed on the sample grid of the current loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNote {
    pub key: KeyId,
    pub event_id: EventId,
    /// Beat time as stored on the event; part of the dedup key.
    pub time: f64,
    pub pitch: u8,
    pub velocity: f32,
    pub choke: bool,
    pub adsr: Option<AdsrOverride>,
}

impl ScheduledNote {
    fn same_trigger(&self, other: &ScheduledNote) -> bool {
        self.key == other.key
            && self.pitch == other.pitch
            && self.time.to_bits() == other.time.to_bits()
    }
}

/// Where the scheduler is looking this pass.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleWindow {
    pub mode: ViewMode,
    /// Beats
    pub lookahead: f64,
}

impl ScheduleWindow {
    pub fn new(mode: ViewMode, lookahead: f64) -> Self {
        Self { mode, lookahead }
    }
}

/// Sample-keyed map of upcoming triggers for the current loop.
#[derive(Debug, Default)]
pub struct Scheduler {
    scheduled: BTreeMap<u64, Vec<ScheduledNote>>,
    spare: Vec<Vec<ScheduledNote>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scheduled.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.scheduled.keys().next().copied()
    }

    /// Schedules every event that falls between the transport's position and
    /// the end of the lookahead window. Returns how many were inserted.
    pub fn schedule_window<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a StoredEvent>,
        transport: &Transport,
        window: ScheduleWindow,
    ) -> usize {
        let loop_beats = transport.loop_beats();
        let loop_length = transport.loop_length_samples();
        let loop_index = transport.loop_index();
        let current_time = transport.current_time();
        let lookahead = if window.lookahead.is_finite() {
            window.lookahead.max(0.0)
        } else {
            0.0
        };
        let current_beat = transport.absolute_beat();
        let lookahead_beat = current_beat + lookahead;
        let loop_start_beat = loop_index as f64 * loop_beats;

        let mut inserted = 0;
        for stored in events {
            let event = &stored.event;
            let (absolute, local) = match window.mode {
                ViewMode::Arrangement => {
                    let absolute = if loop_index == 0 {
                        event.time
                    } else {
                        event.time.rem_euclid(loop_beats) + loop_start_beat
                    };
                    (absolute, absolute - loop_start_beat)
                }
                ViewMode::Pattern => {
                    let local = event.time.rem_euclid(loop_beats);
                    (local + loop_start_beat, local)
                }
            };
            if absolute < current_beat - 1e-9 || absolute > lookahead_beat {
                continue;
            }
            let sample = transport.beats_to_samples(local).floor();
            if !sample.is_finite() || sample < 0.0 {
                continue;
            }
            let sample = sample as u64;
            // Past the loop end: the next cycle picks it up.
            if sample >= loop_length || sample < current_time {
                continue;
            }

            let note = ScheduledNote {
                key: stored.key,
                event_id: event.id,
                time: event.time,
                pitch: event.pitch,
                velocity: event.velocity,
                choke: event.choke,
                adsr: event.adsr,
            };
            let spare = &mut self.spare;
            let bucket = self
                .scheduled
                .entry(sample)
                .or_insert_with(|| spare.pop().unwrap_or_default());
            if bucket.iter().any(|n| n.same_trigger(&note)) {
                continue;
            }
            bucket.push(note);
            inserted += 1;
        }
        inserted
    }

    /// Moves every trigger at or before `current_time` into `out`, in sample
    /// order. Past entries leave the map.
    pub fn drain_due(&mut self, current_time: u64, out: &mut Vec<ScheduledNote>) {
        while let Some(entry) = self.scheduled.first_entry() {
            if *entry.key() > current_time {
                break;
            }
            let mut bucket = entry.remove();
            out.append(&mut bucket);
            self.spare.push(bucket);
        }
    }

    /// Drops triggers after `current_time` whose key matches; what is already
    /// due stays.
    pub fn purge_future(&mut self, current_time: u64, mut matches: impl FnMut(KeyId) -> bool) {
        let Some(start) = current_time.checked_add(1) else {
            return;
        };
        let mut emptied = Vec::new();
        for (sample, bucket) in self.scheduled.range_mut(start..) {
            bucket.retain(|note| !matches(note.key));
            if bucket.is_empty() {
                emptied.push(*sample);
            }
        }
        for sample in emptied {
            if let Some(bucket) = self.scheduled.remove(&sample) {
                self.spare.push(bucket);
            }
        }
    }

    pub fn clear(&mut self) {
        while let Some((_, mut bucket)) = self.scheduled.pop_first() {
            bucket.clear();
            self.spare.push(bucket);
        }
    }
}
