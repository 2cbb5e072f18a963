use crate::{
    EngineConfig, EngineError, Project,
    audio::{Frame, InstrumentSettings, TrackStateRegistry, Voice, mix_sample},
    automation::{Automation, Modulation},
    events::{EventId, EventStore, KeyId, NoteEvent, VoiceKey},
    project::{Timeline, TrackDescriptor},
    timing::{
        DEFAULT_METER, PatternNode, ScheduleWindow, ScheduledNote, Scheduler, Transport,
        TransportState, ViewMode, flatten,
    },
};
use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum EngineCommand {
    LoadProject(Box<Project>),
    SetTransport {
        state: TransportState,
        /// Beats
        position: Option<f64>,
    },
    SetTempo(f64),
    UpdatePatternTree {
        track_id: String,
        tree: PatternNode,
    },
    UpdateTrackSettings {
        track_id: String,
        settings: InstrumentSettings,
    },
    UpdateTrack(Box<TrackDescriptor>),
    UpdateTrackVolume {
        track_id: String,
        value: f32,
    },
    UpdateTrackPan {
        track_id: String,
        value: f32,
    },
    UpdateTrackMute {
        track_id: String,
        value: bool,
    },
    UpdateTrackSolo {
        track_id: String,
        value: bool,
    },
    UpdateTrackEvents {
        track_id: String,
        events: Vec<NoteEvent>,
    },
    RemoveTrack(String),
}

impl EngineCommand {
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::LoadProject(_) => "load_project",
            EngineCommand::SetTransport { .. } => "set_transport",
            EngineCommand::SetTempo(_) => "set_tempo",
            EngineCommand::UpdatePatternTree { .. } => "update_pattern_tree",
            EngineCommand::UpdateTrackSettings { .. } => "update_track_settings",
            EngineCommand::UpdateTrack(_) => "update_track",
            EngineCommand::UpdateTrackVolume { .. } => "update_track_volume",
            EngineCommand::UpdateTrackPan { .. } => "update_track_pan",
            EngineCommand::UpdateTrackMute { .. } => "update_track_mute",
            EngineCommand::UpdateTrackSolo { .. } => "update_track_solo",
            EngineCommand::UpdateTrackEvents { .. } => "update_track_events",
            EngineCommand::RemoveTrack(_) => "remove_track",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineUpdate {
    /// Throttled position while playing; beats within the current loop.
    PlaybackPosition { beat: f64 },
    /// Sent for every buffer in which notes fired.
    PlaybackUpdate { beat: f64, triggered: Vec<EventId> },
    TransportChanged { state: TransportState },
    ProjectLoaded { tracks: usize },
}

/// Control-side end of the engine. Cloneable; every clone feeds the same
/// command queue.
#[derive(Clone)]
pub struct EngineHandle {
    commands: Arc<Mutex<HeapProd<EngineCommand>>>,
    updates: Receiver<EngineUpdate>,
}

impl EngineHandle {
    /// Queues a command for the next buffer. Never blocks on the audio side.
    pub fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.commands
            .lock()
            .try_push(command)
            .map_err(|_| EngineError::QueueFull)
    }

    pub fn updates(&self) -> &Receiver<EngineUpdate> {
        &self.updates
    }
}

/// Audio-side end: drains queued commands at each buffer boundary, then
/// renders.
pub struct RealtimeEngine {
    engine: Engine,
    commands: HeapCons<EngineCommand>,
}

impl RealtimeEngine {
    pub fn process(&mut self, out: &mut [f32], channels: usize) {
        while let Some(command) = self.commands.try_pop() {
            self.engine.apply(command);
        }
        self.engine.render(out, channels);
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

pub fn engine_channel(sample_rate: u32, config: EngineConfig) -> (EngineHandle, RealtimeEngine) {
    let config = config.sanitized();
    let ring_buffer = HeapRb::<EngineCommand>::new(config.command_capacity);
    let (producer, consumer) = ring_buffer.split();
    let (update_tx, update_rx) = crossbeam::channel::bounded(config.update_capacity);

    let handle = EngineHandle {
        commands: Arc::new(Mutex::new(producer)),
        updates: update_rx,
    };
    let realtime = RealtimeEngine {
        engine: Engine::new(sample_rate, config, update_tx),
        commands: consumer,
    };
    (handle, realtime)
}

/// The descriptor that drives a voice: its own, or for a pattern voice
/// without one, its instrument's.
fn descriptor_for<'a>(
    descriptors: &'a HashMap<String, TrackDescriptor>,
    key: &VoiceKey,
) -> Option<&'a TrackDescriptor> {
    descriptors
        .get(key.id())
        .or_else(|| key.pattern_id().and(descriptors.get(key.instrument_id())))
}

fn slot_mut(voices: &mut Vec<Option<Voice>>, key: KeyId) -> &mut Option<Voice> {
    let index = key.index();
    if voices.len() <= index {
        voices.resize_with(index + 1, || None);
    }
    &mut voices[index]
}

fn voice_seed(key: KeyId) -> u64 {
    0x9E37_79B9_7F4A_7C15 ^ u64::from(key.0).wrapping_mul(0x0100_0000_01B3)
}

/// Everything the real-time loop owns. Single-threaded; commands and
/// rendering happen on whichever thread holds it.
pub struct Engine {
    config: EngineConfig,
    sample_rate: f32,
    transport: Transport,
    scheduler: Scheduler,
    events: EventStore,
    registry: TrackStateRegistry,
    descriptors: HashMap<String, TrackDescriptor>,
    base_meter_track_id: Option<String>,
    view_mode: ViewMode,
    timeline: Timeline,
    automation: Automation,
    pattern_to_track: HashMap<String, String>,
    /// Indexed by `KeyId`.
    voices: Vec<Option<Voice>>,
    due: Vec<ScheduledNote>,
    triggered: Vec<EventId>,
    trigger_beat: f64,
    updates: Sender<EngineUpdate>,
    position_interval: u64,
    since_position: u64,
    frames_played: u64,
}

impl Engine {
    pub fn new(sample_rate: u32, config: EngineConfig, updates: Sender<EngineUpdate>) -> Self {
        let config = config.sanitized();
        let position_interval =
            ((config.position_interval_ms / 1000.0 * f64::from(sample_rate)) as u64).max(1);
        Self {
            sample_rate: sample_rate.max(1) as f32,
            transport: Transport::new(sample_rate, 120.0),
            scheduler: Scheduler::new(),
            events: EventStore::new(),
            registry: TrackStateRegistry::new(),
            descriptors: HashMap::new(),
            base_meter_track_id: None,
            view_mode: ViewMode::Pattern,
            timeline: Timeline::default(),
            automation: Automation::default(),
            pattern_to_track: HashMap::new(),
            voices: Vec::new(),
            due: Vec::with_capacity(64),
            triggered: Vec::with_capacity(64),
            trigger_beat: 0.0,
            updates,
            position_interval,
            since_position: 0,
            frames_played: 0,
            config,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn registry(&self) -> &TrackStateRegistry {
        &self.registry
    }

    pub fn track(&self, track_id: &str) -> Option<&TrackDescriptor> {
        self.descriptors.get(track_id)
    }

    pub fn voice(&self, track_id: &str) -> Option<&Voice> {
        let key = self.events.keys().lookup(&VoiceKey::parse(track_id))?;
        self.voices.get(key.index())?.as_ref()
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().flatten().count()
    }

    /// Triggers waiting in the scheduled-event map.
    pub fn pending_triggers(&self) -> usize {
        self.scheduler.len()
    }

    /// Frames rendered while the transport was playing.
    pub fn frames_played(&self) -> u64 {
        self.frames_played
    }

    pub fn apply(&mut self, command: EngineCommand) {
        tracing::debug!(command = command.name(), "applying engine command");
        match command {
            EngineCommand::LoadProject(project) => self.load_project(*project),
            EngineCommand::SetTransport { state, position } => self.set_transport(state, position),
            EngineCommand::SetTempo(bpm) => {
                self.transport.set_tempo(bpm);
                tracing::info!(bpm = self.transport.bpm(), "tempo changed");
                self.reschedule();
            }
            EngineCommand::UpdatePatternTree { track_id, tree } => {
                match self.descriptors.get_mut(&track_id) {
                    Some(descriptor) => descriptor.pattern_tree = Some(tree),
                    None => {
                        tracing::warn!(%track_id, "pattern edit for unknown track");
                        return;
                    }
                }
                self.pattern_changed(&track_id);
            }
            EngineCommand::UpdateTrackSettings { track_id, settings } => {
                let Some(descriptor) = self.descriptors.get_mut(&track_id) else {
                    tracing::warn!(%track_id, "settings for unknown track");
                    return;
                };
                descriptor.settings = settings;
                self.for_each_voice_of(&track_id, |slot, descriptor| {
                    if let Some(voice) = slot {
                        voice.update_settings(&descriptor.settings);
                    }
                });
            }
            EngineCommand::UpdateTrack(descriptor) => self.update_track(*descriptor),
            EngineCommand::UpdateTrackVolume { track_id, value } => {
                self.registry.set_volume(&track_id, value)
            }
            EngineCommand::UpdateTrackPan { track_id, value } => {
                self.registry.set_pan(&track_id, value)
            }
            EngineCommand::UpdateTrackMute { track_id, value } => {
                self.registry.set_mute(&track_id, value)
            }
            EngineCommand::UpdateTrackSolo { track_id, value } => {
                self.registry.set_solo(&track_id, value)
            }
            EngineCommand::UpdateTrackEvents { track_id, events } => {
                self.update_events(&track_id, events)
            }
            EngineCommand::RemoveTrack(track_id) => self.remove_track(&track_id),
        }
    }

    /// Renders interleaved frames into `out`. A trailing partial frame is
    /// zeroed.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for chunk in out.chunks_mut(self.config.block_size * channels) {
            let frames = chunk.len() / channels;
            self.schedule(frames);
            let mut frame_slices = chunk.chunks_exact_mut(channels);
            for frame in &mut frame_slices {
                self.render_frame(frame, frames);
            }
            frame_slices.into_remainder().fill(0.0);
        }

        if !self.triggered.is_empty() {
            let triggered = self.triggered.drain(..).collect();
            self.notify(EngineUpdate::PlaybackUpdate {
                beat: self.trigger_beat,
                triggered,
            });
        }
    }

    fn render_frame(&mut self, out: &mut [f32], block_frames: usize) {
        let playing = self.transport.is_playing();
        if playing {
            if self.transport.wrap_if_at_boundary() {
                self.start_cycle(block_frames);
            }
            self.due.clear();
            self.scheduler
                .drain_due(self.transport.current_time(), &mut self.due);
            for i in 0..self.due.len() {
                let note = self.due[i];
                self.dispatch(note);
            }
        }

        self.mix().finish(self.config.master_gain).write_to(out);

        if playing {
            self.transport.advance();
            self.frames_played += 1;
            self.since_position += 1;
            if self.since_position >= self.position_interval {
                self.since_position = 0;
                self.notify(EngineUpdate::PlaybackPosition {
                    beat: self.transport.current_beat(),
                });
            }
        }
    }

    fn dispatch(&mut self, note: ScheduledNote) {
        let Some(key) = self.events.keys().get(note.key) else {
            return;
        };

        if note.velocity <= 0.0 {
            if let Some(Some(voice)) = self.voices.get_mut(note.key.index()) {
                if voice.pitch() == note.pitch {
                    voice.release();
                }
            }
            return;
        }

        let Some(descriptor) = descriptor_for(&self.descriptors, key) else {
            tracing::warn!(track = %key, "trigger for unknown track skipped");
            return;
        };

        // Choke groups are the percussion voices of one pattern, or of the
        // standalone tracks.
        if note.choke && descriptor.instrument_type.is_percussive() {
            let group = key.pattern_id();
            for (index, slot) in self.voices.iter_mut().enumerate() {
                if index == note.key.index() {
                    continue;
                }
                let Some(voice) = slot.as_mut() else {
                    continue;
                };
                let same_group = self
                    .events
                    .keys()
                    .get(KeyId(index as u32))
                    .is_some_and(|other| other.pattern_id() == group);
                if same_group && voice.kind().is_percussive() && voice.is_active() {
                    voice.choke();
                }
            }
        }

        let kind = descriptor.instrument_type;
        let sample_rate = self.sample_rate;
        let slot = slot_mut(&mut self.voices, note.key);
        if slot.as_ref().is_some_and(|voice| voice.kind() != kind) {
            *slot = slot.as_ref().map(|previous| {
                Voice::replacing(previous, kind, &descriptor.settings, voice_seed(note.key))
            });
        }
        let voice = slot.get_or_insert_with(|| {
            Voice::new(kind, &descriptor.settings, sample_rate, voice_seed(note.key))
        });
        voice.trigger(note.velocity, note.pitch, note.adsr.as_ref());

        if self.triggered.is_empty() {
            self.trigger_beat = self.transport.current_beat();
        }
        self.triggered.push(note.event_id);
    }

    fn mix(&mut self) -> Frame {
        let mut frame = Frame::default();
        let automate = self.view_mode == ViewMode::Arrangement && !self.automation.is_empty();
        let beat = self.transport.current_beat();
        let keys = self.events.keys();

        for (index, slot) in self.voices.iter_mut().enumerate() {
            let Some(voice) = slot.as_mut() else {
                continue;
            };
            let Some(key) = keys.get(KeyId(index as u32)) else {
                *slot = None;
                continue;
            };
            let modulation = if automate {
                self.automation.modulation(beat, key.pattern_id())
            } else {
                Modulation::NEUTRAL
            };
            voice.set_modulation(modulation.pitch, modulation.cutoff_scale);
            // Silenced voices still advance so an unmute picks up live state.
            let raw = voice.process();
            if !voice.is_active() {
                *slot = None;
            }

            let timeline_track = key
                .pattern_id()
                .and_then(|pattern| self.pattern_to_track.get(pattern))
                .map(String::as_str);
            let mix = self.registry.resolve(key, timeline_track);
            if mix.silenced || raw == 0.0 {
                continue;
            }

            let mut sample = raw * modulation.volume;
            if automate {
                sample = self.automation.apply_effects(sample, beat, key.pattern_id());
            }
            let pan = (mix.pan + modulation.pan).clamp(-1.0, 1.0);
            frame.add(mix_sample(sample, mix.volume, pan));
        }
        frame
    }

    fn notify(&self, update: EngineUpdate) {
        let _ = self.updates.try_send(update);
    }

    fn load_project(&mut self, project: Project) {
        // Voices whose track survives the reload keep sounding.
        let mut survivors = Vec::new();
        for (index, slot) in self.voices.iter_mut().enumerate() {
            if let Some(voice) = slot.take() {
                if let Some(key) = self.events.keys().get(KeyId(index as u32)) {
                    survivors.push((key.clone(), voice));
                }
            }
        }
        self.voices.clear();
        self.events.clear();
        self.scheduler.clear();
        self.registry.clear();
        self.descriptors.clear();

        self.transport.set_tempo(project.bpm);
        self.base_meter_track_id = project.base_meter_track_id;
        self.view_mode = project.view_mode;
        self.pattern_to_track = project.pattern_to_track_map;
        self.automation = Automation::new(
            &project.effects,
            &project.envelopes,
            &project.timeline.effects,
            &project.timeline.envelopes,
        );
        self.timeline = project.timeline;
        self.events.replace_all(project.events);

        let tracks = project.tracks.len();
        for descriptor in project.tracks {
            self.registry.insert(&descriptor.id, descriptor.state());
            self.descriptors.insert(descriptor.id.clone(), descriptor);
        }
        if self.view_mode == ViewMode::Pattern {
            self.flatten_all();
        }

        for (key, mut voice) in survivors {
            let Some(descriptor) = descriptor_for(&self.descriptors, &key) else {
                continue;
            };
            if descriptor.instrument_type != voice.kind() {
                continue;
            }
            voice.update_settings(&descriptor.settings);
            let id = self.events.intern(key);
            *slot_mut(&mut self.voices, id) = Some(voice);
        }

        self.refresh_loop();
        self.reschedule();
        tracing::info!(
            name = %project.name,
            tracks,
            events = self.events.len(),
            view = ?self.view_mode,
            loop_beats = self.transport.loop_beats(),
            "project loaded"
        );
        self.notify(EngineUpdate::ProjectLoaded { tracks });
    }

    fn set_transport(&mut self, state: TransportState, position: Option<f64>) {
        match state {
            TransportState::Stopped => {
                self.transport.rewind();
                self.scheduler.clear();
                self.release_all();
            }
            TransportState::Paused => self.release_all(),
            TransportState::Playing => {}
        }
        if let Some(position) = position {
            self.transport.locate(position);
            self.scheduler.clear();
        }
        self.transport.set_state(state);
        self.since_position = 0;
        tracing::info!(?state, beat = self.transport.current_beat(), "transport changed");

        self.schedule(self.config.block_size);
        self.notify(EngineUpdate::TransportChanged { state });
    }

    fn update_track(&mut self, descriptor: TrackDescriptor) {
        let track_id = descriptor.id.clone();
        let tree_changed = self
            .descriptors
            .get(&track_id)
            .is_none_or(|previous| previous.pattern_tree != descriptor.pattern_tree);
        self.registry.insert(&track_id, descriptor.state());
        self.descriptors.insert(track_id.clone(), descriptor);

        let keys = self.events.keys();
        for (index, slot) in self.voices.iter_mut().enumerate() {
            let Some(key) = keys.get(KeyId(index as u32)) else {
                continue;
            };
            let Some(descriptor) = descriptor_for(&self.descriptors, key) else {
                continue;
            };
            if descriptor.id != track_id {
                continue;
            }
            let Some(voice) = slot.as_mut() else {
                continue;
            };
            if voice.kind() == descriptor.instrument_type {
                voice.update_settings(&descriptor.settings);
                continue;
            }
            let replacement = Voice::replacing(
                voice,
                descriptor.instrument_type,
                &descriptor.settings,
                voice_seed(KeyId(index as u32)),
            );
            tracing::debug!(track = %key, kind = ?descriptor.instrument_type, "instrument swapped");
            *slot = Some(replacement);
        }

        if tree_changed {
            self.pattern_changed(&track_id);
        }
    }

    fn update_events(&mut self, track_id: &str, events: Vec<NoteEvent>) {
        let mut touched: Vec<KeyId> = self
            .events
            .track(track_id)
            .map(|old| old.iter().map(|e| e.key).collect())
            .unwrap_or_default();
        self.events.replace_track(track_id, events);
        if let Some(new) = self.events.track(track_id) {
            touched.extend(new.iter().map(|e| e.key));
        }
        touched.sort_unstable();
        touched.dedup();
        self.retime(&touched);
    }

    fn remove_track(&mut self, track_id: &str) {
        self.for_each_voice_of(track_id, |slot, _| {
            if let Some(voice) = slot {
                voice.release();
            }
        });
        let mut touched: Vec<KeyId> = self
            .events
            .remove_track(track_id)
            .map(|old| old.iter().map(|e| e.key).collect())
            .unwrap_or_default();
        touched.extend(self.events.keys().lookup(&VoiceKey::parse(track_id)));
        self.descriptors.remove(track_id);
        self.registry.remove(track_id);
        tracing::info!(track_id, "track removed");

        if self.base_meter_track_id.as_deref() == Some(track_id) {
            self.flatten_all();
            self.refresh_loop();
            self.reschedule();
        } else {
            self.retime(&touched);
        }
    }

    /// Re-flattens after a tree edit and swaps the track's future triggers.
    fn pattern_changed(&mut self, track_id: &str) {
        if self.view_mode != ViewMode::Pattern {
            return;
        }
        if self.base_meter_track_id.as_deref() == Some(track_id)
            && self.meter() != self.transport.loop_beats()
        {
            self.flatten_all();
            self.refresh_loop();
            self.reschedule();
            return;
        }
        self.flatten_track(track_id);
        let touched: Vec<KeyId> = self
            .events
            .keys()
            .lookup(&VoiceKey::parse(track_id))
            .into_iter()
            .collect();
        self.retime(&touched);
    }

    /// Drops future triggers for `keys` and schedules again. A loop length
    /// change restarts scheduling for every track.
    fn retime(&mut self, keys: &[KeyId]) {
        let loop_beats = self.transport.loop_beats();
        self.refresh_loop();
        if self.transport.loop_beats() != loop_beats {
            self.reschedule();
            return;
        }
        self.scheduler
            .purge_future(self.transport.current_time(), |key| keys.contains(&key));
        self.schedule(self.config.block_size);
    }

    fn meter(&self) -> f64 {
        self.base_meter_track_id
            .as_deref()
            .and_then(|id| self.descriptors.get(id))
            .and_then(|d| d.pattern_tree.as_ref())
            .map_or(DEFAULT_METER, PatternNode::meter)
    }

    fn flatten_all(&mut self) {
        let ids: Vec<String> = self
            .descriptors
            .values()
            .filter(|d| d.pattern_tree.is_some())
            .map(|d| d.id.clone())
            .collect();
        for id in ids {
            self.flatten_track(&id);
        }
    }

    fn flatten_track(&mut self, track_id: &str) {
        let meter = self.meter();
        let Some(tree) = self
            .descriptors
            .get(track_id)
            .and_then(|d| d.pattern_tree.as_ref())
        else {
            return;
        };
        let key = VoiceKey::parse(track_id);
        let events = flatten(tree, meter, key.instrument_id(), key.pattern_id());
        self.events.replace_track(track_id, events);
    }

    fn refresh_loop(&mut self) {
        let beats = match self.view_mode {
            ViewMode::Pattern => self.meter(),
            ViewMode::Arrangement => self
                .timeline
                .resolved_length(self.events.last_beat(), self.automation.last_beat()),
        };
        if beats != self.transport.loop_beats() {
            self.transport.set_loop_beats(beats);
        }
    }

    fn start_cycle(&mut self, frames: usize) {
        self.transport.refresh_loop_length();
        self.scheduler.clear();
        self.schedule(frames);
    }

    fn reschedule(&mut self) {
        self.scheduler.clear();
        self.schedule(self.config.block_size);
    }

    /// One lookahead pass. The window is widened by the block about to be
    /// rendered so nothing due inside it is missed.
    fn schedule(&mut self, frames: usize) {
        if !self.transport.is_playing() {
            return;
        }
        let window = match self.view_mode {
            ViewMode::Pattern => self
                .transport
                .millis_to_beats(self.config.preview_lookahead_ms),
            ViewMode::Arrangement => self.config.arrangement_lookahead_beats,
        };
        let span = self.transport.samples_to_beats(frames as f64);
        self.scheduler.schedule_window(
            self.events.iter(),
            &self.transport,
            ScheduleWindow::new(self.view_mode, window + span),
        );
    }

    fn release_all(&mut self) {
        for voice in self.voices.iter_mut().flatten() {
            voice.release();
        }
    }

    fn for_each_voice_of(
        &mut self,
        track_id: &str,
        mut f: impl FnMut(&mut Option<Voice>, &TrackDescriptor),
    ) {
        let keys = self.events.keys();
        for (index, slot) in self.voices.iter_mut().enumerate() {
            if slot.is_none() {
                continue;
            }
            let Some(key) = keys.get(KeyId(index as u32)) else {
                continue;
            };
            match descriptor_for(&self.descriptors, key) {
                Some(descriptor) if descriptor.id == track_id => f(slot, descriptor),
                _ => {}
            }
        }
    }
}
