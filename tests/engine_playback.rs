use beatforge::{
    Engine, EngineCommand, EngineConfig, EngineUpdate, Project, TrackDescriptor,
    audio::{EnvelopeStage, InstrumentType},
    automation::{Curve, CurveShape, EnvelopeDefinition, EnvelopeTarget, Placement},
    events::{EventId, NoteEvent},
    timing::{PatternNode, TransportState, ViewMode},
};
use crossbeam::channel::Receiver;

const SR: u32 = 1000;

struct Rig {
    engine: Engine,
    updates: Receiver<EngineUpdate>,
}

impl Rig {
    fn new(project: Project) -> Self {
        Self::with_config(project, EngineConfig::default())
    }

    fn with_config(project: Project, config: EngineConfig) -> Self {
        let (tx, updates) = crossbeam::channel::bounded(4096);
        let mut engine = Engine::new(SR, config, tx);
        engine.apply(EngineCommand::LoadProject(Box::new(project)));
        Self { engine, updates }
    }

    fn transport(&mut self, state: TransportState) {
        self.engine.apply(EngineCommand::SetTransport {
            state,
            position: None,
        });
    }

    fn play(&mut self) {
        self.transport(TransportState::Playing);
    }

    fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        self.engine.render(&mut out, 2);
        out
    }

    fn triggered(&self) -> Vec<EventId> {
        self.updates
            .try_iter()
            .filter_map(|update| match update {
                EngineUpdate::PlaybackUpdate { triggered, .. } => Some(triggered),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Renders frame by frame and returns the playback frame of every trigger.
    fn trigger_frames(&mut self, frames: usize) -> Vec<u64> {
        let _ = self.triggered();
        let mut hits = Vec::new();
        for _ in 0..frames {
            self.render(1);
            if !self.triggered().is_empty() {
                hits.push(self.engine.frames_played() - 1);
            }
        }
        hits
    }
}

fn left(out: &[f32]) -> Vec<f32> {
    out.chunks(2).map(|f| f[0]).collect()
}

fn right(out: &[f32]) -> Vec<f32> {
    out.chunks(2).map(|f| f[1]).collect()
}

fn rms(samples: &[f32]) -> f32 {
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

fn pattern_project(bpm: f64, id: &str, kind: InstrumentType, tree: PatternNode) -> Project {
    let mut project = Project::new("test", bpm);
    project
        .tracks
        .push(TrackDescriptor::new(id, kind).with_pattern(tree));
    project
}

fn four_kicks(bpm: f64) -> Project {
    pattern_project(
        bpm,
        "kick",
        InstrumentType::Kick,
        PatternNode::split(4, vec![PatternNode::hit(); 4]),
    )
}

#[test]
fn eleventh_loop_starts_on_the_sample_grid() {
    // 120 bpm divides evenly; 133 bpm floors 1804.51 to 1804 every loop.
    for (bpm, loop_length) in [(120.0, 2000u64), (133.0, 1804)] {
        let mut rig = Rig::new(pattern_project(
            bpm,
            "kick",
            InstrumentType::Kick,
            PatternNode::hit(),
        ));
        rig.play();
        assert_eq!(rig.engine.transport().loop_length_samples(), loop_length);

        let hits = rig.trigger_frames(loop_length as usize * 10 + 1);
        let expected: Vec<u64> = (0..=10).map(|n| n * loop_length).collect();
        assert_eq!(hits, expected, "bpm {bpm}");
    }
}

#[test]
fn solo_silences_every_other_track() {
    let mut project = Project::new("solo", 120.0);
    let mut hard_left = TrackDescriptor::new("left", InstrumentType::Organ)
        .with_pattern(PatternNode::hit());
    hard_left.pan = -1.0;
    let mut hard_right = TrackDescriptor::new("right", InstrumentType::Organ)
        .with_pattern(PatternNode::hit());
    hard_right.pan = 1.0;
    project.tracks.push(hard_left);
    project.tracks.push(hard_right);

    let mut rig = Rig::new(project);
    rig.engine.apply(EngineCommand::UpdateTrackSolo {
        track_id: "left".into(),
        value: true,
    });
    rig.play();
    let out = rig.render(200);
    assert!(right(&out).iter().all(|s| *s == 0.0));
    assert!(rms(&left(&out)) > 0.01);

    rig.engine.apply(EngineCommand::UpdateTrackSolo {
        track_id: "left".into(),
        value: false,
    });
    let out = rig.render(200);
    assert!(rms(&right(&out)) > 0.01);
}

#[test]
fn muted_voice_keeps_running_underneath() {
    let mut project = Project::new("solo", 120.0);
    project.tracks.push(
        TrackDescriptor::new("lead", InstrumentType::Organ).with_pattern(PatternNode::hit()),
    );
    let mut rig = Rig::new(project);
    rig.engine.apply(EngineCommand::UpdateTrackMute {
        track_id: "lead".into(),
        value: true,
    });
    rig.play();
    assert!(rig.render(100).iter().all(|s| *s == 0.0));

    // Unmuting resumes the voice that kept running underneath.
    rig.engine.apply(EngineCommand::UpdateTrackMute {
        track_id: "lead".into(),
        value: false,
    });
    assert!(rms(&left(&rig.render(100))) > 0.01);
}

#[test]
fn note_off_only_releases_its_own_voice() {
    let mut project = Project::new("noteoff", 120.0);
    project
        .tracks
        .push(TrackDescriptor::new("a", InstrumentType::Organ));
    project
        .tracks
        .push(TrackDescriptor::new("b", InstrumentType::Organ));
    project.events = vec![
        NoteEvent::new(0.0, 60, 1.0, "a"),
        NoteEvent::new(0.0, 60, 1.0, "b"),
        NoteEvent::new(1.0, 60, 0.0, "a"),
        NoteEvent::new(1.0, 60, 0.0, "b").in_pattern("verse"),
    ];

    let mut rig = Rig::new(project);
    rig.play();
    rig.render(520);

    let a = rig.engine.voice("a").unwrap();
    assert_eq!(a.stage(), EnvelopeStage::Release);
    let b = rig.engine.voice("b").unwrap();
    assert_eq!(b.stage(), EnvelopeStage::Sustain);
}

#[test]
fn note_off_for_another_pitch_is_ignored() {
    let mut project = Project::new("noteoff", 120.0);
    project
        .tracks
        .push(TrackDescriptor::new("a", InstrumentType::Organ));
    project.events = vec![
        NoteEvent::new(0.0, 64, 1.0, "a"),
        NoteEvent::new(1.0, 60, 0.0, "a"),
    ];

    let mut rig = Rig::new(project);
    rig.play();
    rig.render(520);
    assert_eq!(rig.engine.voice("a").unwrap().stage(), EnvelopeStage::Sustain);
}

#[test]
fn every_event_fires_once_per_loop() {
    let mut rig = Rig::new(four_kicks(120.0));
    rig.play();
    for _ in 0..(3 * 2000 / 64) {
        rig.render(64);
    }
    rig.render(3 * 2000 % 64);

    let fired = rig.triggered();
    assert_eq!(fired.len(), 12);
    let mut ids = fired.clone();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    for id in ids {
        assert_eq!(fired.iter().filter(|f| **f == id).count(), 3);
    }
}

#[test]
fn chords_trigger_every_pitch() {
    let mut project = Project::new("chord", 120.0);
    project
        .tracks
        .push(TrackDescriptor::new("keys", InstrumentType::Organ));
    project
        .tracks
        .push(TrackDescriptor::new("bass", InstrumentType::Bass));
    project.events = vec![
        NoteEvent::new(0.0, 60, 1.0, "keys"),
        NoteEvent::new(0.0, 64, 1.0, "keys"),
        NoteEvent::new(0.0, 40, 1.0, "bass"),
    ];
    let mut rig = Rig::new(project);
    rig.play();
    rig.render(10);
    assert_eq!(rig.triggered().len(), 3);
}

#[test]
fn pattern_edit_swaps_future_hits_only() {
    let mut rig = Rig::new(four_kicks(120.0));
    rig.play();
    rig.render(450);
    // Beat 1 is inside the lookahead window by now.
    assert_eq!(rig.engine.pending_triggers(), 1);

    rig.engine.apply(EngineCommand::UpdatePatternTree {
        track_id: "kick".into(),
        tree: PatternNode::split(2, vec![PatternNode::hit(), PatternNode::hit()]),
    });
    assert_eq!(rig.engine.pending_triggers(), 0);

    let hits = rig.trigger_frames(3550);
    assert_eq!(hits, vec![1000, 2000, 3000]);
}

#[test]
fn replacing_track_events_reschedules_that_track() {
    let mut project = four_kicks(120.0);
    project
        .tracks
        .push(TrackDescriptor::new("snare", InstrumentType::Snare));
    project.events = vec![NoteEvent::new(0.5, 60, 1.0, "snare")];
    let mut rig = Rig::new(project);
    rig.play();
    rig.render(100);
    let _ = rig.triggered();

    rig.engine.apply(EngineCommand::UpdateTrackEvents {
        track_id: "snare".into(),
        events: vec![NoteEvent::new(1.5, 60, 1.0, "snare")],
    });
    // Kicks at 500, 1000, 1500; the snare moved from 250 to 750.
    let hits = rig.trigger_frames(1900);
    assert_eq!(hits, vec![500, 750, 1000, 1500]);
}

#[test]
fn tempo_change_keeps_the_beat() {
    let mut rig = Rig::new(four_kicks(120.0));
    rig.play();
    rig.render(1000);
    let _ = rig.triggered();

    rig.engine.apply(EngineCommand::SetTempo(60.0));
    assert_eq!(rig.engine.transport().current_beat(), 2.0);
    assert_eq!(rig.engine.transport().loop_length_samples(), 4000);

    // Beat 2 is due immediately, beat 3 one second later.
    let hits = rig.trigger_frames(1500);
    assert_eq!(hits, vec![1000, 2000]);
}

#[test]
fn stop_rewinds_and_lets_tails_ring_out() {
    let mut rig = Rig::new(four_kicks(120.0));
    rig.play();
    rig.render(700);
    rig.transport(TransportState::Stopped);

    let transport = rig.engine.transport();
    assert_eq!((transport.current_time(), transport.loop_index()), (0, 0));
    assert_eq!(rig.engine.pending_triggers(), 0);
    let stage = rig.engine.voice("kick").unwrap().stage();
    assert!(matches!(stage, EnvelopeStage::Release | EnvelopeStage::FadeOut));

    let _ = rig.triggered();
    let out = rig.render(2000);
    assert!(rig.triggered().is_empty());
    assert_eq!(rig.engine.frames_played(), 700);
    assert_eq!(rig.engine.active_voices(), 0);
    assert!(out[out.len() - 200..].iter().all(|s| *s == 0.0));
}

#[test]
fn pause_holds_the_position() {
    let mut rig = Rig::new(four_kicks(120.0));
    rig.play();
    rig.render(700);
    rig.transport(TransportState::Paused);
    rig.render(300);
    assert_eq!(rig.engine.transport().current_time(), 700);

    rig.play();
    let _ = rig.triggered();
    assert_eq!(rig.trigger_frames(400), vec![1000]);
}

#[test]
fn locate_moves_playback() {
    let mut rig = Rig::new(four_kicks(120.0));
    rig.engine.apply(EngineCommand::SetTransport {
        state: TransportState::Playing,
        position: Some(2.5),
    });
    assert_eq!(rig.engine.transport().current_time(), 1250);
    assert_eq!(rig.trigger_frames(700), vec![250]);
}

#[test]
fn half_volume_centre_pan_is_constant_power() {
    let config = EngineConfig {
        master_gain: 1.0,
        ..Default::default()
    };
    let tree = PatternNode::hit();

    // Hard left at unity passes the raw voice sample straight through.
    let mut raw = pattern_project(120.0, "keys", InstrumentType::Organ, tree.clone());
    raw.tracks[0].pan = -1.0;
    let mut centred = pattern_project(120.0, "keys", InstrumentType::Organ, tree);
    centred.tracks[0].volume = 0.5;

    let mut raw = Rig::with_config(raw, config.clone());
    let mut centred = Rig::with_config(centred, config);
    raw.play();
    centred.play();
    let raw = left(&raw.render(300));
    let centred = centred.render(300);

    assert!(rms(&raw) > 0.01);
    for (frame, raw) in centred.chunks(2).zip(raw) {
        assert!((frame[0] - 0.353_553_4 * raw).abs() < 1e-5);
        assert!((frame[1] - frame[0]).abs() < 1e-6);
    }
}

#[test]
fn arrangement_loop_covers_the_timeline() {
    let mut project = Project::new("song", 120.0);
    project.view_mode = ViewMode::Arrangement;
    project
        .tracks
        .push(TrackDescriptor::new("kick", InstrumentType::Kick));
    project.events = vec![
        NoteEvent::new(0.0, 60, 1.0, "kick"),
        NoteEvent::new(5.0, 60, 1.0, "kick"),
    ];
    let mut rig = Rig::new(project);
    assert_eq!(rig.engine.transport().loop_beats(), 8.0);
    rig.play();
    assert_eq!(rig.trigger_frames(4001), vec![0, 2500, 4000]);
}

#[test]
fn volume_envelope_fades_arrangement_voices() {
    let song = |with_fade: bool| {
        let mut project = Project::new("song", 120.0);
        project.view_mode = ViewMode::Arrangement;
        project.timeline.length_beats = Some(4.0);
        project
            .tracks
            .push(TrackDescriptor::new("keys", InstrumentType::Organ));
        project.events = vec![NoteEvent::new(0.0, 60, 1.0, "keys")];
        project.envelopes.push(EnvelopeDefinition {
            id: "fade".into(),
            target: EnvelopeTarget::Volume,
            curve: Curve {
                start: 1.0,
                end: 0.0,
                shape: CurveShape::Linear,
            },
        });
        if with_fade {
            project.timeline.envelopes.push(Placement {
                definition_id: "fade".into(),
                start_beat: 0.0,
                duration: 4.0,
                pattern_id: None,
            });
        }
        project
    };

    let mut plain = Rig::new(song(false));
    let mut faded = Rig::new(song(true));
    plain.play();
    faded.play();
    let plain = left(&plain.render(1900));
    let faded = left(&faded.render(1900));

    let tail = 1800..1900;
    assert!(rms(&plain[tail.clone()]) > 0.01);
    assert!(rms(&faded[tail]) < 0.15 * rms(&plain[1800..1900]));
}

#[test]
fn position_updates_are_throttled() {
    let mut rig = Rig::new(four_kicks(120.0));
    rig.play();
    rig.render(500);
    let positions: Vec<f64> = rig
        .updates
        .try_iter()
        .filter_map(|update| match update {
            EngineUpdate::PlaybackPosition { beat } => Some(beat),
            _ => None,
        })
        .collect();
    // 50 ms at 1 kHz is one update every 50 frames.
    assert_eq!(positions.len(), 10);
    assert_eq!(positions[0], 0.1);
}
