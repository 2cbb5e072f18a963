use arc_swap::ArcSwap;
use beatforge::{
    EngineCommand, EngineConfig, EngineHandle, EngineUpdate, Project,
    output::start_output,
    timing::{MAX_BPM, MIN_BPM, TransportState},
};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const TEMPO_STEP: f64 = 5.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if !(2..=3).contains(&args.len()) {
        eprintln!("Usage: {} <project.ron> [config.ron]", args[0]);
        std::process::exit(1);
    }

    let project_path = PathBuf::from(&args[1]);
    let config = match args.get(2) {
        Some(path) => EngineConfig::load(Path::new(path))?,
        None => EngineConfig::default(),
    };

    let project = Project::load(&project_path)?;
    let snapshot = Arc::new(ArcSwap::from_pointee(project.clone()));

    let (_output, engine) = start_output(config)?;
    engine.send(EngineCommand::LoadProject(Box::new(project)))?;

    let _watcher = watch_project(&project_path, engine.clone(), snapshot.clone())?;

    println!("Watching {} - edit and save to reload", project_path.display());
    println!("space: play/pause  s: stop  +/-: tempo  m: mute first track  q: quit");

    terminal::enable_raw_mode()?;
    let result = run_transport(&engine, &snapshot);
    terminal::disable_raw_mode()?;
    result
}

fn watch_project(
    path: &Path,
    engine: EngineHandle,
    snapshot: Arc<ArcSwap<Project>>,
) -> notify::Result<RecommendedWatcher> {
    let reload_path = path.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) if event.kind.is_modify() => match Project::load(&reload_path) {
                Ok(project) => {
                    snapshot.store(Arc::new(project.clone()));
                    match engine.send(EngineCommand::LoadProject(Box::new(project))) {
                        Ok(()) => tracing::info!(path = %reload_path.display(), "project reloaded"),
                        Err(err) => tracing::warn!(%err, "reload dropped"),
                    }
                }
                Err(err) => tracing::warn!(%err, "project reload failed"),
            },
            Ok(_) => {}
            Err(err) => tracing::warn!(%err, "watch error"),
        },
        Config::default(),
    )?;

    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Keyboard transport. Returns when the user quits.
fn run_transport(
    engine: &EngineHandle,
    snapshot: &ArcSwap<Project>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut state = TransportState::Stopped;
    let mut bpm = snapshot.load().bpm;
    let mut muted = snapshot.load().tracks.first().is_some_and(|t| t.mute);

    loop {
        for update in engine.updates().try_iter() {
            match update {
                EngineUpdate::TransportChanged { state: changed } => state = changed,
                EngineUpdate::ProjectLoaded { tracks } => {
                    let project = snapshot.load();
                    bpm = project.bpm;
                    muted = project.tracks.first().is_some_and(|t| t.mute);
                    tracing::debug!(tracks, "engine took the project");
                }
                EngineUpdate::PlaybackUpdate { beat, triggered } => {
                    tracing::trace!(beat, count = triggered.len(), "notes fired")
                }
                EngineUpdate::PlaybackPosition { beat } => tracing::trace!(beat, "position"),
            }
        }

        if !event::poll(Duration::from_millis(20))? {
            continue;
        }
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event::read()?
        else {
            continue;
        };

        let command = match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
            KeyCode::Char(' ') => {
                state = if state == TransportState::Playing {
                    TransportState::Paused
                } else {
                    TransportState::Playing
                };
                EngineCommand::SetTransport {
                    state,
                    position: None,
                }
            }
            KeyCode::Char('s') => {
                state = TransportState::Stopped;
                EngineCommand::SetTransport {
                    state,
                    position: None,
                }
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                bpm = (bpm + TEMPO_STEP).min(MAX_BPM);
                EngineCommand::SetTempo(bpm)
            }
            KeyCode::Char('-') => {
                bpm = (bpm - TEMPO_STEP).max(MIN_BPM);
                EngineCommand::SetTempo(bpm)
            }
            KeyCode::Char('m') => {
                let project = snapshot.load();
                let Some(track) = project.tracks.first() else {
                    continue;
                };
                muted = !muted;
                EngineCommand::UpdateTrackMute {
                    track_id: track.id.clone(),
                    value: muted,
                }
            }
            _ => continue,
        };

        if let Err(err) = engine.send(command) {
            tracing::warn!(%err, "command dropped");
        }
    }
}
