pub mod audio;
pub mod automation;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod output;
pub mod project;
pub mod timing;

pub use config::EngineConfig;
pub use engine::{Engine, EngineCommand, EngineHandle, EngineUpdate, RealtimeEngine, engine_channel};
pub use error::{EngineError, ProjectError};
pub use project::{Project, Timeline, TrackDescriptor};
