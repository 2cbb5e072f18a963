use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no output device available")]
    NoDevice,
    #[error("could not query the default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("unsupported sample format {0}")]
    UnsupportedFormat(cpal::SampleFormat),
    #[error("could not build the output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("could not start the output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("engine command queue is full")]
    QueueFull,
}

/// Failures reading or writing RON files (projects and engine configs).
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("serialize error: {0}")]
    Serialize(#[from] ron::Error),
}
