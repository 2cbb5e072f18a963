mod pattern;
mod scheduler;
mod transport;

pub use pattern::{DEFAULT_METER, DEFAULT_PITCH, DEFAULT_VELOCITY, PatternNode, flatten};
pub use scheduler::{ScheduleWindow, ScheduledNote, Scheduler, ViewMode};
pub use transport::{MAX_BPM, MIN_BPM, Transport, TransportState};
