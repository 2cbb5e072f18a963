mod envelope;
mod filter;
mod instrument;
mod mixer;
mod oscillator;
mod track;
mod voice;

pub mod synth;

pub use envelope::{Adsr, AdsrOverride, AmpEnvelope, EnvelopeStage};
pub use filter::{LowPass, OnePole, OnePoleMode};
pub use instrument::{InstrumentSettings, InstrumentType, Wave};
pub use mixer::{Frame, mix_sample, pan_to_gains};
pub use oscillator::{Noise, Oscillator, Phase, midi_to_freq, waveform};
pub use track::{ResolvedMix, TrackState, TrackStateRegistry};
pub use voice::Voice;
