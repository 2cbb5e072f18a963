use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::{
    EngineConfig, EngineError,
    engine::{EngineHandle, engine_channel},
};

/// A playing output stream. Audio stops when this is dropped.
pub struct Output {
    _stream: cpal::Stream,
    pub sample_rate: u32,
    pub channels: usize,
}

/// Opens the default output device and moves a fresh engine into its
/// callback. The returned handle is the only way to reach that engine.
pub fn start_output(config: EngineConfig) -> Result<(Output, EngineHandle), EngineError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(EngineError::NoDevice)?;
    let supported = device.default_output_config()?;
    let sample_format = supported.sample_format();
    if sample_format != cpal::SampleFormat::F32 {
        return Err(EngineError::UnsupportedFormat(sample_format));
    }
    let stream_config: cpal::StreamConfig = supported.into();

    let sample_rate = stream_config.sample_rate;
    let channels = stream_config.channels as usize;
    tracing::info!(channels, sample_rate, "audio output");

    let (handle, mut realtime) = engine_channel(sample_rate, config);
    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            realtime.process(data, channels);
        },
        |err| tracing::error!(%err, "audio stream error"),
        None,
    )?;

    stream.play()?;

    Ok((
        Output {
            _stream: stream,
            sample_rate,
            channels,
        },
        handle,
    ))
}
