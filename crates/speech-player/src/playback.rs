//! Playback stage (CPAL output stream).
//!
//! [`CpalSink`] implements [`AudioSink`] on the host's audio backend. Each scheduled
//! clip gets its own output stream whose callback:
//! - walks a pre-resampled interleaved copy of the clip
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - converts `f32` samples to the device sample format
//! - fires the completion hook once the last frame has left the device buffer

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::PlaybackConfig;
use crate::device;
use crate::error::PlaybackError;
use crate::pcm::DecodedAudio;
use crate::resample;
use crate::sink::{AudioSink, CompletionHook};

/// Audio sink backed by the default CPAL host.
pub struct CpalSink {
    host: cpal::Host,
    config: PlaybackConfig,
}

/// Output device and stream configuration chosen for one clip.
pub struct CpalContext {
    device: cpal::Device,
    supported: cpal::SupportedStreamConfig,
    stream_config: cpal::StreamConfig,
}

impl CpalContext {
    pub fn output_rate(&self) -> u32 {
        self.stream_config.sample_rate
    }

    pub fn output_channels(&self) -> u16 {
        self.stream_config.channels
    }
}

/// A live output stream rendering one clip.
pub struct CpalPlayback {
    stream: cpal::Stream,
    hook: CompletionHook,
}

impl CpalSink {
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            host: cpal::default_host(),
            config,
        }
    }

    pub fn host(&self) -> &cpal::Host {
        &self.host
    }
}

impl AudioSink for CpalSink {
    type Context = CpalContext;
    type Handle = CpalPlayback;

    fn create_output_context(&mut self, sample_rate: u32) -> Result<CpalContext, PlaybackError> {
        let device = device::pick_device(&self.host, self.config.device.as_deref())
            .map_err(device_error)?;
        let supported = device::pick_output_config(&device, sample_rate).map_err(device_error)?;
        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = device::pick_buffer_size(&supported) {
            stream_config.buffer_size = buf;
        }
        if let Ok(desc) = device.description() {
            tracing::info!(device = %desc, "output device");
        }
        tracing::info!(
            source_rate_hz = sample_rate,
            output_rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            buffer_size = ?stream_config.buffer_size,
            "device output config"
        );
        Ok(CpalContext {
            device,
            supported,
            stream_config,
        })
    }

    fn schedule_buffer(
        &mut self,
        context: &mut CpalContext,
        buffer: Arc<DecodedAudio>,
        hook: CompletionHook,
    ) -> Result<CpalPlayback, PlaybackError> {
        let src_channels = buffer.channel_count();
        let dst_rate = context.output_rate();
        let samples = if buffer.sample_rate() == dst_rate {
            tracing::info!(rate_hz = dst_rate, "resample skipped");
            buffer.interleaved()
        } else {
            tracing::info!(
                from_hz = buffer.sample_rate(),
                to_hz = dst_rate,
                "resampling"
            );
            resample::resample_interleaved(
                buffer.interleaved(),
                src_channels,
                buffer.sample_rate(),
                dst_rate,
                self.config.chunk_frames,
            )?
        };

        let stream = build_output_stream(
            &context.device,
            &context.stream_config,
            context.supported.sample_format(),
            ClipCursor::new(samples, src_channels),
            hook.clone(),
        )?;
        stream.play().map_err(|e| PlaybackError::Schedule {
            message: format!("start stream: {e}"),
        })?;

        Ok(CpalPlayback { stream, hook })
    }

    fn stop_buffer(&mut self, handle: CpalPlayback) {
        handle.hook.disarm();
        if let Err(e) = handle.stream.pause() {
            tracing::warn!("stream pause on stop failed: {e}");
        }
        drop(handle.stream);
    }
}

fn device_error(e: anyhow::Error) -> PlaybackError {
    PlaybackError::Device {
        message: format!("{e:#}"),
    }
}

/// Build a CPAL output stream that renders `cursor` once and then fires `hook`.
fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    cursor: ClipCursor,
    hook: CompletionHook,
) -> Result<cpal::Stream, PlaybackError> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, cursor, hook),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, cursor, hook),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, cursor, hook),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, cursor, hook),
        other => Err(PlaybackError::UnsupportedFormat {
            format: format!("{other:?}"),
        }),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut cursor: ClipCursor,
    hook: CompletionHook,
) -> Result<cpal::Stream, PlaybackError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let err_fn = |err| tracing::warn!("stream error: {err}");

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                if cursor.render(data, channels_out) {
                    hook.fire();
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| PlaybackError::Schedule {
            message: format!("build output stream: {e}"),
        })
}

/// Whole silent callbacks required after the last frame before the clip counts as played.
///
/// The callback that writes the last frames only queues them; the device is done with
/// them once it has asked for further buffers.
const TAIL_SILENT_CALLBACKS: u32 = 2;

/// Read position over a clip's interleaved samples.
struct ClipCursor {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
    silent_callbacks: u32,
}

impl ClipCursor {
    fn new(src: Vec<f32>, src_channels: usize) -> Self {
        Self {
            pos: 0,
            src_channels,
            src,
            silent_callbacks: 0,
        }
    }

    /// Fill one device buffer, padding with silence. Returns `true` once the clip's
    /// tail has been followed by [`TAIL_SILENT_CALLBACKS`] fully silent buffers.
    fn render<T>(&mut self, data: &mut [T], dst_channels: usize) -> bool
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        let written = self.fill(data, dst_channels);
        for sample in &mut data[written..] {
            *sample = <T as cpal::Sample>::from_sample::<f32>(0.0);
        }
        if written == 0 && self.is_finished() {
            self.silent_callbacks = self.silent_callbacks.saturating_add(1);
        }
        self.silent_callbacks >= TAIL_SILENT_CALLBACKS
    }

    fn is_finished(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// Write as many whole output frames as remain. Returns samples written.
    fn fill<T>(&mut self, data: &mut [T], dst_channels: usize) -> usize
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        let frames = data.len() / dst_channels.max(1);
        let mut written = 0;
        for frame in 0..frames {
            if self.is_finished() {
                break;
            }
            for ch in 0..dst_channels {
                let sample_f32 = self.next_sample_mapped(dst_channels, ch);
                data[frame * dst_channels + ch] =
                    <T as cpal::Sample>::from_sample::<f32>(sample_f32);
            }
            written = (frame + 1) * dst_channels;
        }
        written
    }

    /// Read one output sample for `dst_ch`, applying a simple channel mapping.
    ///
    /// `pos` advances once per destination frame (after the last channel).
    fn next_sample_mapped(&mut self, dst_channels: usize, dst_ch: usize) -> f32 {
        if self.is_finished() {
            return 0.0;
        }

        let frame_start = self.pos;
        let get_src = |ch: usize| -> f32 {
            if ch < self.src_channels && frame_start + ch < self.src.len() {
                self.src[frame_start + ch]
            } else {
                0.0
            }
        };

        let out = match (self.src_channels, dst_channels) {
            (1, _) => get_src(0),
            (2, 2) => get_src(dst_ch.min(1)),
            (2, 1) => 0.5 * (get_src(0) + get_src(1)),
            _ => get_src(dst_ch.min(self.src_channels.saturating_sub(1))),
        };

        if dst_ch + 1 == dst_channels {
            self.pos += self.src_channels;
        }
        out
    }
}
