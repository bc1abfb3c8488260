use crate::pcm::{TTS_CHANNELS, TTS_SAMPLE_RATE};

/// Output and format parameters shared by decode/resample/playback stages.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackConfig {
    /// Output device name substring; `None` uses the host default.
    pub device: Option<String>,
    /// Resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Sample rate of the incoming PCM.
    pub sample_rate: u32,
    /// Channel count of the incoming PCM.
    pub channels: usize,
}

impl Default for PlaybackConfig {
    /// Defaults match the speech service's output format.
    fn default() -> Self {
        Self {
            device: None,
            chunk_frames: 1024,
            sample_rate: TTS_SAMPLE_RATE,
            channels: TTS_CHANNELS,
        }
    }
}
