//! Headerless PCM decode stage.
//!
//! The speech service returns mono, 16-bit signed little-endian PCM at 24 kHz as
//! base64 text, with no container. The format is known out-of-band, so callers
//! pass the sample rate and channel count explicitly.
//!
//! Decoding is a pure transformation:
//! - base64 text (optionally wrapped in a `data:` URL) → bytes
//! - bytes → interleaved `i16` samples
//! - interleaved samples → one `f32` vector per channel, normalized by `1/32768`

use std::borrow::Cow;
use std::time::Duration;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;

use crate::error::DecodeError;

/// Sample rate of speech produced by the TTS service.
pub const TTS_SAMPLE_RATE: u32 = 24_000;
/// Channel count of speech produced by the TTS service.
pub const TTS_CHANNELS: usize = 1;

/// Largest channel count accepted, matching the width of an output device's channel count.
pub const MAX_CHANNELS: usize = u16::MAX as usize;

/// Divisor mapping `i16::MIN` to exactly `-1.0` and `i16::MAX` just below `1.0`.
const I16_SCALE: f32 = 32_768.0;

/// Standard alphabet, no padding, stray trailing bits ignored. Padding is stripped
/// beforehand by [`strip_padding`].
const FORGIVING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// Immutable base64 text holding raw PCM, as stored next to a history entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedAudio(String);

impl EncodedAudio {
    /// Wrap base64 text (or a `data:` URL carrying it).
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The base64 payload without any `data:` prefix.
    pub fn base64(&self) -> &str {
        strip_data_url(&self.0)
    }

    /// Render as a `data:audio/pcm;base64,` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:audio/pcm;base64,{}", self.base64())
    }

    /// Decode into a playable buffer.
    pub fn decode(&self, sample_rate: u32, channels: usize) -> Result<DecodedAudio, DecodeError> {
        decode_pcm_base64(&self.0, sample_rate, channels)
    }
}

/// Normalized multi-channel audio, every channel holding `frame_count` samples in `[-1.0, 1.0)`.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudio {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Samples for one channel, or `None` if `index` is out of range.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Sample at `(frame, channel)`.
    pub fn sample(&self, frame: usize, channel: usize) -> Option<f32> {
        self.channels.get(channel)?.get(frame).copied()
    }

    /// Playback length at the buffer's own sample rate.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Re-interleave channels (`frame0[ch0], frame0[ch1], ...`) for output stages.
    pub fn interleaved(&self) -> Vec<f32> {
        let channels = self.channel_count();
        let mut out = Vec::with_capacity(self.frame_count() * channels);
        for frame in 0..self.frame_count() {
            for ch in &self.channels {
                out.push(ch[frame]);
            }
        }
        out
    }
}

/// Decode standard base64 into bytes.
///
/// Follows `atob`: ASCII whitespace is skipped, and one or two trailing `=` are
/// dropped only when the remaining length is a multiple of four. Any other `=` or
/// character outside the alphabet fails.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: Cow<'_, str> = if text.bytes().any(|b| b.is_ascii_whitespace()) {
        Cow::Owned(text.chars().filter(|c| !c.is_ascii_whitespace()).collect())
    } else {
        Cow::Borrowed(text)
    };
    Ok(FORGIVING.decode(strip_padding(&compact).as_bytes())?)
}

fn strip_padding(text: &str) -> &str {
    if text.len() % 4 != 0 {
        return text;
    }
    text.strip_suffix("==")
        .or_else(|| text.strip_suffix('='))
        .unwrap_or(text)
}

/// Turn raw interleaved 16-bit LE PCM into a [`DecodedAudio`].
///
/// Samples left over after the last whole frame are dropped. An empty input yields an
/// empty buffer.
pub fn decode_audio_data(
    bytes: &[u8],
    sample_rate: u32,
    channels: usize,
) -> Result<DecodedAudio, DecodeError> {
    if !(1..=MAX_CHANNELS).contains(&channels) {
        return Err(DecodeError::InvalidChannelCount(channels));
    }
    if sample_rate == 0 {
        return Err(DecodeError::InvalidSampleRate(sample_rate));
    }
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::TruncatedSampleStream { len: bytes.len() });
    }

    let sample_count = bytes.len() / 2;
    let frame_count = sample_count / channels;
    let dropped = sample_count - frame_count * channels;
    if dropped > 0 {
        tracing::debug!(dropped, channels, "dropping incomplete trailing frame");
    }

    let sample_at = |idx: usize| {
        let i16_val = i16::from_le_bytes([bytes[idx * 2], bytes[idx * 2 + 1]]);
        f32::from(i16_val) / I16_SCALE
    };

    let planes = (0..channels)
        .map(|ch| {
            (0..frame_count)
                .map(|frame| sample_at(frame * channels + ch))
                .collect()
        })
        .collect();

    Ok(DecodedAudio {
        sample_rate,
        channels: planes,
    })
}

/// Return the payload of a `data:...;base64,` URL, or `text` unchanged.
pub fn strip_data_url(text: &str) -> &str {
    let trimmed = text.trim_start();
    if !trimmed.starts_with("data:") {
        return text;
    }
    match trimmed.split_once(',') {
        Some((_, payload)) => payload,
        None => text,
    }
}

/// Full path from stored text to a playable buffer.
pub fn decode_pcm_base64(
    text: &str,
    sample_rate: u32,
    channels: usize,
) -> Result<DecodedAudio, DecodeError> {
    let bytes = decode_base64(strip_data_url(text))?;
    decode_audio_data(&bytes, sample_rate, channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn mono_frame_count_is_half_the_byte_length() {
        let bytes = pcm_bytes(&[0, 1, -1, 1024, -2048, 7]);
        let buf = decode_audio_data(&bytes, TTS_SAMPLE_RATE, 1).unwrap();
        assert_eq!(buf.channel_count(), 1);
        assert_eq!(buf.frame_count(), bytes.len() / 2);
        assert_eq!(buf.sample_rate(), 24_000);
    }

    #[test]
    fn odd_length_is_truncated_stream() {
        let err = decode_audio_data(&[0x00, 0x04, 0x01], TTS_SAMPLE_RATE, 1).unwrap_err();
        assert!(matches!(err, DecodeError::TruncatedSampleStream { len: 3 }));
    }

    #[test]
    fn zero_channels_is_rejected() {
        let err = decode_audio_data(&[0, 0], TTS_SAMPLE_RATE, 0).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidChannelCount(0)));
    }

    #[test]
    fn oversized_channel_count_is_rejected() {
        let err = decode_audio_data(&[0, 0], TTS_SAMPLE_RATE, usize::MAX).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidChannelCount(usize::MAX)));

        let err = decode_audio_data(&[], TTS_SAMPLE_RATE, MAX_CHANNELS + 1).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidChannelCount(n) if n == MAX_CHANNELS + 1));
    }

    #[test]
    fn max_channel_count_is_accepted() {
        let buf = decode_audio_data(&[], TTS_SAMPLE_RATE, MAX_CHANNELS).unwrap();
        assert_eq!(buf.channel_count(), MAX_CHANNELS);
        assert_eq!(buf.frame_count(), 0);
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let err = decode_audio_data(&[0, 0], 0, 1).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidSampleRate(0)));
    }

    #[test]
    fn extremes_normalize_without_overshoot() {
        let bytes = pcm_bytes(&[i16::MIN, i16::MAX, 0]);
        let buf = decode_audio_data(&bytes, TTS_SAMPLE_RATE, 1).unwrap();
        let ch = buf.channel(0).unwrap();
        assert_eq!(ch[0], -1.0);
        assert_eq!(ch[1], 32_767.0 / 32_768.0);
        assert!(ch[1] < 1.0);
        assert!((ch[1] - 0.999_969_5).abs() < 1e-6);
        assert_eq!(ch[2], 0.0);
    }

    #[test]
    fn stereo_is_deinterleaved() {
        let bytes = pcm_bytes(&[100, -100, 200, -200]);
        let buf = decode_audio_data(&bytes, TTS_SAMPLE_RATE, 2).unwrap();
        assert_eq!(buf.frame_count(), 2);
        assert_eq!(
            buf.channel(0).unwrap(),
            &[100.0f32 / 32_768.0, 200.0 / 32_768.0]
        );
        assert_eq!(
            buf.channel(1).unwrap(),
            &[-100.0f32 / 32_768.0, -200.0 / 32_768.0]
        );
    }

    #[test]
    fn incomplete_trailing_frame_is_dropped() {
        let bytes = pcm_bytes(&[1, 2, 3, 4, 5]);
        let buf = decode_audio_data(&bytes, TTS_SAMPLE_RATE, 2).unwrap();
        assert_eq!(buf.frame_count(), 2);
        assert_eq!(buf.channel(0).unwrap(), &[1.0f32 / 32_768.0, 3.0 / 32_768.0]);
        assert_eq!(buf.channel(1).unwrap(), &[2.0f32 / 32_768.0, 4.0 / 32_768.0]);
    }

    #[test]
    fn empty_input_is_an_empty_buffer() {
        let buf = decode_audio_data(&[], TTS_SAMPLE_RATE, 1).unwrap();
        assert_eq!(buf.frame_count(), 0);
        assert_eq!(buf.channel_count(), 1);
        assert!(buf.is_empty());
        assert_eq!(buf.duration(), Duration::ZERO);
    }

    #[test]
    fn base64_roundtrip_recovers_bytes() {
        let original: Vec<u8> = (0..=255u8).chain([0, 1, 2]).collect();
        for len in [0, 1, 2, 3, 4, 5, original.len()] {
            let encoded = STANDARD.encode(&original[..len]);
            assert_eq!(decode_base64(&encoded).unwrap(), &original[..len]);
        }
    }

    #[test]
    fn base64_accepts_missing_padding_and_whitespace() {
        assert_eq!(decode_base64("AAE").unwrap(), vec![0x00, 0x01]);
        assert_eq!(decode_base64("AAE=").unwrap(), vec![0x00, 0x01]);
        assert_eq!(decode_base64(" AA\nE=\r\n").unwrap(), vec![0x00, 0x01]);
    }

    #[test]
    fn base64_padding_only_counts_on_whole_quads() {
        assert_eq!(decode_base64("QQ==").unwrap(), vec![0x41]);
        assert_eq!(decode_base64("QQ").unwrap(), vec![0x41]);
        assert!(matches!(decode_base64("QQ="), Err(DecodeError::Base64(_))));
        assert!(matches!(decode_base64("AAE=="), Err(DecodeError::Base64(_))));
        assert!(matches!(decode_base64("AA=A"), Err(DecodeError::Base64(_))));
        assert!(matches!(decode_base64("===="), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn base64_rejects_foreign_characters() {
        assert!(matches!(decode_base64("AA*E"), Err(DecodeError::Base64(_))));
        assert!(matches!(decode_base64("AAE-"), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn strip_data_url_returns_payload() {
        assert_eq!(strip_data_url("data:audio/pcm;base64,AAE="), "AAE=");
        assert_eq!(strip_data_url("AAE="), "AAE=");
    }

    #[test]
    fn decode_pcm_base64_handles_data_url() {
        let payload = STANDARD.encode(pcm_bytes(&[i16::MIN, 16_384]));
        let url = format!("data:audio/pcm;base64,{payload}");
        let buf = decode_pcm_base64(&url, TTS_SAMPLE_RATE, TTS_CHANNELS).unwrap();
        assert_eq!(buf.channel(0).unwrap(), &[-1.0f32, 0.5]);
    }

    #[test]
    fn encoded_audio_data_url_roundtrip() {
        let audio = EncodedAudio::new("AAE=");
        let url = audio.to_data_url();
        assert_eq!(url, "data:audio/pcm;base64,AAE=");
        assert_eq!(EncodedAudio::new(url).base64(), "AAE=");
    }

    #[test]
    fn interleaved_matches_source_order() {
        let bytes = pcm_bytes(&[100, -100, 200, -200]);
        let buf = decode_audio_data(&bytes, TTS_SAMPLE_RATE, 2).unwrap();
        let expected: Vec<f32> = [100i16, -100, 200, -200]
            .iter()
            .map(|s| f32::from(*s) / 32_768.0)
            .collect();
        assert_eq!(buf.interleaved(), expected);
    }

    #[test]
    fn duration_follows_sample_rate() {
        let bytes = vec![0u8; 24_000 * 2];
        let buf = decode_audio_data(&bytes, TTS_SAMPLE_RATE, 1).unwrap();
        assert_eq!(buf.duration(), Duration::from_secs(1));
    }
}
