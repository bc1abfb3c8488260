//! Error types for decoding and playback.

use thiserror::Error;

/// Malformed encoded audio. Decoding is all-or-nothing, so this is permanent for
/// the input that produced it.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("truncated sample stream: {len} bytes is not a whole number of 16-bit samples")]
    TruncatedSampleStream { len: usize },

    #[error("invalid channel count: {0}")]
    InvalidChannelCount(usize),

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),
}

/// Failure to get a buffer rendering on the output.
///
/// The controller stays idle when this is returned; callers may retry `play`.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("output device unavailable: {message}")]
    Device { message: String },

    #[error("failed to schedule buffer: {message}")]
    Schedule { message: String },

    #[error("unsupported output sample format: {format}")]
    UnsupportedFormat { format: String },
}
