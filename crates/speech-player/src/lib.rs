//! Decoding and playback of generated speech clips.
//!
//! A text-to-speech service hands back headerless 16-bit PCM as base64 text.
//! [`pcm`] turns that into a normalized, per-channel [`DecodedAudio`] buffer and
//! [`controller::PlaybackController`] plays at most one such buffer at a time
//! through an [`AudioSink`].

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod history;
pub mod pcm;
pub mod playback;
pub mod resample;
pub mod sink;

pub use controller::{PlayOutcome, PlaybackController, PlaybackState};
pub use error::{DecodeError, PlaybackError};
pub use history::{AudioEntry, EntryId, EntryStatus, SpeechHistory};
pub use pcm::{DecodedAudio, EncodedAudio, MAX_CHANNELS, TTS_CHANNELS, TTS_SAMPLE_RATE};
pub use playback::CpalSink;
pub use sink::{AudioSink, Completion, CompletionHook, SessionId};
