//! Configuration loading and resolution.
//!
//! Values come from command-line flags, then the TOML file, then built-in
//! defaults. The API key additionally falls back to `GEMINI_API_KEY`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use speech_player::config::PlaybackConfig;

use crate::cli::Args;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_VOICE: &str = "Kore";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Top-level config file schema. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeakConfig {
    /// Gemini API key.
    pub api_key: Option<String>,
    /// API root, without the `/v1beta` path.
    pub api_base_url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    /// Output device substring match.
    pub device: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
    pub chunk_frames: Option<usize>,
}

impl SpeakConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<SpeakConfig>(raw)?)
    }
}

/// Speech service settings after merging flags, file and environment.
#[derive(Clone, Debug, PartialEq)]
pub struct TtsSettings {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub model: String,
    pub voice: String,
}

/// Fully resolved settings for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub tts: TtsSettings,
    pub playback: PlaybackConfig,
}

impl Settings {
    pub fn resolve(args: &Args, file: SpeakConfig, env_api_key: Option<String>) -> Self {
        let defaults = PlaybackConfig::default();
        let api_key = args
            .api_key
            .clone()
            .or(file.api_key)
            .or(env_api_key)
            .filter(|k| !k.trim().is_empty());
        let api_base_url = file
            .api_base_url
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            tts: TtsSettings {
                api_key,
                api_base_url,
                model: args
                    .model
                    .clone()
                    .or(file.model)
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                voice: args
                    .voice
                    .clone()
                    .or(file.voice)
                    .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            },
            playback: PlaybackConfig {
                device: args.device.clone().or(file.device),
                chunk_frames: args
                    .chunk_frames
                    .or(file.chunk_frames)
                    .unwrap_or(defaults.chunk_frames),
                sample_rate: args
                    .sample_rate
                    .or(file.sample_rate)
                    .unwrap_or(defaults.sample_rate),
                channels: args.channels.or(file.channels).unwrap_or(defaults.channels),
            },
        }
    }
}

/// Load the file named by `--config`, or an empty config when none was given.
pub fn load_settings(args: &Args) -> Result<Settings> {
    let file = match &args.config {
        Some(path) => SpeakConfig::load(path)?,
        None => SpeakConfig::default(),
    };
    Ok(Settings::resolve(args, file, std::env::var(API_KEY_ENV).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["titan-speak"];
        argv.extend_from_slice(extra);
        argv.push("devices");
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let settings = Settings::resolve(&args(&[]), SpeakConfig::default(), None);
        assert_eq!(settings.tts.model, DEFAULT_MODEL);
        assert_eq!(settings.tts.voice, DEFAULT_VOICE);
        assert_eq!(settings.tts.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(settings.tts.api_key, None);
        assert_eq!(settings.playback, PlaybackConfig::default());
    }

    #[test]
    fn parses_toml_keys() {
        let file = SpeakConfig::parse(
            r#"
            api_key = "file-key"
            api_base_url = "http://localhost:8080/"
            voice = "Puck"
            device = "USB"
            sample_rate = 16000
            channels = 2
            chunk_frames = 512
            "#,
        )
        .unwrap();
        let settings = Settings::resolve(&args(&[]), file, None);
        assert_eq!(settings.tts.api_key.as_deref(), Some("file-key"));
        assert_eq!(settings.tts.api_base_url, "http://localhost:8080");
        assert_eq!(settings.tts.voice, "Puck");
        assert_eq!(settings.playback.device.as_deref(), Some("USB"));
        assert_eq!(settings.playback.sample_rate, 16_000);
        assert_eq!(settings.playback.channels, 2);
        assert_eq!(settings.playback.chunk_frames, 512);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(SpeakConfig::parse("volume = 11").is_err());
    }

    #[test]
    fn flags_override_file() {
        let file = SpeakConfig {
            voice: Some("Puck".to_string()),
            sample_rate: Some(16_000),
            ..SpeakConfig::default()
        };
        let settings = Settings::resolve(
            &args(&["--voice", "Charon", "--sample-rate", "48000"]),
            file,
            None,
        );
        assert_eq!(settings.tts.voice, "Charon");
        assert_eq!(settings.playback.sample_rate, 48_000);
    }

    #[test]
    fn api_key_precedence_is_flag_then_file_then_env() {
        let env = Some("env-key".to_string());
        let file = || SpeakConfig {
            api_key: Some("file-key".to_string()),
            ..SpeakConfig::default()
        };

        let s = Settings::resolve(&args(&["--api-key", "flag-key"]), file(), env.clone());
        assert_eq!(s.tts.api_key.as_deref(), Some("flag-key"));

        let s = Settings::resolve(&args(&[]), file(), env.clone());
        assert_eq!(s.tts.api_key.as_deref(), Some("file-key"));

        let s = Settings::resolve(&args(&[]), SpeakConfig::default(), env);
        assert_eq!(s.tts.api_key.as_deref(), Some("env-key"));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let s = Settings::resolve(&args(&[]), SpeakConfig::default(), Some("  ".to_string()));
        assert_eq!(s.tts.api_key, None);
    }
}
