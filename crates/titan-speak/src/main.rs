//! Titan Speak: text-to-speech playback from the command line.
//!
//! Generates speech with the Gemini TTS model (or reads stored base64 PCM),
//! decodes it with `speech-player`, and plays it through CPAL.
//!
//! ## Commands
//! - `speak`: synthesize one utterance and play it.
//! - `play`: play base64 PCM from a file or stdin.
//! - `session`: interactive history of generated clips.
//! - `devices`: list output devices.

mod cli;
mod config;
mod session;
mod tts;

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use speech_player::device::list_device_infos;
use speech_player::{CpalSink, EncodedAudio, EntryId, PlayOutcome, PlaybackController};
use tracing_subscriber::EnvFilter;

use crate::config::Settings;

const WAIT_SLICE: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,titan_speak=info,speech_player=info")
        }))
        .init();

    let settings = config::load_settings(&args)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("install Ctrl-C handler")?;

    match &args.cmd {
        cli::Command::Devices => list_devices(),
        cli::Command::Speak { text } => {
            let client = tts::TtsClient::new(&settings.tts)?;
            let audio = client.synthesize(text)?;
            play_to_end(&settings, &audio, &interrupted)
        }
        cli::Command::Play { path } => {
            let audio = read_encoded(path)?;
            play_to_end(&settings, &audio, &interrupted)
        }
        cli::Command::Session => session::run(&settings, interrupted),
    }
}

fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    let devices = list_device_infos(&host)?;
    if devices.is_empty() {
        println!("no output devices");
    }
    for d in devices {
        let marker = if d.is_default { "*" } else { " " };
        println!("{marker} {} ({}-{} Hz)", d.name, d.min_rate, d.max_rate);
    }
    Ok(())
}

fn read_encoded(path: &Path) -> Result<EncodedAudio> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?
    };
    Ok(EncodedAudio::new(text))
}

/// Play one clip and block until it ends or Ctrl-C stops it.
fn play_to_end(settings: &Settings, audio: &EncodedAudio, interrupted: &AtomicBool) -> Result<()> {
    let playback = &settings.playback;
    let buffer = audio
        .decode(playback.sample_rate, playback.channels)
        .context("decode audio")?;
    tracing::info!(
        frames = buffer.frame_count(),
        channels = buffer.channel_count(),
        duration_ms = buffer.duration().as_millis() as u64,
        "decoded clip"
    );

    let mut controller = PlaybackController::new(CpalSink::new(playback.clone()));
    controller.on_ended(|entry| tracing::info!(entry = %entry, "playback finished"));

    let entry = EntryId::new(1);
    match controller.play(entry, Arc::new(buffer))? {
        PlayOutcome::Started(session) => tracing::debug!(session = %session, "started"),
        other => tracing::warn!(?other, "unexpected play outcome"),
    }

    while controller.current().is_some() {
        if interrupted.swap(false, Ordering::SeqCst) {
            controller.stop();
            break;
        }
        controller.wait(WAIT_SLICE);
    }
    Ok(())
}
