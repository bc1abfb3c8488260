use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "titan-speak", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Gemini API key (falls back to the config file, then GEMINI_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Speech model name
    #[arg(long)]
    pub model: Option<String>,

    /// Prebuilt voice name
    #[arg(long)]
    pub voice: Option<String>,

    /// Sample rate of the incoming PCM
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Channel count of the incoming PCM
    #[arg(long)]
    pub channels: Option<usize>,

    /// Resampler input chunk size in frames
    #[arg(long)]
    pub chunk_frames: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synthesize TEXT and play it
    Speak {
        text: String,
    },

    /// Play base64 PCM (or a data URL) from FILE, or stdin with `-`
    Play {
        path: PathBuf,
    },

    /// Interactive session: type text to synthesize, `:help` for commands
    Session,

    /// List output devices and exit
    Devices,
}
