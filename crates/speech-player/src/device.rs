//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing a stream config close to the clip's sample rate

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device matching `needle` (case-insensitive), or the default device.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle.filter(|n| !n.trim().is_empty()) {
        let devices = host.output_devices().context("No output devices")?;
        for d in devices {
            let matched = d
                .description()
                .ok()
                .map(|desc| matches_device_name(&desc.name(), needle))
                .unwrap_or(false);
            if matched {
                return Ok(d);
            }
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose the output config for a clip at `target_rate`.
///
/// Ranges containing the rate win outright. Otherwise the lowest rate above the
/// target is preferred over the highest below it, so speech is upsampled rather than
/// band-limited. Ties go to the better sample format.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();

    let mut best: Option<(RateFit, u8, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let fit = RateFit::new(rate, target_rate);
        let rank = sample_format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((b_fit, b_rank, _)) => fit < *b_fit || (fit == *b_fit && rank < *b_rank),
        };
        if replace {
            best = Some((fit, rank, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, _, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Prefer a fixed buffer size if the device advertises a range.
///
/// Returns `None` when the device only supports the default buffer size.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            const MAX_FRAMES: u32 = 4_096;
            Some(cpal::BufferSize::Fixed((*max).min(MAX_FRAMES).max(*min)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Lightweight output device metadata for device selection.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub min_rate: u32,
    pub max_rate: u32,
    pub is_default: bool,
}

/// Return metadata for every output device on `host`.
pub fn list_device_infos(host: &cpal::Host) -> Result<Vec<DeviceInfo>> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|desc| desc.name().to_string());

    let devices = host.output_devices().context("No output devices")?;
    let mut out = Vec::new();
    for d in devices {
        let name = match d.description() {
            Ok(desc) => desc.name().to_string(),
            Err(e) => {
                tracing::warn!("skipping device without description: {e}");
                continue;
            }
        };
        let (min_rate, max_rate) = match d.supported_output_configs() {
            Ok(ranges) => ranges.fold((u32::MAX, 0u32), |(lo, hi), r| {
                (lo.min(r.min_sample_rate()), hi.max(r.max_sample_rate()))
            }),
            Err(e) => {
                tracing::warn!(device = %name, "no output configs: {e}");
                continue;
            }
        };
        if max_rate == 0 || min_rate > max_rate {
            tracing::warn!(device = %name, "skipping device with invalid sample rate range");
            continue;
        }
        let is_default = default_name.as_deref() == Some(name.as_str());
        out.push(DeviceInfo {
            name,
            min_rate,
            max_rate,
            is_default,
        });
    }
    Ok(out)
}

/// Ordering key for a candidate rate; smaller is better.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum RateFit {
    Exact,
    Above(u32),
    Below(u32),
}

impl RateFit {
    fn new(rate: u32, target: u32) -> Self {
        if rate == target {
            RateFit::Exact
        } else if rate > target {
            RateFit::Above(rate - target)
        } else {
            RateFit::Below(target - rate)
        }
    }
}

fn clamp_rate(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
