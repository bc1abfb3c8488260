//! Whole-clip resample stage.
//!
//! Uses Rubato to convert a decoded clip's interleaved `f32` samples from its own
//! rate to the output device rate before the stream is built. Clips are short, so
//! this runs synchronously on the caller's thread.

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::error::PlaybackError;

/// Resample interleaved `src` from `src_rate` to `dst_rate`.
///
/// Returns `src` unchanged when the rates already match.
pub fn resample_interleaved(
    src: Vec<f32>,
    channels: usize,
    src_rate: u32,
    dst_rate: u32,
    chunk_frames: usize,
) -> Result<Vec<f32>, PlaybackError> {
    if src_rate == dst_rate || src.is_empty() {
        return Ok(src);
    }
    let channels = channels.max(1);
    let f_ratio = dst_rate as f64 / src_rate as f64;

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };

    let chunk_in_frames = chunk_frames.max(1);
    let mut resampler = Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &params,
        chunk_in_frames,
        channels,
        FixedAsync::Input,
    )
    .map_err(schedule_error("resampler init"))?;

    let out_chunk_frames = resampler.output_frames_max();
    let mut out_chunk = vec![0.0f32; out_chunk_frames * channels];
    let total_frames = src.len() / channels;
    let expected_frames = (total_frames as f64 * f_ratio).ceil() as usize;
    let delay_frames = resampler.output_delay();
    let mut out =
        Vec::with_capacity((delay_frames + expected_frames + out_chunk_frames) * channels);

    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    for chunk in src.chunks(chunk_in_frames * channels) {
        let frames = chunk.len() / channels;
        if frames == 0 {
            continue;
        }
        // Rubato zero-pads a short final chunk when `partial_len` is set.
        indexing.partial_len = (frames < chunk_in_frames).then_some(frames);

        let input_adapter = InterleavedSlice::new(chunk, channels, frames)
            .map_err(schedule_error("interleaved slice (input)"))?;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut out_chunk, channels, out_chunk_frames)
                .map_err(schedule_error("interleaved slice (output)"))?;

        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(schedule_error("resampler process"))?;

        out.extend_from_slice(&out_chunk[..nbr_out * channels]);
    }

    // Pump silence until the sinc delay has pushed the tail out.
    indexing.partial_len = Some(0);
    let empty: [f32; 0] = [];
    while out.len() / channels < delay_frames + expected_frames {
        let input_adapter = InterleavedSlice::new(&empty[..], channels, 0)
            .map_err(schedule_error("interleaved slice (flush)"))?;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut out_chunk, channels, out_chunk_frames)
                .map_err(schedule_error("interleaved slice (output)"))?;
        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(schedule_error("resampler flush"))?;
        if nbr_out == 0 {
            break;
        }
        out.extend_from_slice(&out_chunk[..nbr_out * channels]);
    }

    let out = trim_delay(out, channels, delay_frames, expected_frames);
    tracing::debug!(
        src_rate,
        dst_rate,
        in_frames = total_frames,
        out_frames = out.len() / channels,
        delay_frames,
        "clip resampled"
    );
    Ok(out)
}

/// Drop the leading `delay_frames` and keep at most `frames` after them.
fn trim_delay(
    mut out: Vec<f32>,
    channels: usize,
    delay_frames: usize,
    frames: usize,
) -> Vec<f32> {
    let start = (delay_frames * channels).min(out.len());
    out.drain(..start);
    out.truncate(frames * channels);
    out
}

fn schedule_error<E: std::fmt::Display>(stage: &'static str) -> impl Fn(E) -> PlaybackError {
    move |e| PlaybackError::Schedule {
        message: format!("{stage}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_rates_pass_through() {
        let src = vec![0.1, -0.2, 0.3];
        let out = resample_interleaved(src.clone(), 1, 24_000, 24_000, 1024).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn empty_clip_passes_through() {
        let out = resample_interleaved(Vec::new(), 1, 24_000, 48_000, 1024).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn trim_delay_drops_leading_frames() {
        let out = trim_delay(vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0], 2, 1, 2);
        assert_eq!(out, vec![1.0f32, 2.0, 3.0, 4.0]);
        assert!(trim_delay(vec![0.0; 2], 1, 4, 3).is_empty());
    }

    fn sine(frames: usize, channels: usize, rate: u32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let t = i as f32 / rate as f32;
                let v = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
                std::iter::repeat_n(v, channels)
            })
            .collect()
    }

    fn assert_upsampled(channels: usize) {
        // Three whole chunks plus a short final one.
        let frames = 3 * 256 + 100;
        let src = sine(frames, channels, 24_000);
        let out = resample_interleaved(src, channels, 24_000, 48_000, 256).unwrap();
        assert_eq!(out.len() % channels, 0);
        assert_eq!(out.len() / channels, frames * 2);
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }

    #[test]
    fn upsamples_mono_across_chunks() {
        assert_upsampled(1);
    }

    #[test]
    fn upsamples_stereo_across_chunks() {
        assert_upsampled(2);
    }

    #[test]
    fn delay_is_trimmed_from_the_front() {
        // A clip that starts at full scale must not open with the sinc delay's silence.
        let frames = 2_000;
        let out = resample_interleaved(vec![0.5; frames], 1, 24_000, 48_000, 512).unwrap();
        assert_eq!(out.len(), frames * 2);
        let mid = out[frames];
        assert!((mid - 0.5).abs() < 0.01, "mid sample {mid}");
        assert!(out[..32].iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn downsamples_short_clip() {
        let out = resample_interleaved(sine(300, 1, 48_000), 1, 48_000, 24_000, 1024).unwrap();
        assert_eq!(out.len(), 150);
    }
}
