//! Segment extraction, concatenation and output passes.
//!
//! Extraction re-encodes each keep window to a uniform intermediate
//! (H.264 / yuv420p / AAC 48 kHz) so the per-ratio assembly can stream-concat
//! without another encode. Sources may be remote; FFmpeg streams the needed
//! ranges rather than downloading the asset.

use std::path::Path;

use tokio::sync::watch;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters;

/// Encoding settings shared by every intermediate segment.
#[derive(Debug, Clone)]
pub struct SegmentEncoding {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_rate: u32,
    pub audio_bitrate: String,
}

impl Default for SegmentEncoding {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 20,
            audio_codec: "aac".to_string(),
            audio_rate: 48_000,
            audio_bitrate: "128k".to_string(),
        }
    }
}

/// Merge keep windows that touch within `join_epsilon` seconds and drop
/// windows shorter than one frame at `fps`.
///
/// Windows must already be sorted by start (the validator guarantees this
/// for plan EDLs).
pub fn normalise_keep_windows(
    windows: &[(f64, f64)],
    fps: f64,
    join_epsilon: f64,
) -> Vec<(f64, f64)> {
    let min_len = if fps > 0.0 { 1.0 / fps } else { 0.0 };

    let mut merged: Vec<(f64, f64)> = Vec::new();
    for &(start, end) in windows {
        if let Some(last) = merged.last_mut() {
            if start - last.1 <= join_epsilon {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }

    merged.retain(|&(start, end)| end - start >= min_len);
    merged
}

/// Extract one keep window into a uniform intermediate.
pub async fn extract_segment(
    source_uri: &str,
    start: f64,
    end: f64,
    output: &Path,
    encoding: &SegmentEncoding,
    cancel_rx: Option<watch::Receiver<bool>>,
) -> MediaResult<()> {
    let duration = end - start;
    if duration <= 0.0 {
        return Err(MediaError::internal(format!(
            "degenerate segment [{start}, {end}]"
        )));
    }

    debug!(
        source = source_uri,
        start = start,
        end = end,
        output = %output.display(),
        "extracting segment"
    );

    let cmd = FfmpegCommand::new(source_uri, output)
        .seek(start)
        .duration(duration)
        .video_codec(&encoding.video_codec)
        .preset(&encoding.preset)
        .crf(encoding.crf)
        .output_args(["-pix_fmt", "yuv420p"])
        .audio_codec(&encoding.audio_codec)
        .output_args(["-ar", &encoding.audio_rate.to_string()])
        .output_args(["-b:a", &encoding.audio_bitrate]);

    let mut runner = FfmpegRunner::new();
    if let Some(rx) = cancel_rx {
        runner = runner.with_cancel(rx);
    }
    runner.run(&cmd).await
}

/// Concatenate uniform intermediates in order with the concat demuxer.
/// No re-encode happens between segments of one output.
pub async fn concat_segments(segments: &[&Path], output: &Path) -> MediaResult<()> {
    if segments.is_empty() {
        return Err(MediaError::internal("nothing to concatenate"));
    }

    let list_dir = output
        .parent()
        .ok_or_else(|| MediaError::internal("output has no parent directory"))?;
    let list_path = list_dir.join("concat.txt");
    tokio::fs::write(&list_path, concat_list(segments)).await?;

    let cmd = FfmpegCommand::new(list_path.to_string_lossy(), output)
        .input_arg("-f")
        .input_arg("concat")
        .input_arg("-safe")
        .input_arg("0")
        .output_args(["-c", "copy"]);

    let result = FfmpegRunner::new().run(&cmd).await;
    tokio::fs::remove_file(&list_path).await.ok();
    result
}

/// Build the concat demuxer list file body.
fn concat_list(segments: &[&Path]) -> String {
    let mut body = String::new();
    for path in segments {
        // Single quotes in paths are closed, escaped and reopened per the
        // demuxer's quoting rules
        let escaped = path.to_string_lossy().replace('\'', r"'\''");
        body.push_str(&format!("file '{}'\n", escaped));
    }
    body
}

/// Scale-and-pad one segment into a target frame. Audio passes through.
pub async fn apply_aspect(
    input: &Path,
    output: &Path,
    frame: (u32, u32),
    encoding: &SegmentEncoding,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(input.to_string_lossy(), output)
        .video_filter(filters::fit_and_pad(frame.0, frame.1))
        .video_codec(&encoding.video_codec)
        .preset(&encoding.preset)
        .crf(encoding.crf)
        .audio_codec("copy");

    FfmpegRunner::new().run(&cmd).await
}

/// Burn subtitles into a finished output. Audio passes through.
pub async fn burn_subtitles(
    input: &Path,
    srt: &Path,
    output: &Path,
    font: &str,
    font_size: u32,
    encoding: &SegmentEncoding,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(input.to_string_lossy(), output)
        .video_filter(filters::subtitles(&srt.to_string_lossy(), font, font_size))
        .video_codec(&encoding.video_codec)
        .preset(&encoding.preset)
        .crf(encoding.crf)
        .audio_codec("copy");

    FfmpegRunner::new().run(&cmd).await
}

/// Loudness-normalise the audio track. Video passes through.
pub async fn normalise_audio(input: &Path, output: &Path, target_lufs: f64) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(input.to_string_lossy(), output)
        .audio_filter(filters::loudnorm(target_lufs))
        .video_codec("copy")
        .audio_codec("aac");

    FfmpegRunner::new().run(&cmd).await
}

/// Remux with streaming-friendly moov-atom placement.
pub async fn finalise(input: &Path, output: &Path) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(input.to_string_lossy(), output)
        .output_args(["-c", "copy"])
        .output_args(["-movflags", "+faststart"]);

    FfmpegRunner::new().run(&cmd).await
}

/// Grab a thumbnail from the first second of an output.
pub async fn thumbnail(input: &Path, output: &Path, width: u32) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(input.to_string_lossy(), output)
        .seek(0.5)
        .video_filter(format!("scale={}:-2", width))
        .output_args(["-vframes", "1"])
        .no_audio();

    FfmpegRunner::new().run(&cmd).await
}
