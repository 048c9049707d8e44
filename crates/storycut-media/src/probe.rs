//! FFprobe source information.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Technical information about a source, local or remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Whether an audio stream is present
    pub has_audio: bool,
    /// Video codec
    pub video_codec: String,
    /// Audio codec (empty without an audio stream)
    pub audio_codec: String,
    /// Container bitrate in bits/second
    pub bitrate: u64,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a source for technical metadata.
///
/// The URI may be a local path or an HTTP(S) URL; ffprobe reads container
/// headers over range requests and never downloads the full asset.
pub async fn probe_source(uri: &str) -> MediaResult<SourceInfo> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(uri)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(classify_probe_failure(uri, &stderr));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::UnrecognisedFormat(format!("no video stream in {}", uri)))?;

    let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let bitrate = probe
        .format
        .bit_rate
        .as_ref()
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .or(video_stream.r_frame_rate.as_ref())
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(30.0);

    Ok(SourceInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        has_audio: audio_stream.is_some(),
        video_codec: video_stream.codec_name.clone().unwrap_or_default(),
        audio_codec: audio_stream
            .and_then(|s| s.codec_name.clone())
            .unwrap_or_default(),
        bitrate,
    })
}

/// Map an ffprobe failure to the input-error taxonomy.
fn classify_probe_failure(uri: &str, stderr: &str) -> MediaError {
    let lower = stderr.to_lowercase();
    if lower.contains("no such file")
        || lower.contains("connection refused")
        || lower.contains("failed to resolve")
        || lower.contains("server returned 4")
        || lower.contains("server returned 5")
        || lower.contains("i/o error")
    {
        MediaError::SourceUnreachable(uri.to_string())
    } else if lower.contains("invalid data found") || lower.contains("moov atom not found") {
        MediaError::UnrecognisedFormat(uri.to_string())
    } else {
        MediaError::FfprobeFailed {
            message: format!("ffprobe failed for {}", uri),
            stderr: Some(stderr.to_string()),
        }
    }
}

/// Parse frame rate string (e.g. "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
    }
    s.parse().ok()
}

/// Measure a file's duration in seconds.
pub async fn measure_duration(uri: &str) -> MediaResult<f64> {
    Ok(probe_source(uri).await?.duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_classify_probe_failure() {
        assert!(matches!(
            classify_probe_failure("http://x/v.mp4", "Server returned 404 Not Found"),
            MediaError::SourceUnreachable(_)
        ));
        assert!(matches!(
            classify_probe_failure("/a.bin", "Invalid data found when processing input"),
            MediaError::UnrecognisedFormat(_)
        ));
        assert!(matches!(
            classify_probe_failure("/a.mp4", "something else entirely"),
            MediaError::FfprobeFailed { .. }
        ));
    }
}
