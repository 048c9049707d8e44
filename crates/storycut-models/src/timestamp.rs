//! Timestamp parsing and formatting for FFmpeg arguments and SRT output.

use thiserror::Error;

/// Error for unparseable timestamp strings.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid timestamp format: {0}")]
pub struct TimestampError(pub String);

/// Parse `HH:MM:SS` or `HH:MM:SS.mmm` (hours optional) into seconds.
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let parts: Vec<&str> = ts.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (
            h.parse::<f64>().map_err(|_| TimestampError(ts.into()))?,
            m.parse::<f64>().map_err(|_| TimestampError(ts.into()))?,
            s.parse::<f64>().map_err(|_| TimestampError(ts.into()))?,
        ),
        [m, s] => (
            0.0,
            m.parse::<f64>().map_err(|_| TimestampError(ts.into()))?,
            s.parse::<f64>().map_err(|_| TimestampError(ts.into()))?,
        ),
        _ => return Err(TimestampError(ts.into())),
    };
    if hours < 0.0 || minutes < 0.0 || seconds < 0.0 {
        return Err(TimestampError(ts.into()));
    }
    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Format seconds as `HH:MM:SS.mmm` for FFmpeg.
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hours = (seconds / 3600.0).floor() as u32;
    let minutes = ((seconds % 3600.0) / 60.0).floor() as u32;
    let secs = seconds % 60.0;
    format!("{:02}:{:02}:{:06.3}", hours, minutes, secs)
}

/// Format seconds as `HH:MM:SS,mmm` for SRT subtitle files.
pub fn format_timestamp_srt(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let total_ms = (seconds * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, ms)
}
