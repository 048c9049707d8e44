//! Parsed FFmpeg `-progress` output.

/// Snapshot of FFmpeg encode progress.
#[derive(Debug, Clone, Default)]
pub struct FfmpegProgress {
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Output time as `HH:MM:SS.micro`
    pub out_time: String,
    /// Frames encoded
    pub frame: u64,
    /// Encoding fps
    pub fps: f64,
    /// Encode speed relative to realtime
    pub speed: f64,
    /// Whether the encode has finished
    pub is_complete: bool,
}
