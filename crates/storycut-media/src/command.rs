//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Builder for FFmpeg commands. The input is a string so remote HTTP(S)
/// sources pass straight through to FFmpeg's own protocol handling.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input path or URL
    input: String,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.into(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input, fast seek).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set audio filter.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set encoder preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Drop the video stream.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Drop the audio stream.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Whether the input is a remote HTTP(S) source.
    fn input_is_remote(&self) -> bool {
        self.input.starts_with("http://") || self.input.starts_with("https://")
    }

    /// Build the command arguments: global flags, input options, `-i`,
    /// output options, output path.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-v"]
            .into_iter()
            .map(String::from)
            .collect();
        args.push(self.log_level.clone());
        if self.overwrite {
            args.push("-y".to_string());
        }
        // Progress key=value stream on stderr, parsed by the runner
        args.extend(["-progress".to_string(), "pipe:2".to_string()]);

        // Remote sources ride over range requests; reconnect on a dropped
        // connection instead of failing the whole segment
        if self.input_is_remote() {
            args.extend(
                [
                    "-reconnect",
                    "1",
                    "-reconnect_streamed",
                    "1",
                    "-reconnect_delay_max",
                    "5",
                ]
                .into_iter()
                .map(String::from),
            );
        }

        args.extend(self.input_args.iter().cloned());
        args.extend(["-i".to_string(), self.input.clone()]);
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking, timeout and
/// cancellation.
pub struct FfmpegRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self {
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with a progress callback.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        progress_callback: F,
    ) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child.stderr.take().expect("stderr not captured");
        let mut reader = BufReader::new(stderr).lines();

        let progress_handle = tokio::spawn(async move {
            let mut current_progress = FfmpegProgress::default();
            let mut tail: Vec<String> = Vec::new();

            while let Ok(Some(line)) = reader.next_line().await {
                if let Some(progress) = parse_progress_line(&line, &mut current_progress) {
                    progress_callback(progress.clone());
                } else if !line.trim().is_empty() {
                    // Keep a short tail of raw stderr for error reporting
                    tail.push(line);
                    if tail.len() > 20 {
                        tail.remove(0);
                    }
                }
            }
            tail
        });

        let result = self.wait_for_completion(&mut child).await;
        let stderr_tail = progress_handle.await.unwrap_or_default();

        match result {
            Err(MediaError::FfmpegFailed {
                message,
                exit_code,
                ..
            }) => Err(MediaError::FfmpegFailed {
                message,
                stderr: Some(stderr_tail.join("\n")),
                exit_code,
            }),
            other => other,
        }
    }

    /// Wait for the child with cancellation and timeout applied. The
    /// cancellation flag and the deadline are polled between short waits so
    /// the child can be killed without holding a borrow on its exit future.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        let started = std::time::Instant::now();

        let status = loop {
            let tick = tokio::select! {
                status = child.wait() => Some(status),
                _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => None,
            };

            match tick {
                Some(status) => break status?,
                None => {
                    if self.cancel_rx.as_ref().is_some_and(|rx| *rx.borrow()) {
                        info!("FFmpeg cancelled, killing process");
                        let _ = child.kill().await;
                        return Err(MediaError::Cancelled);
                    }
                    if let Some(timeout_secs) = self.timeout_secs {
                        if started.elapsed() >= std::time::Duration::from_secs(timeout_secs) {
                            warn!(
                                "FFmpeg timed out after {} seconds, killing process",
                                timeout_secs
                            );
                            let _ = child.kill().await;
                            return Err(MediaError::Timeout(timeout_secs));
                        }
                    }
                }
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                None,
                status.code(),
            ))
        }
    }
}

/// Fold one `key=value` line of FFmpeg's `-progress` stream into the
/// running snapshot. Returns a snapshot only on the `progress` key, which
/// terminates each update block.
fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;

    match key {
        // Despite the `_ms` name, both keys carry microseconds
        "out_time_ms" | "out_time_us" => {
            current.out_time_ms = value.parse::<i64>().ok()? / 1000;
        }
        "out_time" => current.out_time = value.to_string(),
        "frame" => current.frame = value.parse().ok()?,
        "fps" => current.fps = value.parse().ok()?,
        // `1.5x`, or `N/A` early in the encode (which simply fails to parse)
        "speed" => {
            if let Ok(speed) = value.trim_end_matches('x').parse() {
                current.speed = speed;
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
