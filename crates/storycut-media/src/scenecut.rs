//! Scene-cut detection via FFmpeg's scene score.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use storycut_models::SceneCuts;

use crate::error::{MediaError, MediaResult};

/// Default scene-change score threshold.
pub const DEFAULT_SCENE_THRESHOLD: f64 = 0.4;

/// Detect scene cuts in a source.
///
/// Runs `select='gt(scene,T)',showinfo` to a null muxer and collects the
/// `pts_time` of every selected frame. Timestamps are clamped to the open
/// interval `(0, duration)`; an empty result means one scene covers the
/// whole timeline.
pub async fn detect_scene_cuts(
    source_uri: &str,
    threshold: f64,
    duration: f64,
) -> MediaResult<SceneCuts> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let filter = format!("select='gt(scene,{})',showinfo", threshold);

    let mut child = Command::new("ffmpeg")
        .args(["-v", "info", "-i", source_uri, "-vf", &filter, "-f", "null", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stderr = child.stderr.take().expect("stderr not captured");
    let mut reader = BufReader::new(stderr).lines();

    let mut cuts = Vec::new();
    while let Ok(Some(line)) = reader.next_line().await {
        if let Some(t) = parse_showinfo_pts(&line) {
            cuts.push(t);
        }
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(MediaError::ffmpeg_failed(
            "scene detection failed",
            None,
            status.code(),
        ));
    }

    Ok(normalise_cuts(cuts, duration))
}

/// Pull `pts_time:<t>` out of a showinfo log line.
fn parse_showinfo_pts(line: &str) -> Option<f64> {
    if !line.contains("Parsed_showinfo") {
        return None;
    }
    let idx = line.find("pts_time:")?;
    let rest = &line[idx + "pts_time:".len()..];
    let token = rest.split_whitespace().next()?;
    token.parse::<f64>().ok()
}

/// Sort, dedupe and clamp cut timestamps to `(0, duration)`.
fn normalise_cuts(mut cuts: Vec<f64>, duration: f64) -> SceneCuts {
    cuts.retain(|&t| t > 0.0 && t < duration);
    cuts.sort_by(|a, b| a.partial_cmp(b).expect("no NaN timestamps"));
    cuts.dedup_by(|a, b| (*a - *b).abs() < 1e-6);
    debug!(count = cuts.len(), "scene cuts normalised");
    SceneCuts { cuts }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_showinfo_lines() {
        let line = "[Parsed_showinfo_1 @ 0x5634] n:   0 pts:  90090 pts_time:3.003 \
                    duration: 1501 duration_time:0.05 fmt:yuv420p";
        assert!((parse_showinfo_pts(line).unwrap() - 3.003).abs() < 1e-9);

        assert!(parse_showinfo_pts("frame=  100 fps= 25").is_none());
        assert!(parse_showinfo_pts("[Parsed_showinfo_1 @ 0x0] config").is_none());
    }

    #[test]
    fn normalise_sorts_and_clamps() {
        let cuts = normalise_cuts(vec![5.0, 1.0, 0.0, 12.0, 5.0, 9.999], 10.0);
        assert_eq!(cuts.cuts, vec![1.0, 5.0, 9.999]);
        assert!(cuts.check_invariants(10.0).is_ok());
    }

    #[test]
    fn empty_means_single_scene() {
        let cuts = normalise_cuts(vec![], 10.0);
        assert!(cuts.cuts.is_empty());
    }
}
