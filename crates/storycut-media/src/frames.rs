//! Deterministic frame sampling.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Sample one frame per `interval_s` into `out_dir` as JPEGs.
///
/// Files are numbered from 1 (`000001.jpg`, ...); the timestamp of file `n`
/// is `(n - 1) * interval_s`, which keeps sampling deterministic per media.
/// Returns the sampled `(timestamp, path)` pairs in timestamp order.
pub async fn sample_frames(
    source_uri: &str,
    interval_s: f64,
    out_dir: &Path,
) -> MediaResult<Vec<(f64, PathBuf)>> {
    tokio::fs::create_dir_all(out_dir).await?;

    let pattern = out_dir.join("%06d.jpg");
    let cmd = FfmpegCommand::new(source_uri, &pattern)
        .video_filter(format!("fps=1/{}", interval_s))
        .output_args(["-q:v", "4"])
        .no_audio();

    FfmpegRunner::new().run(&cmd).await?;

    let frames = list_sampled(out_dir, interval_s).await?;
    debug!(count = frames.len(), "sampled frames");
    Ok(frames)
}

/// Enumerate sampled frames in an output directory.
pub async fn list_sampled(out_dir: &Path, interval_s: f64) -> MediaResult<Vec<(f64, PathBuf)>> {
    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(out_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jpg") {
            continue;
        }
        if let Some(index) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            if index >= 1 {
                frames.push(((index - 1) as f64 * interval_s, path));
            }
        }
    }
    frames.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("no NaN timestamps"));
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn listing_maps_index_to_timestamp() {
        let dir = tempdir().unwrap();
        for name in ["000001.jpg", "000002.jpg", "000004.jpg", "notes.txt"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }

        let frames = list_sampled(dir.path(), 1.0).await.unwrap();
        let timestamps: Vec<f64> = frames.iter().map(|(t, _)| *t).collect();
        assert_eq!(timestamps, vec![0.0, 1.0, 3.0]);
    }

    #[tokio::test]
    async fn listing_respects_interval() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("000003.jpg"), b"x")
            .await
            .unwrap();
        let frames = list_sampled(dir.path(), 2.5).await.unwrap();
        assert_eq!(frames.len(), 1);
        assert!((frames[0].0 - 5.0).abs() < 1e-9);
    }
}
