//! Audio extraction.

use std::path::Path;

use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Sample rate for all extracted audio artefacts.
pub const AUDIO_SAMPLE_RATE: u32 = 16_000;

/// Extract a normalised mono 16 kHz 16-bit PCM WAV from a source.
///
/// The worker stores the result under `derived/<media_id>/audio.wav` and
/// reuses it on retry; extraction itself is deterministic.
pub async fn extract_audio(source_uri: &str, output: &Path) -> MediaResult<()> {
    debug!(source = source_uri, output = %output.display(), "extracting audio");

    let cmd = FfmpegCommand::new(source_uri, output)
        .no_video()
        .output_args(["-ac", "1"])
        .output_args(["-ar", &AUDIO_SAMPLE_RATE.to_string()])
        .audio_codec("pcm_s16le");

    run_mapping_audio_errors(&cmd).await?;

    let metadata = tokio::fs::metadata(output).await?;
    if metadata.len() == 0 {
        return Err(MediaError::NoAudioTrack);
    }
    Ok(())
}

/// Extract raw f32le mono 16 kHz samples for the silence scanner.
pub async fn extract_pcm_f32(source_uri: &str, output: &Path) -> MediaResult<()> {
    debug!(source = source_uri, output = %output.display(), "extracting raw PCM");

    let cmd = FfmpegCommand::new(source_uri, output)
        .no_video()
        .output_args(["-ac", "1"])
        .output_args(["-ar", &AUDIO_SAMPLE_RATE.to_string()])
        .output_args(["-f", "f32le"]);

    run_mapping_audio_errors(&cmd).await?;
    Ok(())
}

async fn run_mapping_audio_errors(cmd: &FfmpegCommand) -> MediaResult<()> {
    match FfmpegRunner::new().run(cmd).await {
        Ok(()) => Ok(()),
        Err(MediaError::FfmpegFailed { stderr, .. })
            if stderr
                .as_deref()
                .is_some_and(|s| s.to_lowercase().contains("does not contain any stream")) =>
        {
            Err(MediaError::NoAudioTrack)
        }
        Err(e) => Err(e),
    }
}

/// Load raw f32le samples from a file.
pub async fn load_samples_f32(path: &Path) -> MediaResult<Vec<f32>> {
    let bytes = tokio::fs::read(path).await?;
    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn load_samples_empty_file() {
        let temp = NamedTempFile::new().unwrap();
        let samples = load_samples_f32(temp.path()).await.unwrap();
        assert!(samples.is_empty());
    }

    #[tokio::test]
    async fn load_samples_roundtrip() {
        let temp = NamedTempFile::new().unwrap();
        let written: Vec<f32> = vec![0.0, 0.5, 1.0, -1.0];
        let bytes: Vec<u8> = written.iter().flat_map(|f| f.to_le_bytes()).collect();
        tokio::fs::write(temp.path(), &bytes).await.unwrap();

        let loaded = load_samples_f32(temp.path()).await.unwrap();
        assert_eq!(loaded.len(), 4);
        for (a, b) in loaded.iter().zip(written.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
