//! Silence detection over raw PCM.
//!
//! A windowed RMS energy scan: frames below the energy threshold count as
//! silent, and runs of silent frames at least `min_silence_s` long become
//! intervals. The state machine mirrors the speech/silence transitions of a
//! VAD-driven segmenter but needs no model.

use storycut_models::{SilenceInterval, SilenceMap};

use crate::audio::AUDIO_SAMPLE_RATE;

/// Silence scanner configuration.
#[derive(Debug, Clone)]
pub struct SilenceConfig {
    /// Minimum silence length in seconds (shorter runs are kept as speech)
    pub min_silence_s: f64,
    /// RMS threshold below which a frame counts as silent
    pub energy_threshold: f32,
    /// Analysis frame length in milliseconds
    pub frame_ms: u64,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            min_silence_s: 0.6,
            energy_threshold: 0.01,
            frame_ms: 30,
        }
    }
}

enum State {
    InSpeech,
    InSilence { silence_start_ms: u64 },
}

/// Converts a stream of frame energies into silence intervals.
pub struct SilenceScanner {
    config: SilenceConfig,
    state: State,
    intervals: Vec<SilenceInterval>,
}

impl SilenceScanner {
    pub fn new(config: SilenceConfig) -> Self {
        Self {
            config,
            // Assume silence at start until proven otherwise to catch
            // initial dead air
            state: State::InSilence { silence_start_ms: 0 },
            intervals: Vec::new(),
        }
    }

    /// Process a single analysis frame.
    pub fn ingest_frame(&mut self, rms: f32, timestamp_ms: u64) {
        let is_silent = rms < self.config.energy_threshold;

        match (&self.state, is_silent) {
            (State::InSilence { silence_start_ms }, false) => {
                self.close_silence(*silence_start_ms, timestamp_ms);
                self.state = State::InSpeech;
            }
            (State::InSpeech, true) => {
                self.state = State::InSilence {
                    silence_start_ms: timestamp_ms,
                };
            }
            _ => {}
        }
    }

    fn close_silence(&mut self, start_ms: u64, end_ms: u64) {
        let min_ms = (self.config.min_silence_s * 1000.0) as u64;
        if end_ms.saturating_sub(start_ms) >= min_ms {
            self.intervals.push(SilenceInterval {
                start: start_ms as f64 / 1000.0,
                end: end_ms as f64 / 1000.0,
            });
        }
    }

    /// Finish the scan and return the silence map.
    pub fn finalize(mut self, total_duration_ms: u64) -> SilenceMap {
        if let State::InSilence { silence_start_ms } = self.state {
            self.close_silence(silence_start_ms, total_duration_ms);
        }
        SilenceMap {
            intervals: self.intervals,
            min_silence_s: self.config.min_silence_s,
        }
    }
}

/// Scan mono f32le samples (16 kHz) for silence intervals.
pub fn scan_samples(samples: &[f32], config: &SilenceConfig) -> SilenceMap {
    let frame_size = (AUDIO_SAMPLE_RATE as u64 * config.frame_ms / 1000) as usize;
    if frame_size == 0 || samples.is_empty() {
        return SilenceMap {
            intervals: Vec::new(),
            min_silence_s: config.min_silence_s,
        };
    }

    let total_duration_ms = samples.len() as u64 * 1000 / AUDIO_SAMPLE_RATE as u64;
    let mut scanner = SilenceScanner::new(config.clone());

    for (i, chunk) in samples.chunks(frame_size).enumerate() {
        if chunk.len() < frame_size {
            break;
        }
        let rms = frame_rms(chunk);
        scanner.ingest_frame(rms, i as u64 * config.frame_ms);
    }

    scanner.finalize(total_duration_ms)
}

/// Root-mean-square energy of one frame.
fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
    (sum_sq / frame.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(runs: &[(f32, f64)]) -> Vec<f32> {
        // (amplitude, seconds) runs
        let mut out = Vec::new();
        for &(amp, secs) in runs {
            let n = (secs * AUDIO_SAMPLE_RATE as f64) as usize;
            out.extend(std::iter::repeat(amp).take(n));
        }
        out
    }

    #[test]
    fn all_speech_yields_no_intervals() {
        let map = scan_samples(&samples(&[(0.5, 3.0)]), &SilenceConfig::default());
        assert!(map.intervals.is_empty());
    }

    #[test]
    fn fully_silent_source_is_one_interval() {
        let map = scan_samples(&samples(&[(0.0, 3.0)]), &SilenceConfig::default());
        assert_eq!(map.intervals.len(), 1);
        assert!((map.intervals[0].start - 0.0).abs() < 0.05);
        assert!((map.intervals[0].end - 3.0).abs() < 0.05);
        assert!(map.check_invariants().is_ok());
    }

    #[test]
    fn mid_silence_is_detected() {
        let map = scan_samples(
            &samples(&[(0.5, 1.0), (0.0, 2.0), (0.5, 1.0)]),
            &SilenceConfig::default(),
        );
        assert_eq!(map.intervals.len(), 1);
        let iv = map.intervals[0];
        assert!((iv.start - 1.0).abs() < 0.05);
        assert!((iv.end - 3.0).abs() < 0.05);
    }

    #[test]
    fn short_gaps_are_ignored() {
        // 0.3 s gap is below the 0.6 s minimum
        let map = scan_samples(
            &samples(&[(0.5, 1.0), (0.0, 0.3), (0.5, 1.0)]),
            &SilenceConfig::default(),
        );
        assert!(map.intervals.is_empty());
    }

    #[test]
    fn intervals_are_sorted_and_disjoint() {
        let map = scan_samples(
            &samples(&[
                (0.0, 1.0),
                (0.5, 0.5),
                (0.0, 1.0),
                (0.5, 0.5),
                (0.0, 1.0),
            ]),
            &SilenceConfig::default(),
        );
        assert_eq!(map.intervals.len(), 3);
        assert!(map.check_invariants().is_ok());
    }

    #[test]
    fn empty_input_is_empty_map() {
        let map = scan_samples(&[], &SilenceConfig::default());
        assert!(map.intervals.is_empty());
    }
}
