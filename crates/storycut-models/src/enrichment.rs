//! Enrichment artefacts derived from a source media.
//!
//! All artefacts are keyed by their owning `media_id` and written whole:
//! a reader never observes a partially-built transcript or silence map.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::MediaId;

/// A single word with timing, nested inside a transcript segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Word {
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

/// One transcript segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Word>,
}

impl TranscriptSegment {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Words per second inside this segment. Falls back to a whitespace
    /// split of `text` when word timings are absent.
    pub fn word_density(&self) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        let words = if self.words.is_empty() {
            self.text.split_whitespace().count()
        } else {
            self.words.len()
        };
        words as f64 / duration
    }
}

/// Speech transcript for one media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Transcript {
    /// Ordered, non-overlapping segments
    pub segments: Vec<TranscriptSegment>,
    /// Detected language tag, e.g. "en"
    #[serde(default)]
    pub language: String,
}

impl Transcript {
    /// Empty transcript (silent or audio-less source).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total number of words across all segments.
    pub fn word_count(&self) -> usize {
        self.segments
            .iter()
            .map(|s| {
                if s.words.is_empty() {
                    s.text.split_whitespace().count()
                } else {
                    s.words.len()
                }
            })
            .sum()
    }

    /// Check the transcript invariants: segments sorted, non-overlapping,
    /// each `start < end`, all inside `[0, duration]`, and every word inside
    /// its segment window.
    pub fn check_invariants(&self, duration: f64) -> Result<(), String> {
        let mut prev_end = 0.0f64;
        for (i, seg) in self.segments.iter().enumerate() {
            if seg.start < 0.0 || seg.end > duration + f64::EPSILON {
                return Err(format!(
                    "segment {} [{:.3}, {:.3}] outside [0, {:.3}]",
                    i, seg.start, seg.end, duration
                ));
            }
            if seg.start >= seg.end {
                return Err(format!("segment {} has start >= end", i));
            }
            if seg.start < prev_end {
                return Err(format!("segment {} overlaps its predecessor", i));
            }
            for w in &seg.words {
                if w.start >= w.end || w.start < seg.start - 1e-6 || w.end > seg.end + 1e-6 {
                    return Err(format!("segment {} word '{}' outside window", i, w.word));
                }
            }
            prev_end = seg.end;
        }
        Ok(())
    }
}

/// A `[start, end)` silence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SilenceInterval {
    pub start: f64,
    pub end: f64,
}

impl SilenceInterval {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Overlap length with an arbitrary `[start, end)` window.
    pub fn overlap(&self, start: f64, end: f64) -> f64 {
        (self.end.min(end) - self.start.max(start)).max(0.0)
    }
}

/// Silence map for one media: sorted, pairwise-disjoint intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct SilenceMap {
    pub intervals: Vec<SilenceInterval>,
    /// Minimum silence length the detector was configured with
    #[serde(default)]
    pub min_silence_s: f64,
}

impl SilenceMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fraction of `[start, end)` covered by silence.
    pub fn silence_ratio(&self, start: f64, end: f64) -> f64 {
        let span = end - start;
        if span <= 0.0 {
            return 0.0;
        }
        let covered: f64 = self.intervals.iter().map(|i| i.overlap(start, end)).sum();
        (covered / span).clamp(0.0, 1.0)
    }

    /// Check disjointness, ordering and the minimum-length bound.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut prev_end = f64::NEG_INFINITY;
        for (i, iv) in self.intervals.iter().enumerate() {
            if iv.start >= iv.end {
                return Err(format!("interval {} has start >= end", i));
            }
            if iv.start < prev_end {
                return Err(format!("interval {} overlaps its predecessor", i));
            }
            if self.min_silence_s > 0.0 && iv.duration() + 1e-9 < self.min_silence_s {
                return Err(format!("interval {} shorter than min_silence", i));
            }
            prev_end = iv.end;
        }
        Ok(())
    }
}

/// Scene-cut timestamps for one media, strictly increasing, inside
/// `(0, duration)`. An empty list means one scene covers the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct SceneCuts {
    pub cuts: Vec<f64>,
}

impl SceneCuts {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether `t` coincides with a cut within `tolerance` seconds.
    pub fn near_cut(&self, t: f64, tolerance: f64) -> bool {
        self.cuts.iter().any(|c| (c - t).abs() <= tolerance)
    }

    pub fn check_invariants(&self, duration: f64) -> Result<(), String> {
        let mut prev = 0.0f64;
        for (i, &c) in self.cuts.iter().enumerate() {
            if c <= prev {
                return Err(format!("cut {} not strictly increasing", i));
            }
            if c >= duration {
                return Err(format!("cut {} at {:.3} beyond duration", i, c));
            }
            prev = c;
        }
        Ok(())
    }
}

/// One sampled frame with its description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Frame {
    /// Timestamp in seconds, unique per media
    pub t: f64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// A labeled `[start, end)` scene interval. Scenes are adjacent and cover
/// the whole timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    pub start: f64,
    pub end: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Scene {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Feature breakdown behind a clip candidate's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ClipFeatures {
    /// Words per second inside the window
    pub speech_density: f64,
    /// Fraction of the window covered by silence
    pub silence_ratio: f64,
    /// Hook words matched in segment text
    pub keyword_hits: u32,
    /// Whether a boundary coincides with a scene cut
    pub scene_aligned: bool,
}

/// A scored candidate window for short-form clipping.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClipCandidate {
    pub media_id: MediaId,
    pub start: f64,
    pub end: f64,
    /// Retention score in [0, 100]
    pub score: f64,
    pub features: ClipFeatures,
    /// Opening line pulled from the transcript, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_text: Option<String>,
}

impl ClipCandidate {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Whether this candidate overlaps another in source time.
    pub fn overlaps(&self, other: &ClipCandidate) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
            confidence: None,
            words: Vec::new(),
        }
    }

    #[test]
    fn transcript_invariants_hold_for_sorted_segments() {
        let t = Transcript {
            segments: vec![seg(0.0, 2.0, "hello there"), seg(2.0, 4.5, "welcome back")],
            language: "en".into(),
        };
        assert!(t.check_invariants(10.0).is_ok());
        assert_eq!(t.word_count(), 4);
    }

    #[test]
    fn transcript_invariants_reject_overlap() {
        let t = Transcript {
            segments: vec![seg(0.0, 3.0, "a"), seg(2.5, 4.0, "b")],
            language: "en".into(),
        };
        assert!(t.check_invariants(10.0).is_err());
    }

    #[test]
    fn transcript_invariants_reject_out_of_bounds() {
        let t = Transcript {
            segments: vec![seg(0.0, 12.0, "a")],
            language: "en".into(),
        };
        assert!(t.check_invariants(10.0).is_err());
    }

    #[test]
    fn silence_ratio_over_window() {
        let map = SilenceMap {
            intervals: vec![
                SilenceInterval {
                    start: 1.0,
                    end: 2.0,
                },
                SilenceInterval {
                    start: 5.0,
                    end: 7.0,
                },
            ],
            min_silence_s: 0.6,
        };
        assert!(map.check_invariants().is_ok());
        // window [0, 10): 3 seconds silent out of 10
        assert!((map.silence_ratio(0.0, 10.0) - 0.3).abs() < 1e-9);
        // window entirely inside a silent stretch
        assert!((map.silence_ratio(5.5, 6.5) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn silence_invariants_reject_short_interval() {
        let map = SilenceMap {
            intervals: vec![SilenceInterval {
                start: 0.0,
                end: 0.2,
            }],
            min_silence_s: 0.6,
        };
        assert!(map.check_invariants().is_err());
    }

    #[test]
    fn scene_cuts_must_increase() {
        let cuts = SceneCuts {
            cuts: vec![1.0, 2.0, 2.0],
        };
        assert!(cuts.check_invariants(10.0).is_err());

        let cuts = SceneCuts {
            cuts: vec![1.0, 2.0, 9.5],
        };
        assert!(cuts.check_invariants(10.0).is_ok());
        assert!(cuts.near_cut(2.2, 0.25));
        assert!(!cuts.near_cut(3.0, 0.25));
    }

    #[test]
    fn candidate_overlap() {
        let a = ClipCandidate {
            media_id: MediaId::from("m"),
            start: 0.0,
            end: 20.0,
            score: 50.0,
            features: ClipFeatures::default(),
            hook_text: None,
        };
        let mut b = a.clone();
        b.start = 19.0;
        b.end = 40.0;
        assert!(a.overlaps(&b));
        b.start = 20.0;
        assert!(!a.overlaps(&b));
    }
}
