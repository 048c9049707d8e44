//! Enrichment compression for the planner prompt.
//!
//! Projects potentially thousands of frames, hundreds of scenes and
//! hundreds of transcript segments down to the model's input budget while
//! preserving timeline coverage and caller-hinted key moments.

use serde::{Deserialize, Serialize};

use storycut_models::{Frame, Scene, TranscriptSegment};

/// Compression ceilings.
#[derive(Debug, Clone)]
pub struct CompressorConfig {
    pub frame_cap: usize,
    pub scene_cap: usize,
    pub segment_cap: usize,
    /// Frames within this distance of a key-moment hint are always kept
    pub hint_tolerance_s: f64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            frame_cap: 50,
            scene_cap: 20,
            segment_cap: 100,
            hint_tolerance_s: 0.25,
        }
    }
}

/// What was elided, included in the prompt so the model knows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSummary {
    pub duration: f64,
    pub total_frames: usize,
    pub sampled_frames: usize,
    pub total_scenes: usize,
    pub sampled_scenes: usize,
    pub total_segments: usize,
    pub sampled_segments: usize,
}

/// Compressed enrichment ready for prompt assembly.
#[derive(Debug, Clone)]
pub struct CompressedEnrichment {
    pub frames: Vec<Frame>,
    pub scenes: Vec<Scene>,
    pub segments: Vec<TranscriptSegment>,
    pub summary: ContextSummary,
}

/// Downsample enrichment to the configured ceilings.
pub fn compress(
    frames: &[Frame],
    scenes: &[Scene],
    segments: &[TranscriptSegment],
    duration: f64,
    key_moment_hints: &[f64],
    config: &CompressorConfig,
) -> CompressedEnrichment {
    let kept_frames = compress_frames(frames, key_moment_hints, config);
    let kept_scenes = compress_scenes(scenes, config.scene_cap);
    let kept_segments = compress_segments(segments, config.segment_cap);

    let summary = ContextSummary {
        duration,
        total_frames: frames.len(),
        sampled_frames: kept_frames.len(),
        total_scenes: scenes.len(),
        sampled_scenes: kept_scenes.len(),
        total_segments: segments.len(),
        sampled_segments: kept_segments.len(),
    };

    CompressedEnrichment {
        frames: kept_frames,
        scenes: kept_scenes,
        segments: kept_segments,
        summary,
    }
}

/// Uniform subsample across the timeline, plus every frame near a hint.
/// When the union still exceeds the cap, the shortest-description
/// non-protected frames go first.
fn compress_frames(frames: &[Frame], hints: &[f64], config: &CompressorConfig) -> Vec<Frame> {
    if frames.len() <= config.frame_cap {
        let mut kept = frames.to_vec();
        sort_by_time(&mut kept);
        return kept;
    }

    let mut sorted: Vec<&Frame> = frames.iter().collect();
    sorted.sort_by(|a, b| a.t.partial_cmp(&b.t).expect("no NaN frame times"));

    let protected = |f: &Frame| {
        hints
            .iter()
            .any(|&h| (f.t - h).abs() <= config.hint_tolerance_s)
    };

    // Evenly spaced picks over the sorted list
    let stride = sorted.len() as f64 / config.frame_cap as f64;
    let mut kept: Vec<Frame> = Vec::new();
    let mut taken = vec![false; sorted.len()];
    for i in 0..config.frame_cap {
        let idx = ((i as f64 * stride) as usize).min(sorted.len() - 1);
        if !taken[idx] {
            taken[idx] = true;
            kept.push(sorted[idx].clone());
        }
    }
    // Hinted frames ride along even when off-stride
    for (idx, f) in sorted.iter().enumerate() {
        if !taken[idx] && protected(f) {
            taken[idx] = true;
            kept.push((*f).clone());
        }
    }

    // Over budget: drop the least descriptive unprotected frames
    while kept.len() > config.frame_cap {
        let victim = kept
            .iter()
            .enumerate()
            .filter(|(_, f)| !protected(f))
            .min_by_key(|(_, f)| f.description.len())
            .map(|(i, _)| i);
        match victim {
            Some(i) => {
                kept.remove(i);
            }
            None => break,
        }
    }

    sort_by_time(&mut kept);
    kept
}

fn sort_by_time(frames: &mut [Frame]) {
    frames.sort_by(|a, b| a.t.partial_cmp(&b.t).expect("no NaN frame times"));
}

/// Evenly spaced scenes, always including the first and last.
fn compress_scenes(scenes: &[Scene], cap: usize) -> Vec<Scene> {
    if scenes.len() <= cap {
        return scenes.to_vec();
    }
    if cap == 0 {
        return Vec::new();
    }
    if cap == 1 {
        return vec![scenes[0].clone()];
    }

    let mut kept = Vec::with_capacity(cap);
    let last = scenes.len() - 1;
    for i in 0..cap {
        let idx = (i as f64 * last as f64 / (cap - 1) as f64).round() as usize;
        kept.push(scenes[idx].clone());
    }
    kept.dedup_by(|a, b| a.start == b.start);
    kept
}

/// Highest word-density segments, with the first and last always kept to
/// preserve framing. Output stays in timeline order.
fn compress_segments(segments: &[TranscriptSegment], cap: usize) -> Vec<TranscriptSegment> {
    if segments.len() <= cap {
        return segments.to_vec();
    }
    if cap == 0 {
        return Vec::new();
    }

    let last = segments.len() - 1;
    let mut ranked: Vec<usize> = (0..segments.len()).collect();
    ranked.sort_by(|&a, &b| {
        segments[b]
            .word_density()
            .partial_cmp(&segments[a].word_density())
            .expect("densities are finite")
    });

    let mut keep_idx: Vec<usize> = vec![0, last];
    for idx in ranked {
        if keep_idx.len() >= cap {
            break;
        }
        if !keep_idx.contains(&idx) {
            keep_idx.push(idx);
        }
    }
    keep_idx.sort_unstable();
    keep_idx.dedup();
    keep_idx.truncate(cap);

    keep_idx.into_iter().map(|i| segments[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(t: f64, description: &str) -> Frame {
        Frame {
            t,
            description: description.to_string(),
            confidence: None,
        }
    }

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
            confidence: None,
            words: vec![],
        }
    }

    fn many_frames(n: usize) -> Vec<Frame> {
        (0..n).map(|i| frame(i as f64, "a frame description")).collect()
    }

    #[test]
    fn under_cap_passes_through() {
        let frames = many_frames(10);
        let out = compress(&frames, &[], &[], 10.0, &[], &CompressorConfig::default());
        assert_eq!(out.frames.len(), 10);
        assert_eq!(out.summary.sampled_frames, 10);
        assert_eq!(out.summary.total_frames, 10);
    }

    #[test]
    fn frames_are_capped_and_cover_the_timeline() {
        let frames = many_frames(500);
        let config = CompressorConfig::default();
        let out = compress(&frames, &[], &[], 500.0, &[], &config);

        assert!(out.frames.len() <= config.frame_cap);
        // Coverage: first pick at the start, some pick near the end
        assert!(out.frames.first().unwrap().t < 20.0);
        assert!(out.frames.last().unwrap().t > 400.0);
        // Sorted
        for pair in out.frames.windows(2) {
            assert!(pair[0].t <= pair[1].t);
        }
    }

    #[test]
    fn hinted_frames_survive_compression() {
        let frames = many_frames(500);
        let config = CompressorConfig::default();
        // 333.0 is unlikely to land on a stride pick exactly
        let out = compress(&frames, &[], &[], 500.0, &[333.0], &config);
        assert!(out.frames.iter().any(|f| (f.t - 333.0).abs() <= 0.25));
        assert!(out.frames.len() <= config.frame_cap);
    }

    #[test]
    fn scenes_keep_first_and_last() {
        let scenes: Vec<Scene> = (0..100)
            .map(|i| Scene {
                start: i as f64,
                end: (i + 1) as f64,
                description: None,
            })
            .collect();
        let out = compress(&[], &scenes, &[], 100.0, &[], &CompressorConfig::default());
        assert!(out.scenes.len() <= 20);
        assert_eq!(out.scenes.first().unwrap().start, 0.0);
        assert_eq!(out.scenes.last().unwrap().start, 99.0);
    }

    #[test]
    fn segments_prefer_density_but_keep_framing() {
        let mut segments: Vec<TranscriptSegment> = (0..200)
            .map(|i| seg(i as f64, (i + 1) as f64, "two words"))
            .collect();
        // One very dense segment in the middle
        segments[100] = seg(100.0, 101.0, "lots and lots and lots of words in one second flat");

        let out = compress(&[], &[], &segments, 200.0, &[], &CompressorConfig::default());
        assert!(out.segments.len() <= 100);
        assert_eq!(out.segments.first().unwrap().start, 0.0);
        assert_eq!(out.segments.last().unwrap().start, 199.0);
        assert!(out.segments.iter().any(|s| s.start == 100.0));
        // Timeline order preserved
        for pair in out.segments.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn summary_reports_elision() {
        let frames = many_frames(500);
        let out = compress(&frames, &[], &[], 500.0, &[], &CompressorConfig::default());
        assert_eq!(out.summary.total_frames, 500);
        assert!(out.summary.sampled_frames <= 50);
        assert!((out.summary.duration - 500.0).abs() < 1e-9);
    }
}
