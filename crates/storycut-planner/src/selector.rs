//! Heuristic clip selection.
//!
//! Candidate windows are anchored at transcript segment starts and end on
//! later segment boundaries, so cuts land on natural speech edges. Each
//! window gets a retention score in [0, 100]; selection is greedy by score
//! under a pairwise non-overlap constraint with ties broken by earlier
//! start.

use tracing::debug;

use storycut_models::{
    ClipCandidate, ClipFeatures, MediaId, SceneCuts, SilenceMap, Transcript,
};

/// Clip selector configuration.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Minimum candidate duration in seconds
    pub min_clip_s: f64,
    /// Maximum candidate duration in seconds
    pub max_clip_s: f64,
    /// Maximum number of candidates returned
    pub max_candidates: usize,
    /// Hook words matched case-insensitively against segment text
    pub hook_words: Vec<String>,
    /// Boundary-to-cut alignment tolerance in seconds
    pub scene_align_tolerance_s: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_clip_s: 15.0,
            max_clip_s: 60.0,
            max_candidates: 5,
            hook_words: [
                "secret", "never", "always", "mistake", "why", "how", "best", "worst",
                "surprising", "nobody", "everyone", "free", "proven", "stop",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            scene_align_tolerance_s: 0.25,
        }
    }
}

// Scoring weights. Density saturates at a brisk 2.5 words/second.
const DENSITY_FULL_WPS: f64 = 2.5;
const DENSITY_WEIGHT: f64 = 40.0;
const SILENCE_PENALTY: f64 = 30.0;
const KEYWORD_POINTS: f64 = 5.0;
const KEYWORD_CAP: f64 = 15.0;
const ALIGN_POINTS: f64 = 5.0;
const SHAPE_BONUS: f64 = 10.0;
const SHAPE_SWEET_LO: f64 = 20.0;
const SHAPE_SWEET_HI: f64 = 40.0;

/// Produce scored, non-overlapping clip candidates.
///
/// Returns an empty list when the transcript is missing or empty; a
/// candidate-less media is not an error.
pub fn select_clips(
    media_id: &MediaId,
    transcript: Option<&Transcript>,
    silence: Option<&SilenceMap>,
    cuts: Option<&SceneCuts>,
    duration: f64,
    config: &SelectorConfig,
) -> Vec<ClipCandidate> {
    let transcript = match transcript {
        Some(t) if !t.is_empty() => t,
        _ => return Vec::new(),
    };
    if duration <= 0.0 {
        return Vec::new();
    }

    let empty_silence = SilenceMap::empty();
    let silence = silence.unwrap_or(&empty_silence);
    let empty_cuts = SceneCuts::empty();
    let cuts = cuts.unwrap_or(&empty_cuts);

    let mut scored: Vec<ClipCandidate> = Vec::new();

    // Anchor a window at each segment start; extend over following segment
    // ends inside the duration band.
    for (i, anchor) in transcript.segments.iter().enumerate() {
        let start = anchor.start;
        for end_seg in &transcript.segments[i..] {
            let end = end_seg.end.min(duration);
            let len = end - start;
            if len < config.min_clip_s {
                continue;
            }
            if len > config.max_clip_s {
                break;
            }
            let candidate = score_window(
                media_id, transcript, silence, cuts, start, end, config,
            );
            scored.push(candidate);
        }
    }

    // Greedy by score, ties by earlier start
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .expect("scores are finite")
            .then(a.start.partial_cmp(&b.start).expect("starts are finite"))
    });

    let mut selected: Vec<ClipCandidate> = Vec::new();
    for candidate in scored {
        if selected.len() >= config.max_candidates {
            break;
        }
        if selected.iter().all(|s| !s.overlaps(&candidate)) {
            selected.push(candidate);
        }
    }

    selected.sort_by(|a, b| a.start.partial_cmp(&b.start).expect("starts are finite"));
    debug!(media_id = %media_id, count = selected.len(), "selected clip candidates");
    selected
}

fn score_window(
    media_id: &MediaId,
    transcript: &Transcript,
    silence: &SilenceMap,
    cuts: &SceneCuts,
    start: f64,
    end: f64,
    config: &SelectorConfig,
) -> ClipCandidate {
    let len = end - start;

    // Speech density: words from segments overlapping the window
    let mut words = 0usize;
    let mut hook_text: Option<String> = None;
    let mut keyword_hits = 0u32;

    for seg in &transcript.segments {
        if seg.end <= start || seg.start >= end {
            continue;
        }
        words += if seg.words.is_empty() {
            seg.text.split_whitespace().count()
        } else {
            seg.words.len()
        };
        if hook_text.is_none() && !seg.text.trim().is_empty() {
            hook_text = Some(seg.text.trim().to_string());
        }
        let lower = seg.text.to_lowercase();
        for hook in &config.hook_words {
            keyword_hits += lower.matches(hook.as_str()).count() as u32;
        }
    }

    let speech_density = words as f64 / len;
    let silence_ratio = silence.silence_ratio(start, end);
    let start_aligned = cuts.near_cut(start, config.scene_align_tolerance_s);
    let end_aligned = cuts.near_cut(end, config.scene_align_tolerance_s);

    let mut score = 0.0;
    score += (speech_density / DENSITY_FULL_WPS).min(1.0) * DENSITY_WEIGHT;
    score -= silence_ratio * SILENCE_PENALTY;
    score += (keyword_hits as f64 * KEYWORD_POINTS).min(KEYWORD_CAP);
    if start_aligned {
        score += ALIGN_POINTS;
    }
    if end_aligned {
        score += ALIGN_POINTS;
    }
    if (SHAPE_SWEET_LO..=SHAPE_SWEET_HI).contains(&len) {
        score += SHAPE_BONUS;
    } else if len < config.min_clip_s || len > config.max_clip_s {
        score -= SHAPE_BONUS;
    }

    ClipCandidate {
        media_id: media_id.clone(),
        start,
        end,
        score: score.clamp(0.0, 100.0),
        features: ClipFeatures {
            speech_density,
            silence_ratio,
            keyword_hits,
            scene_aligned: start_aligned || end_aligned,
        },
        hook_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storycut_models::TranscriptSegment;

    fn dense_transcript(duration: f64) -> Transcript {
        // 5-second segments of brisk speech across the timeline
        let mut segments = Vec::new();
        let mut t = 0.0;
        while t + 5.0 <= duration {
            segments.push(TranscriptSegment {
                start: t,
                end: t + 5.0,
                text: "ten words of speech fill this short segment right here".into(),
                confidence: None,
                words: vec![],
            });
            t += 5.0;
        }
        Transcript {
            segments,
            language: "en".into(),
        }
    }

    #[test]
    fn no_transcript_yields_no_candidates() {
        let out = select_clips(
            &MediaId::from("m"),
            None,
            None,
            None,
            120.0,
            &SelectorConfig::default(),
        );
        assert!(out.is_empty());

        let empty = Transcript::empty();
        let out = select_clips(
            &MediaId::from("m"),
            Some(&empty),
            None,
            None,
            120.0,
            &SelectorConfig::default(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn candidates_respect_duration_band_and_count() {
        let transcript = dense_transcript(300.0);
        let config = SelectorConfig::default();
        let out = select_clips(
            &MediaId::from("m"),
            Some(&transcript),
            None,
            None,
            300.0,
            &config,
        );

        assert!(!out.is_empty());
        assert!(out.len() <= config.max_candidates);
        for c in &out {
            assert!(c.duration() >= config.min_clip_s);
            assert!(c.duration() <= config.max_clip_s);
            assert!(c.score >= 0.0 && c.score <= 100.0);
            assert!(c.hook_text.is_some());
        }
    }

    #[test]
    fn candidates_never_overlap() {
        let transcript = dense_transcript(300.0);
        let out = select_clips(
            &MediaId::from("m"),
            Some(&transcript),
            None,
            None,
            300.0,
            &SelectorConfig::default(),
        );
        for (i, a) in out.iter().enumerate() {
            for b in &out[i + 1..] {
                assert!(!a.overlaps(b), "{:?} overlaps {:?}", (a.start, a.end), (b.start, b.end));
            }
        }
    }

    #[test]
    fn silence_drags_the_score_down() {
        let transcript = dense_transcript(60.0);
        let media = MediaId::from("m");
        let quiet = SilenceMap {
            intervals: vec![storycut_models::SilenceInterval {
                start: 0.0,
                end: 30.0,
            }],
            min_silence_s: 0.6,
        };

        let loud_score = select_clips(
            &media,
            Some(&transcript),
            None,
            None,
            60.0,
            &SelectorConfig::default(),
        )[0]
        .score;
        let quiet_score = select_clips(
            &media,
            Some(&transcript),
            Some(&quiet),
            None,
            60.0,
            &SelectorConfig::default(),
        )[0]
        .score;
        assert!(quiet_score < loud_score);
    }

    #[test]
    fn keyword_and_alignment_bonuses_apply() {
        let mut transcript = dense_transcript(60.0);
        transcript.segments[0].text = "the secret nobody tells you".into();
        let cuts = SceneCuts { cuts: vec![20.1] };

        let out = select_clips(
            &MediaId::from("m"),
            Some(&transcript),
            None,
            Some(&cuts),
            60.0,
            &SelectorConfig::default(),
        );
        let best = &out[0];
        assert!(best.features.keyword_hits >= 2);
        // A window ending near 20.1 exists and gets the alignment flag
        assert!(out.iter().any(|c| c.features.scene_aligned));
    }
}
