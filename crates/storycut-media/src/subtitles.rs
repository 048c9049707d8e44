//! SRT generation on the output timeline.
//!
//! Burned captions are timed to the *output*, not the source: each
//! transcript segment is pushed through the plan's source-to-output mapping
//! and segments that fall entirely in skipped time are dropped.

use storycut_models::{format_timestamp_srt, Plan, Transcript};

/// Build an SRT document for a plan's output from the source transcript.
///
/// Transcript segments are clipped to the keep windows they intersect; a
/// segment spanning a cut contributes one cue per intersected window.
pub fn build_output_srt(transcript: &Transcript, plan: &Plan) -> String {
    let mut cues: Vec<(f64, f64, String)> = Vec::new();

    for seg in &transcript.segments {
        let text = seg.text.trim();
        if text.is_empty() {
            continue;
        }

        for keep in plan.keep_segments() {
            let start = seg.start.max(keep.start);
            let end = seg.end.min(keep.end);
            if end - start <= 0.05 {
                continue;
            }
            // Map the clipped window onto the output timeline
            let out_start = match plan.source_to_output(start) {
                Some(t) => t,
                None => continue,
            };
            let out_end = out_start + (end - start);
            cues.push((out_start, out_end, text.to_string()));
        }
    }

    cues.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("no NaN cue times"));

    let mut srt = String::new();
    for (i, (start, end, text)) in cues.iter().enumerate() {
        srt.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp_srt(*start),
            format_timestamp_srt(*end),
            text
        ));
    }
    srt
}

#[cfg(test)]
mod tests {
    use super::*;
    use storycut_models::{EdlSegment, MediaId, PlanMode, TranscriptSegment};

    fn transcript(segs: &[(f64, f64, &str)]) -> Transcript {
        Transcript {
            segments: segs
                .iter()
                .map(|&(start, end, text)| TranscriptSegment {
                    start,
                    end,
                    text: text.to_string(),
                    confidence: None,
                    words: vec![],
                })
                .collect(),
            language: "en".into(),
        }
    }

    fn plan(keeps: &[(f64, f64)]) -> Plan {
        let mut plan = Plan::new(MediaId::from("m"), PlanMode::Story, 0.5);
        plan.edl = keeps.iter().map(|&(s, e)| EdlSegment::keep(s, e)).collect();
        plan
    }

    #[test]
    fn cues_are_shifted_to_output_time() {
        let t = transcript(&[(12.0, 14.0, "second segment speech")]);
        let p = plan(&[(0.0, 5.0), (10.0, 20.0)]);

        let srt = build_output_srt(&t, &p);
        // Source 12.0 lands at output 5.0 + 2.0 = 7.0
        assert!(srt.contains("00:00:07,000 --> 00:00:09,000"));
        assert!(srt.contains("second segment speech"));
    }

    #[test]
    fn skipped_speech_is_dropped() {
        let t = transcript(&[(6.0, 8.0, "skipped"), (1.0, 2.0, "kept")]);
        let p = plan(&[(0.0, 5.0)]);

        let srt = build_output_srt(&t, &p);
        assert!(srt.contains("kept"));
        assert!(!srt.contains("skipped"));
    }

    #[test]
    fn segment_spanning_a_cut_is_clipped() {
        let t = transcript(&[(4.0, 12.0, "spans the cut")]);
        let p = plan(&[(0.0, 5.0), (10.0, 20.0)]);

        let srt = build_output_srt(&t, &p);
        // First cue: [4, 5) on the first keep -> output [4, 5)
        assert!(srt.contains("00:00:04,000 --> 00:00:05,000"));
        // Second cue: [10, 12) on the second keep -> output [5, 7)
        assert!(srt.contains("00:00:05,000 --> 00:00:07,000"));
    }

    #[test]
    fn cues_are_numbered_from_one() {
        let t = transcript(&[(0.0, 1.0, "a"), (2.0, 3.0, "b")]);
        let p = plan(&[(0.0, 5.0)]);
        let srt = build_output_srt(&t, &p);
        assert!(srt.starts_with("1\n"));
        assert!(srt.contains("\n2\n"));
    }

    #[test]
    fn empty_transcript_is_empty_srt() {
        let srt = build_output_srt(&Transcript::empty(), &plan(&[(0.0, 5.0)]));
        assert!(srt.is_empty());
    }
}
