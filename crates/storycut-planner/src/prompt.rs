//! Deterministic planner prompt assembly.

use std::fmt::Write as _;

use storycut_models::{format_timestamp, StoryBrief};

use crate::compress::CompressedEnrichment;

/// Assemble the full prompt envelope: system requirements, compressed
/// context, then the caller's story requirements. The output is a pure
/// function of its inputs so retried attempts send identical prompts.
pub fn build_prompt(
    compressed: &CompressedEnrichment,
    brief: &StoryBrief,
    duration: f64,
    tolerance_pct: f64,
) -> String {
    let target_s = brief.desired_length_pct * duration;
    let tolerance_s = target_s * tolerance_pct / 100.0;

    let mut p = String::new();

    // --- system section: hard requirements -------------------------------
    p.push_str("You are a video story editor. Plan a re-edit of the source video.\n");
    p.push_str("Respond with ONE JSON object and nothing else. No prose, no markdown.\n");
    p.push_str("The object must have exactly this shape:\n");
    p.push_str(concat!(
        "{\n",
        "  \"story_arc\": {\"hook_t\": <s>, \"climax_t\": <s>, \"resolution_t\": <s>},\n",
        "  \"key_moments\": [{\"start\": <s>, \"end\": <s>, \"importance\": \"high|medium|low\", ",
        "\"role\": \"hook|build|climax|resolution\", \"reason\": <str>}],\n",
        "  \"edl\": [{\"start\": <s>, \"end\": <s>, \"kind\": \"keep|skip|transition\", ",
        "\"transition_kind\": \"fade|cut|xfade\"?, \"transition_duration\": <s>?, \"reason\": <str>}],\n",
        "  \"transitions\": [{\"from\": <s>, \"to\": <s>, \"kind\": <str>, \"reason\": <str>}],\n",
        "  \"recommendations\": [{\"message\": <str>, \"timestamp\": <s>?, \"priority\": \"high|medium|low\"}]\n",
        "}\n",
    ));
    let _ = writeln!(
        p,
        "All timestamps are seconds from start, inside [0, {:.3}].",
        duration
    );
    let _ = writeln!(
        p,
        "The summed duration of keep segments must be {:.1}s, within {:.1}s of that target.",
        target_s, tolerance_s
    );
    p.push_str("Story arc timestamps must be strictly ordered and land inside keep segments.\n");

    // --- context section -------------------------------------------------
    p.push_str("\n== SOURCE CONTEXT ==\n");
    let s = &compressed.summary;
    let _ = writeln!(
        p,
        "Duration {:.1}s. Transcript segments: {} of {} shown. Scenes: {} of {} shown. \
         Frame descriptions: {} of {} shown.",
        s.duration,
        s.sampled_segments,
        s.total_segments,
        s.sampled_scenes,
        s.total_scenes,
        s.sampled_frames,
        s.total_frames,
    );

    if !compressed.scenes.is_empty() {
        p.push_str("\nSCENES:\n");
        for scene in &compressed.scenes {
            let _ = writeln!(
                p,
                "[{} - {}] {}",
                format_timestamp(scene.start),
                format_timestamp(scene.end),
                scene.description.as_deref().unwrap_or("(no description)")
            );
        }
    }

    if !compressed.frames.is_empty() {
        p.push_str("\nFRAMES:\n");
        for frame in &compressed.frames {
            let _ = writeln!(p, "[{}] {}", format_timestamp(frame.t), frame.description);
        }
    }

    if !compressed.segments.is_empty() {
        p.push_str("\nTRANSCRIPT:\n");
        for seg in &compressed.segments {
            let _ = writeln!(
                p,
                "[{} - {}] {}",
                format_timestamp(seg.start),
                format_timestamp(seg.end),
                seg.text.trim()
            );
        }
    }

    // --- story requirements ----------------------------------------------
    p.push_str("\n== STORY REQUIREMENTS ==\n");
    let _ = writeln!(p, "Story: {}", brief.story_prompt.trim());
    if let Some(summary) = &brief.summary {
        let _ = writeln!(p, "Source summary: {}", summary.trim());
    }
    if let Some(audience) = &brief.target_audience {
        let _ = writeln!(p, "Target audience: {}", audience.trim());
    }
    if let Some(tone) = &brief.tone {
        let _ = writeln!(p, "Tone: {}", tone.trim());
    }
    if let Some(message) = &brief.key_message {
        let _ = writeln!(p, "Key message: {}", message.trim());
    }
    for descriptor in &brief.story_arc {
        let _ = writeln!(p, "Arc: {}", descriptor.trim());
    }
    for pref in &brief.style_preferences {
        let _ = writeln!(p, "Style: {}", pref.trim());
    }
    let _ = writeln!(
        p,
        "Desired length: {:.0}% of the source ({:.1}s, tolerance {:.1}s).",
        brief.desired_length_pct * 100.0,
        target_s,
        tolerance_s
    );

    p
}
