//! EDL validation.
//!
//! Every plan, heuristic or model-produced, passes through here before it
//! becomes a stored `Plan` the renderer will touch. The validator clips,
//! sorts, merges and rounds; it warns rather than rewrites on coverage and
//! story-arc findings, and rejects only unrenderable plans.
//!
//! Validation is a fixed point: validating a validated plan changes
//! nothing.

use tracing::debug;

use storycut_models::{
    EdlSegment, MediaId, Plan, PlanMode, PlanStatus, PlanWarning, RawPlan, RawSegment,
    SegmentKind, StoryArc,
};

use crate::error::{PlanError, PlanResult};

/// Validator configuration.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Coverage tolerance as a percentage of the coverage target
    pub coverage_tolerance_pct: f64,
    /// Segments shorter than this after clipping are dropped
    pub min_segment_s: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            coverage_tolerance_pct: 10.0,
            min_segment_s: 0.1,
        }
    }
}

/// Round to millisecond precision.
fn round_ms(t: f64) -> f64 {
    (t * 1000.0).round() / 1000.0
}

/// Validate a raw plan against a source duration and coverage target.
///
/// On success the returned plan is `Validated` and satisfies: keep segments
/// sorted and non-overlapping, every timestamp millisecond-rounded and
/// inside `[0, duration]`, total keep duration strictly positive.
pub fn validate_raw(
    raw: &RawPlan,
    media_id: &MediaId,
    mode: PlanMode,
    duration: f64,
    desired_length_pct: f64,
    strict_coverage: bool,
    config: &ValidatorConfig,
) -> PlanResult<Plan> {
    if duration <= 0.0 {
        return Err(PlanError::EmptySource);
    }

    let mut warnings: Vec<PlanWarning> = Vec::new();

    // Schema: parse already dropped unknown fields; unknown kinds go here
    let mut keeps: Vec<EdlSegment> = Vec::new();
    let mut others: Vec<EdlSegment> = Vec::new();
    let mut unknown_kinds = 0usize;
    let mut clipped = 0usize;
    let mut dropped = 0usize;

    for raw_seg in &raw.edl {
        let kind = match raw_seg.kind.to_lowercase().as_str() {
            "keep" => SegmentKind::Keep,
            "skip" => SegmentKind::Skip,
            "transition" => SegmentKind::Transition,
            _ => {
                unknown_kinds += 1;
                continue;
            }
        };

        // Bounds: clip to [0, duration], then drop slivers
        let start = raw_seg.start.clamp(0.0, duration);
        let end = raw_seg.end.clamp(0.0, duration);
        if (start - raw_seg.start).abs() > 1e-9 || (end - raw_seg.end).abs() > 1e-9 {
            clipped += 1;
        }

        // Rounding to millisecond precision
        let start = round_ms(start);
        let end = round_ms(end);

        if end - start < config.min_segment_s {
            dropped += 1;
            continue;
        }

        let seg = EdlSegment {
            start,
            end,
            kind,
            transition_kind: raw_seg.transition_kind.clone(),
            transition_duration: raw_seg.transition_duration.map(round_ms),
            reason: raw_seg.reason.clone(),
        };
        if kind == SegmentKind::Keep {
            keeps.push(seg);
        } else {
            others.push(seg);
        }
    }

    if unknown_kinds > 0 {
        warnings.push(PlanWarning::new(
            "unknown_kinds",
            format!("{} segments with unknown kind dropped", unknown_kinds),
        ));
    }
    if clipped > 0 {
        warnings.push(PlanWarning::new(
            "clipped_bounds",
            format!("{} segments clipped to [0, {:.3}]", clipped, duration),
        ));
    }
    if dropped > 0 {
        warnings.push(PlanWarning::new(
            "dropped_segments",
            format!(
                "{} segments shorter than {:.1}ms dropped",
                dropped,
                config.min_segment_s * 1000.0
            ),
        ));
    }

    // Ordering: keeps sorted by start, overlapping or touching keeps merged
    keeps.sort_by(|a, b| a.start.partial_cmp(&b.start).expect("finite timestamps"));
    let (keeps, merged) = merge_keeps(keeps);
    if merged > 0 {
        warnings.push(PlanWarning::new(
            "merged_segments",
            format!("{} overlapping keep segments merged", merged),
        ));
    }

    // Non-empty
    let total_keep: f64 = keeps.iter().map(|s| s.duration()).sum();
    if total_keep <= 0.0 {
        return Err(PlanError::Unrenderable(
            "plan has no keep duration".to_string(),
        ));
    }

    // Coverage: warn-only unless the caller opted into strict enforcement
    let target = desired_length_pct * duration;
    let tolerance = target * config.coverage_tolerance_pct / 100.0;
    let (lo, hi) = (target - tolerance, target + tolerance);
    if total_keep < lo || total_keep > hi {
        if strict_coverage {
            return Err(PlanError::CoverageOutOfBand {
                actual: total_keep,
                lo,
                hi,
            });
        }
        warnings.push(PlanWarning::new(
            "coverage",
            format!(
                "total keep {:.3}s outside target band [{:.3}s, {:.3}s]",
                total_keep, lo, hi
            ),
        ));
    }

    // Story arc consistency
    let story_arc = raw.story_arc.map(|arc| StoryArc {
        hook_t: round_ms(arc.hook_t.clamp(0.0, duration)),
        climax_t: round_ms(arc.climax_t.clamp(0.0, duration)),
        resolution_t: round_ms(arc.resolution_t.clamp(0.0, duration)),
    });
    if let Some(arc) = &story_arc {
        let covered = |t: f64| keeps.iter().any(|s| t >= s.start && t < s.end);
        if !arc.is_ordered() {
            warnings.push(PlanWarning::new(
                "story_arc",
                "story arc anchors are not strictly ordered",
            ));
        } else if !(covered(arc.hook_t) && covered(arc.climax_t) && covered(arc.resolution_t)) {
            warnings.push(PlanWarning::new(
                "story_arc",
                "a story arc anchor falls outside every keep segment",
            ));
        }
    }

    // Final EDL in timeline order: keeps plus advisory skip/transition rows
    let mut edl = keeps;
    edl.extend(others);
    edl.sort_by(|a, b| {
        a.start
            .partial_cmp(&b.start)
            .expect("finite timestamps")
            .then(a.end.partial_cmp(&b.end).expect("finite timestamps"))
    });

    let mut plan = Plan::new(media_id.clone(), mode, desired_length_pct);
    plan.status = PlanStatus::Validated;
    plan.story_arc = story_arc;
    plan.edl = edl;
    plan.key_moments = raw.key_moments.clone();
    plan.transitions = raw.transitions.clone();
    plan.recommendations = raw.recommendations.clone();
    plan.warnings = warnings;

    debug!(
        media_id = %media_id,
        keeps = plan.keep_segments().len(),
        total_keep = total_keep,
        warnings = plan.warnings.len(),
        "plan validated"
    );

    Ok(plan)
}

/// Merge sorted keeps that overlap or touch. Returns the merged list and
/// how many merges happened.
fn merge_keeps(sorted: Vec<EdlSegment>) -> (Vec<EdlSegment>, usize) {
    let mut merged: Vec<EdlSegment> = Vec::with_capacity(sorted.len());
    let mut merges = 0usize;

    for seg in sorted {
        match merged.last_mut() {
            Some(last) if seg.start <= last.end => {
                merges += 1;
                last.end = last.end.max(seg.end);
                last.reason = match (last.reason.take(), seg.reason) {
                    (Some(a), Some(b)) if a != b => Some(format!("{}; {}", a, b)),
                    (Some(a), _) => Some(a),
                    (None, b) => b,
                };
            }
            _ => merged.push(seg),
        }
    }

    (merged, merges)
}

/// Project a validated plan back into the raw contract shape. Used to
/// verify the fixed-point property and by tests that re-validate.
pub fn plan_to_raw(plan: &Plan) -> RawPlan {
    RawPlan {
        story_arc: plan.story_arc,
        key_moments: plan.key_moments.clone(),
        edl: plan
            .edl
            .iter()
            .map(|s| RawSegment {
                start: s.start,
                end: s.end,
                kind: match s.kind {
                    SegmentKind::Keep => "keep".to_string(),
                    SegmentKind::Skip => "skip".to_string(),
                    SegmentKind::Transition => "transition".to_string(),
                },
                transition_kind: s.transition_kind.clone(),
                transition_duration: s.transition_duration,
                reason: s.reason.clone(),
            })
            .collect(),
        transitions: plan.transitions.clone(),
        recommendations: plan.recommendations.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media() -> MediaId {
        MediaId::from("m1")
    }

    fn raw_keeps(windows: &[(f64, f64)]) -> RawPlan {
        RawPlan::from_keep_windows(windows)
    }

    fn validate(
        raw: &RawPlan,
        duration: f64,
        desired_length_pct: f64,
    ) -> PlanResult<Plan> {
        validate_raw(
            raw,
            &media(),
            PlanMode::Story,
            duration,
            desired_length_pct,
            false,
            &ValidatorConfig::default(),
        )
    }

    #[test]
    fn coverage_inside_band_has_no_warning() {
        // 30s keep out of 100s, target 30% +- 3s
        let raw = raw_keeps(&[(2.0, 12.0), (20.0, 30.0), (40.0, 50.0)]);
        let plan = validate(&raw, 100.0, 0.3).unwrap();
        assert!((plan.total_keep() - 30.0).abs() < 1e-9);
        assert!(plan.warnings.iter().all(|w| w.code != "coverage"));
        assert_eq!(plan.status, PlanStatus::Validated);
    }

    #[test]
    fn overlapping_keeps_are_merged_with_warning() {
        let raw = raw_keeps(&[(0.0, 10.0), (5.0, 12.0), (20.0, 25.0)]);
        let plan = validate(&raw, 100.0, 0.2).unwrap();

        let keeps: Vec<(f64, f64)> = plan
            .keep_segments()
            .iter()
            .map(|s| (s.start, s.end))
            .collect();
        assert_eq!(keeps, vec![(0.0, 12.0), (20.0, 25.0)]);
        assert!(plan.warnings.iter().any(|w| w.code == "merged_segments"));
    }

    #[test]
    fn out_of_bounds_segments_are_clipped() {
        let raw = raw_keeps(&[(90.0, 102.0)]);
        let plan = validate(&raw, 100.0, 0.1).unwrap();
        let keeps = plan.keep_segments();
        assert_eq!(keeps.len(), 1);
        assert!((keeps[0].end - 100.0).abs() < 1e-9);
        assert!(plan.warnings.iter().any(|w| w.code == "clipped_bounds"));
    }

    #[test]
    fn slivers_are_dropped() {
        let raw = raw_keeps(&[(0.0, 0.05), (10.0, 30.0)]);
        let plan = validate(&raw, 100.0, 0.2).unwrap();
        assert_eq!(plan.keep_segments().len(), 1);
        assert!(plan.warnings.iter().any(|w| w.code == "dropped_segments"));
    }

    #[test]
    fn timestamps_are_rounded_to_ms() {
        let raw = raw_keeps(&[(0.12345, 10.98765)]);
        let plan = validate(&raw, 100.0, 0.1).unwrap();
        let keep = plan.keep_segments()[0];
        assert_eq!(keep.start, 0.123);
        assert_eq!(keep.end, 10.988);
    }

    #[test]
    fn empty_edl_is_unrenderable() {
        let raw = RawPlan::default();
        let err = validate(&raw, 100.0, 0.3).unwrap_err();
        assert!(matches!(err, PlanError::Unrenderable(_)));
    }

    #[test]
    fn coverage_outside_band_warns_but_accepts() {
        // 5s keep vs 30s target
        let raw = raw_keeps(&[(0.0, 5.0)]);
        let plan = validate(&raw, 100.0, 0.3).unwrap();
        assert!(plan.warnings.iter().any(|w| w.code == "coverage"));
    }

    #[test]
    fn strict_coverage_rejects() {
        let raw = raw_keeps(&[(0.0, 5.0)]);
        let err = validate_raw(
            &raw,
            &media(),
            PlanMode::Story,
            100.0,
            0.3,
            true,
            &ValidatorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::CoverageOutOfBand { .. }));
    }

    #[test]
    fn unknown_kinds_are_dropped() {
        let mut raw = raw_keeps(&[(0.0, 20.0)]);
        raw.edl.push(RawSegment {
            start: 30.0,
            end: 40.0,
            kind: "explode".to_string(),
            transition_kind: None,
            transition_duration: None,
            reason: None,
        });
        let plan = validate(&raw, 100.0, 0.2).unwrap();
        assert_eq!(plan.edl.len(), 1);
        assert!(plan.warnings.iter().any(|w| w.code == "unknown_kinds"));
    }

    #[test]
    fn misordered_story_arc_warns() {
        let mut raw = raw_keeps(&[(0.0, 50.0)]);
        raw.story_arc = Some(StoryArc {
            hook_t: 40.0,
            climax_t: 10.0,
            resolution_t: 45.0,
        });
        let plan = validate(&raw, 100.0, 0.5).unwrap();
        assert!(plan.warnings.iter().any(|w| w.code == "story_arc"));
    }

    #[test]
    fn uncovered_story_arc_anchor_warns() {
        let mut raw = raw_keeps(&[(0.0, 20.0)]);
        raw.story_arc = Some(StoryArc {
            hook_t: 1.0,
            climax_t: 10.0,
            // Outside the only keep segment
            resolution_t: 80.0,
        });
        let plan = validate(&raw, 100.0, 0.2).unwrap();
        assert!(plan.warnings.iter().any(|w| w.code == "story_arc"));
    }

    #[test]
    fn skip_and_transition_rows_pass_through_unrendered() {
        let mut raw = raw_keeps(&[(0.0, 20.0)]);
        raw.edl.push(RawSegment {
            start: 20.0,
            end: 25.0,
            kind: "transition".to_string(),
            transition_kind: Some("fade".to_string()),
            transition_duration: Some(0.5),
            reason: None,
        });
        let plan = validate(&raw, 100.0, 0.2).unwrap();
        assert_eq!(plan.edl.len(), 2);
        // Transition rows contribute no output duration
        assert!((plan.total_keep() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn validation_is_a_fixed_point() {
        let mut raw = raw_keeps(&[(0.0, 10.0), (5.0, 12.3456), (20.0, 30.0), (95.0, 104.0)]);
        raw.story_arc = Some(StoryArc {
            hook_t: 1.0,
            climax_t: 21.0,
            resolution_t: 96.0,
        });

        let once = validate(&raw, 100.0, 0.3).unwrap();
        let twice = validate(&plan_to_raw(&once), 100.0, 0.3).unwrap();

        assert_eq!(once.edl, twice.edl);
        assert_eq!(once.story_arc, twice.story_arc);
        assert!((once.total_keep() - twice.total_keep()).abs() < 1e-12);
        // The sanitised plan re-validates without sanitisation warnings
        for code in ["merged_segments", "clipped_bounds", "dropped_segments"] {
            assert!(
                twice.warnings.iter().all(|w| w.code != code),
                "second pass produced {}",
                code
            );
        }
    }

    #[test]
    fn empty_source_is_rejected_outright() {
        let raw = raw_keeps(&[(0.0, 1.0)]);
        assert!(matches!(
            validate(&raw, 0.0, 0.3),
            Err(PlanError::EmptySource)
        ));
    }
}
