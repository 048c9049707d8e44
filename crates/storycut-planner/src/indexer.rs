//! Scene indexing: cuts + described frames -> labeled scene intervals.

use storycut_models::{Frame, Scene, SceneCuts};

/// Merge scene cuts and frame descriptions into covering scene intervals.
///
/// Boundaries are `[0, cut_1, ..., cut_n, duration]`, so scenes are
/// adjacent with no gaps. Each scene's description concatenates the
/// descriptions of frames falling inside it, in timestamp order. An empty
/// cut list yields one scene covering the whole timeline.
pub fn index_scenes(cuts: &SceneCuts, frames: &[Frame], duration: f64) -> Vec<Scene> {
    if duration <= 0.0 {
        return Vec::new();
    }

    let mut boundaries = Vec::with_capacity(cuts.cuts.len() + 2);
    boundaries.push(0.0);
    boundaries.extend(cuts.cuts.iter().copied().filter(|&c| c > 0.0 && c < duration));
    boundaries.push(duration);

    let mut sorted_frames: Vec<&Frame> = frames.iter().collect();
    sorted_frames.sort_by(|a, b| a.t.partial_cmp(&b.t).expect("no NaN frame times"));

    boundaries
        .windows(2)
        .map(|w| {
            let (start, end) = (w[0], w[1]);
            let descriptions: Vec<&str> = sorted_frames
                .iter()
                .filter(|f| f.t >= start && f.t < end)
                .map(|f| f.description.trim())
                .filter(|d| !d.is_empty())
                .collect();
            Scene {
                start,
                end,
                description: if descriptions.is_empty() {
                    None
                } else {
                    Some(descriptions.join("; "))
                },
            }
        })
        .collect()
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

    #[test]
    fn no_cuts_means_one_scene() {
        let scenes = index_scenes(&SceneCuts::empty(), &[], 30.0);
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].start, 0.0);
        assert_eq!(scenes[0].end, 30.0);
        assert!(scenes[0].description.is_none());
    }

    #[test]
    fn cuts_partition_the_timeline() {
        let cuts = SceneCuts {
            cuts: vec![5.0, 12.0],
        };
        let scenes = index_scenes(&cuts, &[], 30.0);
        assert_eq!(scenes.len(), 3);
        assert_eq!((scenes[0].start, scenes[0].end), (0.0, 5.0));
        assert_eq!((scenes[1].start, scenes[1].end), (5.0, 12.0));
        assert_eq!((scenes[2].start, scenes[2].end), (12.0, 30.0));

        // Adjacent, no gaps
        for pair in scenes.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn frames_label_their_scene() {
        let cuts = SceneCuts { cuts: vec![10.0] };
        let frames = vec![
            frame(12.0, "a desk with monitors"),
            frame(2.0, "speaker at a podium"),
            frame(8.0, "audience wide shot"),
        ];
        let scenes = index_scenes(&cuts, &frames, 20.0);
        assert_eq!(
            scenes[0].description.as_deref(),
            Some("speaker at a podium; audience wide shot")
        );
        assert_eq!(scenes[1].description.as_deref(), Some("a desk with monitors"));
    }

    #[test]
    fn boundary_frame_belongs_to_the_right_scene() {
        let cuts = SceneCuts { cuts: vec![10.0] };
        let frames = vec![frame(10.0, "on the cut")];
        let scenes = index_scenes(&cuts, &frames, 20.0);
        assert!(scenes[0].description.is_none());
        assert_eq!(scenes[1].description.as_deref(), Some("on the cut"));
    }

    #[test]
    fn empty_source_yields_no_scenes() {
        assert!(index_scenes(&SceneCuts::empty(), &[], 0.0).is_empty());
    }
}
