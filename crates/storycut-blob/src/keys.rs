//! Canonical blob key layout.

use storycut_models::{AspectRatio, JobId, MediaId, PlanId};

/// Key for an uploaded original.
pub fn original_key(media_id: &MediaId, filename: &str) -> String {
    format!("originals/{}/{}", media_id, filename)
}

/// Key for the extracted mono 16 kHz audio artefact.
pub fn audio_key(media_id: &MediaId) -> String {
    format!("derived/{}/audio.wav", media_id)
}

/// Key for one sampled frame, timestamped in milliseconds.
pub fn frame_key(media_id: &MediaId, t: f64) -> String {
    format!("derived/{}/frames/{}.jpg", media_id, (t * 1000.0).round() as u64)
}

/// Key for a rendered output in one aspect ratio.
pub fn render_key(plan_id: &PlanId, aspect: AspectRatio) -> String {
    format!("renders/{}/{}.mp4", plan_id, aspect.file_stem())
}

/// Key for a rendered output's thumbnail.
pub fn render_thumbnail_key(plan_id: &PlanId, aspect: AspectRatio) -> String {
    format!("renders/{}/{}.jpg", plan_id, aspect.file_stem())
}

/// Scratch prefix for one job; deleted when the job reaches a terminal state.
pub fn tmp_prefix(job_id: &JobId) -> String {
    format!("tmp/{}/", job_id)
}

/// Key for one extracted intermediate segment.
pub fn tmp_segment_key(job_id: &JobId, index: usize) -> String {
    format!("tmp/{}/segments/{}.mkv", job_id, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_layout() {
        let media = MediaId::from("m1");
        let plan = PlanId::from("p1");
        let job = JobId::from("j1");

        assert_eq!(original_key(&media, "source.mp4"), "originals/m1/source.mp4");
        assert_eq!(audio_key(&media), "derived/m1/audio.wav");
        assert_eq!(frame_key(&media, 1.5), "derived/m1/frames/1500.jpg");
        assert_eq!(
            render_key(&plan, AspectRatio::PORTRAIT),
            "renders/p1/9x16.mp4"
        );
        assert_eq!(tmp_segment_key(&job, 3), "tmp/j1/segments/3.mkv");
        assert!(tmp_segment_key(&job, 0).starts_with(&tmp_prefix(&job)));
    }
}
