//! In-memory registry backend.
//!
//! The default backend for tests and single-node deployments. All state
//! lives under one `RwLock`, which linearises conditional updates the same
//! way a transactional store would.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use storycut_models::{
    ClipCandidate, Frame, Job, JobId, JobKind, JobStatus, Media, MediaId, MediaStatus, Plan,
    PlanId, PlanStatus, Render, RenderId, RenderStatus, Scene, SceneCuts, SilenceMap, Transcript,
};

use crate::error::{RegistryError, RegistryResult};
use crate::patch::{JobPatch, MediaPatch, RenderPatch};
use crate::repo::Registry;

#[derive(Default)]
struct Inner {
    media: HashMap<MediaId, Media>,
    jobs: HashMap<JobId, Job>,
    transcripts: HashMap<MediaId, Transcript>,
    silence_maps: HashMap<MediaId, SilenceMap>,
    scene_cuts: HashMap<MediaId, SceneCuts>,
    frames: HashMap<MediaId, Vec<Frame>>,
    scenes: HashMap<MediaId, Vec<Scene>>,
    clip_candidates: HashMap<MediaId, Vec<ClipCandidate>>,
    plans: HashMap<PlanId, Plan>,
    renders: HashMap<RenderId, Render>,
}

/// In-memory [`Registry`] implementation.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn create_media(&self, media: Media) -> RegistryResult<()> {
        let mut inner = self.inner.write().await;
        if inner.media.contains_key(&media.media_id) {
            return Err(RegistryError::AlreadyExists(format!(
                "media {}",
                media.media_id
            )));
        }
        debug!(media_id = %media.media_id, "created media");
        inner.media.insert(media.media_id.clone(), media);
        Ok(())
    }

    async fn get_media(&self, media_id: &MediaId) -> RegistryResult<Option<Media>> {
        Ok(self.inner.read().await.media.get(media_id).cloned())
    }

    async fn update_media_if_status(
        &self,
        media_id: &MediaId,
        expected: MediaStatus,
        new: MediaStatus,
        patch: MediaPatch,
    ) -> RegistryResult<Media> {
        let mut inner = self.inner.write().await;
        let media = inner
            .media
            .get_mut(media_id)
            .ok_or_else(|| RegistryError::not_found(format!("media {}", media_id)))?;

        if media.status != expected {
            return Err(RegistryError::conflict(
                format!("media {}", media_id),
                expected.as_str(),
                media.status.as_str(),
            ));
        }

        media.status = new;
        if let Some(technical) = patch.technical {
            media.technical = Some(technical);
        }
        if let Some(error) = patch.error {
            media.error = Some(error);
        }
        media.updated_at = Utc::now();
        debug!(media_id = %media_id, status = %new, "media transition");
        Ok(media.clone())
    }

    async fn soft_delete_media(&self, media_id: &MediaId) -> RegistryResult<Media> {
        let mut inner = self.inner.write().await;
        let media = inner
            .media
            .get_mut(media_id)
            .ok_or_else(|| RegistryError::not_found(format!("media {}", media_id)))?;
        if media.status != MediaStatus::Deleted {
            media.status = MediaStatus::Deleted;
            media.updated_at = Utc::now();
        }
        Ok(media.clone())
    }

    async fn create_job(&self, job: Job) -> RegistryResult<()> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&job.job_id) {
            return Err(RegistryError::AlreadyExists(format!("job {}", job.job_id)));
        }
        debug!(job_id = %job.job_id, kind = %job.kind, "created job");
        inner.jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> RegistryResult<Option<Job>> {
        Ok(self.inner.read().await.jobs.get(job_id).cloned())
    }

    async fn update_job_if_status(
        &self,
        job_id: &JobId,
        expected: JobStatus,
        new: JobStatus,
        patch: JobPatch,
    ) -> RegistryResult<Job> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::not_found(format!("job {}", job_id)))?;

        if job.status != expected {
            return Err(RegistryError::conflict(
                format!("job {}", job_id),
                expected.as_str(),
                job.status.as_str(),
            ));
        }
        if !expected.can_transition_to(new) {
            return Err(RegistryError::IllegalTransition {
                entity: format!("job {}", job_id),
                from: expected.as_str().to_string(),
                to: new.as_str().to_string(),
            });
        }

        job.status = new;
        match new {
            JobStatus::Running => job.started_at = Some(Utc::now()),
            s if s.is_terminal() => job.finished_at = Some(Utc::now()),
            _ => {}
        }
        if let Some(result) = patch.result {
            job.result = Some(result);
        }
        if let Some(error) = patch.error {
            job.error = Some(error);
        }
        debug!(job_id = %job_id, status = %new, "job transition");
        Ok(job.clone())
    }

    async fn request_job_cancel(&self, job_id: &JobId) -> RegistryResult<Job> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::not_found(format!("job {}", job_id)))?;
        if !job.status.is_terminal() {
            job.cancel_requested = true;
        }
        Ok(job.clone())
    }

    async fn list_jobs_by_media(&self, media_id: &MediaId) -> RegistryResult<Vec<Job>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| &j.media_id == media_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.enqueued_at);
        Ok(jobs)
    }

    async fn list_jobs_by_media_kind(
        &self,
        media_id: &MediaId,
        kind: JobKind,
    ) -> RegistryResult<Vec<Job>> {
        let mut jobs = self.list_jobs_by_media(media_id).await?;
        jobs.retain(|j| j.kind == kind);
        Ok(jobs)
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> RegistryResult<Vec<Job>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.enqueued_at);
        Ok(jobs)
    }

    async fn put_transcript(
        &self,
        media_id: &MediaId,
        transcript: Transcript,
    ) -> RegistryResult<()> {
        self.inner
            .write()
            .await
            .transcripts
            .insert(media_id.clone(), transcript);
        Ok(())
    }

    async fn get_transcript(&self, media_id: &MediaId) -> RegistryResult<Option<Transcript>> {
        Ok(self.inner.read().await.transcripts.get(media_id).cloned())
    }

    async fn put_silence_map(&self, media_id: &MediaId, map: SilenceMap) -> RegistryResult<()> {
        self.inner
            .write()
            .await
            .silence_maps
            .insert(media_id.clone(), map);
        Ok(())
    }

    async fn get_silence_map(&self, media_id: &MediaId) -> RegistryResult<Option<SilenceMap>> {
        Ok(self.inner.read().await.silence_maps.get(media_id).cloned())
    }

    async fn put_scene_cuts(&self, media_id: &MediaId, cuts: SceneCuts) -> RegistryResult<()> {
        self.inner
            .write()
            .await
            .scene_cuts
            .insert(media_id.clone(), cuts);
        Ok(())
    }

    async fn get_scene_cuts(&self, media_id: &MediaId) -> RegistryResult<Option<SceneCuts>> {
        Ok(self.inner.read().await.scene_cuts.get(media_id).cloned())
    }

    async fn put_frames(&self, media_id: &MediaId, frames: Vec<Frame>) -> RegistryResult<()> {
        self.inner
            .write()
            .await
            .frames
            .insert(media_id.clone(), frames);
        Ok(())
    }

    async fn get_frames(&self, media_id: &MediaId) -> RegistryResult<Option<Vec<Frame>>> {
        Ok(self.inner.read().await.frames.get(media_id).cloned())
    }

    async fn put_scenes(&self, media_id: &MediaId, scenes: Vec<Scene>) -> RegistryResult<()> {
        self.inner
            .write()
            .await
            .scenes
            .insert(media_id.clone(), scenes);
        Ok(())
    }

    async fn get_scenes(&self, media_id: &MediaId) -> RegistryResult<Option<Vec<Scene>>> {
        Ok(self.inner.read().await.scenes.get(media_id).cloned())
    }

    async fn put_clip_candidates(
        &self,
        media_id: &MediaId,
        candidates: Vec<ClipCandidate>,
    ) -> RegistryResult<()> {
        self.inner
            .write()
            .await
            .clip_candidates
            .insert(media_id.clone(), candidates);
        Ok(())
    }

    async fn get_clip_candidates(
        &self,
        media_id: &MediaId,
    ) -> RegistryResult<Option<Vec<ClipCandidate>>> {
        Ok(self
            .inner
            .read()
            .await
            .clip_candidates
            .get(media_id)
            .cloned())
    }

    async fn create_plan(&self, plan: Plan) -> RegistryResult<()> {
        let mut inner = self.inner.write().await;
        if inner.plans.contains_key(&plan.plan_id) {
            return Err(RegistryError::AlreadyExists(format!(
                "plan {}",
                plan.plan_id
            )));
        }
        inner.plans.insert(plan.plan_id.clone(), plan);
        Ok(())
    }

    async fn get_plan(&self, plan_id: &PlanId) -> RegistryResult<Option<Plan>> {
        Ok(self.inner.read().await.plans.get(plan_id).cloned())
    }

    async fn update_plan_if_status(
        &self,
        plan_id: &PlanId,
        expected: PlanStatus,
        new: PlanStatus,
    ) -> RegistryResult<Plan> {
        let mut inner = self.inner.write().await;
        let plan = inner
            .plans
            .get_mut(plan_id)
            .ok_or_else(|| RegistryError::not_found(format!("plan {}", plan_id)))?;

        if plan.status != expected {
            return Err(RegistryError::conflict(
                format!("plan {}", plan_id),
                expected.as_str(),
                plan.status.as_str(),
            ));
        }
        if !expected.can_transition_to(new) {
            return Err(RegistryError::IllegalTransition {
                entity: format!("plan {}", plan_id),
                from: expected.as_str().to_string(),
                to: new.as_str().to_string(),
            });
        }

        plan.status = new;
        plan.updated_at = Utc::now();
        Ok(plan.clone())
    }

    async fn list_plans_by_media(&self, media_id: &MediaId) -> RegistryResult<Vec<Plan>> {
        let inner = self.inner.read().await;
        let mut plans: Vec<Plan> = inner
            .plans
            .values()
            .filter(|p| &p.media_id == media_id)
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.created_at);
        Ok(plans)
    }

    async fn create_render(&self, render: Render) -> RegistryResult<()> {
        let mut inner = self.inner.write().await;
        if inner.renders.contains_key(&render.render_id) {
            return Err(RegistryError::AlreadyExists(format!(
                "render {}",
                render.render_id
            )));
        }
        inner.renders.insert(render.render_id.clone(), render);
        Ok(())
    }

    async fn get_render(&self, render_id: &RenderId) -> RegistryResult<Option<Render>> {
        Ok(self.inner.read().await.renders.get(render_id).cloned())
    }

    async fn update_render_if_status(
        &self,
        render_id: &RenderId,
        expected: RenderStatus,
        new: RenderStatus,
        patch: RenderPatch,
    ) -> RegistryResult<Render> {
        let mut inner = self.inner.write().await;
        let render = inner
            .renders
            .get_mut(render_id)
            .ok_or_else(|| RegistryError::not_found(format!("render {}", render_id)))?;

        if render.status != expected {
            return Err(RegistryError::conflict(
                format!("render {}", render_id),
                expected.as_str(),
                render.status.as_str(),
            ));
        }
        if !expected.can_transition_to(new) {
            return Err(RegistryError::IllegalTransition {
                entity: format!("render {}", render_id),
                from: expected.as_str().to_string(),
                to: new.as_str().to_string(),
            });
        }

        render.status = new;
        match new {
            RenderStatus::Running => render.started_at = Some(Utc::now()),
            s if s.is_terminal() => render.finished_at = Some(Utc::now()),
            _ => {}
        }
        if let Some(uri) = patch.output_uri {
            render.output_uri = Some(uri);
        }
        if let Some(duration) = patch.duration_seconds {
            render.duration_seconds = Some(duration);
        }
        if let Some(error) = patch.error {
            render.error = Some(error);
        }
        Ok(render.clone())
    }

    async fn list_renders_by_plan(&self, plan_id: &PlanId) -> RegistryResult<Vec<Render>> {
        let inner = self.inner.read().await;
        let mut renders: Vec<Render> = inner
            .renders
            .values()
            .filter(|r| &r.plan_id == plan_id)
            .cloned()
            .collect();
        renders.sort_by_key(|r| r.created_at);
        Ok(renders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storycut_models::{JobInput, TechnicalMetadata, Transcript, TranscriptSegment};

    fn technical(duration: f64) -> TechnicalMetadata {
        TechnicalMetadata {
            duration,
            fps: 30.0,
            width: 1920,
            height: 1080,
            has_audio: true,
            video_codec: "h264".into(),
            audio_codec: "aac".into(),
            bitrate: 0,
        }
    }

    #[tokio::test]
    async fn conditional_update_rejects_stale_expectation() {
        let registry = MemoryRegistry::new();
        let media = Media::new("file:///a.mp4");
        let id = media.media_id.clone();
        registry.create_media(media).await.unwrap();

        registry
            .update_media_if_status(
                &id,
                MediaStatus::Registered,
                MediaStatus::Probing,
                MediaPatch::default(),
            )
            .await
            .unwrap();

        // A second writer still expecting Registered loses the race
        let err = registry
            .update_media_if_status(
                &id,
                MediaStatus::Registered,
                MediaStatus::Probing,
                MediaPatch::default(),
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn exactly_one_claimer_wins() {
        let registry = MemoryRegistry::new();
        let job = Job::new(MediaId::from("m1"), JobInput::Probe);
        let id = job.job_id.clone();
        registry.create_job(job).await.unwrap();

        let mut wins = 0;
        for _ in 0..4 {
            match registry
                .update_job_if_status(&id, JobStatus::Queued, JobStatus::Running, JobPatch::default())
                .await
            {
                Ok(_) => wins += 1,
                Err(e) => assert!(e.is_conflict()),
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn terminal_jobs_admit_no_transitions() {
        let registry = MemoryRegistry::new();
        let job = Job::new(MediaId::from("m1"), JobInput::Transcribe);
        let id = job.job_id.clone();
        registry.create_job(job).await.unwrap();

        registry
            .update_job_if_status(&id, JobStatus::Queued, JobStatus::Running, JobPatch::default())
            .await
            .unwrap();
        registry
            .update_job_if_status(
                &id,
                JobStatus::Running,
                JobStatus::Completed,
                JobPatch::default(),
            )
            .await
            .unwrap();

        // Completed -> anything is rejected, either as conflict or illegal edge
        let err = registry
            .update_job_if_status(
                &id,
                JobStatus::Completed,
                JobStatus::Running,
                JobPatch::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn queued_to_cancelled_is_the_only_non_running_terminal() {
        let registry = MemoryRegistry::new();
        let job = Job::new(MediaId::from("m1"), JobInput::DetectSilence);
        let id = job.job_id.clone();
        registry.create_job(job).await.unwrap();

        let err = registry
            .update_job_if_status(
                &id,
                JobStatus::Queued,
                JobStatus::Completed,
                JobPatch::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::IllegalTransition { .. }));

        let cancelled = registry
            .update_job_if_status(
                &id,
                JobStatus::Queued,
                JobStatus::Cancelled,
                JobPatch::default(),
            )
            .await
            .unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.finished_at.is_some());
    }

    #[tokio::test]
    async fn cancel_flag_sticks_on_running_jobs() {
        let registry = MemoryRegistry::new();
        let job = Job::new(MediaId::from("m1"), JobInput::ApplyPlan {
            plan_id: PlanId::from("p1"),
            aspect_ratios: vec![],
            captions: false,
            normalise_audio: false,
        });
        let id = job.job_id.clone();
        registry.create_job(job).await.unwrap();
        registry
            .update_job_if_status(&id, JobStatus::Queued, JobStatus::Running, JobPatch::default())
            .await
            .unwrap();

        let job = registry.request_job_cancel(&id).await.unwrap();
        assert!(job.cancel_requested);
    }

    #[tokio::test]
    async fn transcript_is_whole_value() {
        let registry = MemoryRegistry::new();
        let media_id = MediaId::from("m1");
        let transcript = Transcript {
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 1.0,
                text: "hello".into(),
                confidence: None,
                words: vec![],
            }],
            language: "en".into(),
        };
        registry
            .put_transcript(&media_id, transcript.clone())
            .await
            .unwrap();
        assert_eq!(
            registry.get_transcript(&media_id).await.unwrap().unwrap(),
            transcript
        );

        // Re-writing the same value is idempotent
        registry.put_transcript(&media_id, transcript.clone()).await.unwrap();
        assert_eq!(
            registry.get_transcript(&media_id).await.unwrap().unwrap(),
            transcript
        );
    }

    #[tokio::test]
    async fn media_probe_flow_and_soft_delete() {
        let registry = MemoryRegistry::new();
        let media = Media::new("https://example.com/v.mp4");
        let id = media.media_id.clone();
        registry.create_media(media).await.unwrap();

        registry
            .update_media_if_status(
                &id,
                MediaStatus::Registered,
                MediaStatus::Probing,
                MediaPatch::default(),
            )
            .await
            .unwrap();
        let ready = registry
            .update_media_if_status(
                &id,
                MediaStatus::Probing,
                MediaStatus::Ready,
                MediaPatch::technical(technical(30.0)),
            )
            .await
            .unwrap();
        assert!(ready.is_ready());

        let deleted = registry.soft_delete_media(&id).await.unwrap();
        assert_eq!(deleted.status, MediaStatus::Deleted);
        // The record is still materialised (references stay resolvable)
        assert!(registry.get_media(&id).await.unwrap().is_some());
    }
}
