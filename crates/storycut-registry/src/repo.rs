//! The registry trait.

use async_trait::async_trait;

use storycut_models::{
    ClipCandidate, Frame, Job, JobId, JobKind, JobStatus, Media, MediaId, MediaStatus, Plan,
    PlanId, PlanStatus, Render, RenderId, RenderStatus, Scene, SceneCuts, SilenceMap, Transcript,
};

use crate::error::RegistryResult;
use crate::patch::{JobPatch, MediaPatch, RenderPatch};

/// Persistence boundary for every entity the pipeline tracks.
///
/// Rules all backends uphold:
/// - Writes are durable before the call returns.
/// - Status fields change only through the `*_if_status` methods, which
///   compare-and-swap on the expected status and reject illegal lattice
///   edges. Concurrent writers either commit or observe `Conflict`.
/// - Enrichment artefacts are written whole; no partial artefact is ever
///   visible to a reader.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    // ------------------------------------------------------------------
    // Media
    // ------------------------------------------------------------------

    async fn create_media(&self, media: Media) -> RegistryResult<()>;

    async fn get_media(&self, media_id: &MediaId) -> RegistryResult<Option<Media>>;

    /// Conditionally transition a media record and apply a patch.
    /// Returns the updated record.
    async fn update_media_if_status(
        &self,
        media_id: &MediaId,
        expected: MediaStatus,
        new: MediaStatus,
        patch: MediaPatch,
    ) -> RegistryResult<Media>;

    /// Logical delete. Derived entities stay on disk but become
    /// unreachable through the control plane.
    async fn soft_delete_media(&self, media_id: &MediaId) -> RegistryResult<Media>;

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    async fn create_job(&self, job: Job) -> RegistryResult<()>;

    async fn get_job(&self, job_id: &JobId) -> RegistryResult<Option<Job>>;

    async fn update_job_if_status(
        &self,
        job_id: &JobId,
        expected: JobStatus,
        new: JobStatus,
        patch: JobPatch,
    ) -> RegistryResult<Job>;

    /// Set the cooperative cancellation flag on a non-terminal job.
    async fn request_job_cancel(&self, job_id: &JobId) -> RegistryResult<Job>;

    async fn list_jobs_by_media(&self, media_id: &MediaId) -> RegistryResult<Vec<Job>>;

    async fn list_jobs_by_media_kind(
        &self,
        media_id: &MediaId,
        kind: JobKind,
    ) -> RegistryResult<Vec<Job>>;

    /// All jobs currently in `status`, any media. Used by the supervisor.
    async fn list_jobs_by_status(&self, status: JobStatus) -> RegistryResult<Vec<Job>>;

    // ------------------------------------------------------------------
    // Enrichment artefacts (one per media, written whole)
    // ------------------------------------------------------------------

    async fn put_transcript(
        &self,
        media_id: &MediaId,
        transcript: Transcript,
    ) -> RegistryResult<()>;
    async fn get_transcript(&self, media_id: &MediaId) -> RegistryResult<Option<Transcript>>;

    async fn put_silence_map(&self, media_id: &MediaId, map: SilenceMap) -> RegistryResult<()>;
    async fn get_silence_map(&self, media_id: &MediaId) -> RegistryResult<Option<SilenceMap>>;

    async fn put_scene_cuts(&self, media_id: &MediaId, cuts: SceneCuts) -> RegistryResult<()>;
    async fn get_scene_cuts(&self, media_id: &MediaId) -> RegistryResult<Option<SceneCuts>>;

    async fn put_frames(&self, media_id: &MediaId, frames: Vec<Frame>) -> RegistryResult<()>;
    async fn get_frames(&self, media_id: &MediaId) -> RegistryResult<Option<Vec<Frame>>>;

    async fn put_scenes(&self, media_id: &MediaId, scenes: Vec<Scene>) -> RegistryResult<()>;
    async fn get_scenes(&self, media_id: &MediaId) -> RegistryResult<Option<Vec<Scene>>>;

    async fn put_clip_candidates(
        &self,
        media_id: &MediaId,
        candidates: Vec<ClipCandidate>,
    ) -> RegistryResult<()>;
    async fn get_clip_candidates(
        &self,
        media_id: &MediaId,
    ) -> RegistryResult<Option<Vec<ClipCandidate>>>;

    // ------------------------------------------------------------------
    // Plans
    // ------------------------------------------------------------------

    async fn create_plan(&self, plan: Plan) -> RegistryResult<()>;

    async fn get_plan(&self, plan_id: &PlanId) -> RegistryResult<Option<Plan>>;

    async fn update_plan_if_status(
        &self,
        plan_id: &PlanId,
        expected: PlanStatus,
        new: PlanStatus,
    ) -> RegistryResult<Plan>;

    async fn list_plans_by_media(&self, media_id: &MediaId) -> RegistryResult<Vec<Plan>>;

    // ------------------------------------------------------------------
    // Renders
    // ------------------------------------------------------------------

    async fn create_render(&self, render: Render) -> RegistryResult<()>;

    async fn get_render(&self, render_id: &RenderId) -> RegistryResult<Option<Render>>;

    async fn update_render_if_status(
        &self,
        render_id: &RenderId,
        expected: RenderStatus,
        new: RenderStatus,
        patch: RenderPatch,
    ) -> RegistryResult<Render>;

    async fn list_renders_by_plan(&self, plan_id: &PlanId) -> RegistryResult<Vec<Render>>;
}
