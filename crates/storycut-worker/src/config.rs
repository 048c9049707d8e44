//! Worker configuration.
//!
//! One explicit struct enumerating every pipeline option; constructed once
//! at startup and passed through handlers as a read-only value.

use std::time::Duration;

use storycut_models::JobKind;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Parallel workers in the pool
    pub worker_pool_size: usize,
    /// Max attempts for transient job kinds
    pub max_attempts_default: u32,
    /// Extra attempts for story planning (model errors repeat; retry once)
    pub max_attempts_plan_story: u32,
    /// Retry backoff base in seconds (exponential)
    pub retry_backoff_base_s: u64,
    /// Retry jitter upper bound in seconds
    pub retry_jitter_s: u64,
    /// Delay before retrying a job whose preconditions are not yet met
    pub precondition_retry_delay: Duration,

    /// Probe soft deadline
    pub probe_timeout_s: u64,
    /// Deadline factor on source duration for transcribe / scene detection
    pub analysis_deadline_factor: f64,
    /// Deadline factor on total keep duration for renders
    pub render_deadline_factor: f64,
    /// Deadline floor so short sources still get a workable budget
    pub min_deadline_s: u64,

    /// Minimum silence length in seconds
    pub min_silence_s: f64,
    /// RMS threshold for the silence scanner
    pub silence_energy_threshold: f32,
    /// Frame sampling interval in seconds
    pub frame_sample_s: f64,
    /// Frames sent per description batch (cancellation is polled between batches)
    pub frame_batch_size: usize,
    /// Scene-change score threshold
    pub scene_threshold: f64,

    /// Clip candidate duration band
    pub clip_min_s: f64,
    pub clip_max_s: f64,
    /// Candidates returned by the selector
    pub clip_n: usize,

    /// Compression ceilings for the planner prompt
    pub compress_frame_cap: usize,
    pub compress_scene_cap: usize,
    pub compress_segment_cap: usize,
    /// Coverage tolerance as a percentage of the coverage target
    pub plan_coverage_tolerance_pct: f64,

    /// Shorter output frame edge in pixels
    pub render_reference_width: u32,
    /// Loudness normalisation target
    pub render_loudness_target_lufs: f64,
    /// Parallel segment extractions within one render job
    pub render_segment_parallelism: usize,
    /// Caption font name and size for burn-in
    pub caption_font: String,
    pub caption_font_size: u32,

    /// Scratch directory for in-flight jobs
    pub work_dir: String,
    /// How often to promote scheduled tickets and claim stale deliveries
    pub claim_interval: Duration,
    /// Minimum idle time before a delivery counts as abandoned
    pub claim_min_idle: Duration,
    /// Graceful shutdown budget
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            max_attempts_default: 3,
            max_attempts_plan_story: 1,
            retry_backoff_base_s: 60,
            retry_jitter_s: 30,
            precondition_retry_delay: Duration::from_secs(5),
            probe_timeout_s: 30,
            analysis_deadline_factor: 3.0,
            render_deadline_factor: 5.0,
            min_deadline_s: 60,
            min_silence_s: 0.6,
            silence_energy_threshold: 0.01,
            frame_sample_s: 1.0,
            frame_batch_size: 8,
            scene_threshold: 0.4,
            clip_min_s: 15.0,
            clip_max_s: 60.0,
            clip_n: 5,
            compress_frame_cap: 50,
            compress_scene_cap: 20,
            compress_segment_cap: 100,
            plan_coverage_tolerance_pct: 10.0,
            render_reference_width: 1080,
            render_loudness_target_lufs: -16.0,
            render_segment_parallelism: 4,
            caption_font: "Arial".to_string(),
            caption_font_size: 28,
            work_dir: "/tmp/storycut".to_string(),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            worker_pool_size: env_parse("WORKER_POOL_SIZE", d.worker_pool_size),
            max_attempts_default: env_parse("WORKER_MAX_ATTEMPTS", d.max_attempts_default),
            max_attempts_plan_story: env_parse(
                "WORKER_MAX_ATTEMPTS_PLAN_STORY",
                d.max_attempts_plan_story,
            ),
            retry_backoff_base_s: env_parse("WORKER_RETRY_BACKOFF_BASE_SECS", d.retry_backoff_base_s),
            retry_jitter_s: env_parse("WORKER_RETRY_JITTER_SECS", d.retry_jitter_s),
            precondition_retry_delay: Duration::from_secs(env_parse(
                "WORKER_PRECONDITION_RETRY_SECS",
                d.precondition_retry_delay.as_secs(),
            )),
            probe_timeout_s: env_parse("WORKER_PROBE_TIMEOUT_SECS", d.probe_timeout_s),
            analysis_deadline_factor: env_parse(
                "WORKER_ANALYSIS_DEADLINE_FACTOR",
                d.analysis_deadline_factor,
            ),
            render_deadline_factor: env_parse(
                "WORKER_RENDER_DEADLINE_FACTOR",
                d.render_deadline_factor,
            ),
            min_deadline_s: env_parse("WORKER_MIN_DEADLINE_SECS", d.min_deadline_s),
            min_silence_s: env_parse("WORKER_MIN_SILENCE_SECS", d.min_silence_s),
            silence_energy_threshold: env_parse(
                "WORKER_SILENCE_ENERGY_THRESHOLD",
                d.silence_energy_threshold,
            ),
            frame_sample_s: env_parse("WORKER_FRAME_SAMPLE_SECS", d.frame_sample_s),
            frame_batch_size: env_parse("WORKER_FRAME_BATCH_SIZE", d.frame_batch_size),
            scene_threshold: env_parse("WORKER_SCENE_THRESHOLD", d.scene_threshold),
            clip_min_s: env_parse("WORKER_CLIP_MIN_SECS", d.clip_min_s),
            clip_max_s: env_parse("WORKER_CLIP_MAX_SECS", d.clip_max_s),
            clip_n: env_parse("WORKER_CLIP_N", d.clip_n),
            compress_frame_cap: env_parse("WORKER_COMPRESS_FRAME_CAP", d.compress_frame_cap),
            compress_scene_cap: env_parse("WORKER_COMPRESS_SCENE_CAP", d.compress_scene_cap),
            compress_segment_cap: env_parse("WORKER_COMPRESS_SEGMENT_CAP", d.compress_segment_cap),
            plan_coverage_tolerance_pct: env_parse(
                "WORKER_PLAN_COVERAGE_TOLERANCE_PCT",
                d.plan_coverage_tolerance_pct,
            ),
            render_reference_width: env_parse(
                "WORKER_RENDER_REFERENCE_WIDTH",
                d.render_reference_width,
            ),
            render_loudness_target_lufs: env_parse(
                "WORKER_RENDER_LOUDNESS_TARGET_LUFS",
                d.render_loudness_target_lufs,
            ),
            render_segment_parallelism: env_parse(
                "WORKER_RENDER_SEGMENT_PARALLELISM",
                d.render_segment_parallelism,
            ),
            caption_font: std::env::var("WORKER_CAPTION_FONT").unwrap_or(d.caption_font),
            caption_font_size: env_parse("WORKER_CAPTION_FONT_SIZE", d.caption_font_size),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(d.work_dir),
            claim_interval: Duration::from_secs(env_parse(
                "WORKER_CLAIM_INTERVAL_SECS",
                d.claim_interval.as_secs(),
            )),
            claim_min_idle: Duration::from_secs(env_parse(
                "WORKER_CLAIM_MIN_IDLE_SECS",
                d.claim_min_idle.as_secs(),
            )),
            shutdown_timeout: Duration::from_secs(env_parse(
                "WORKER_SHUTDOWN_TIMEOUT_SECS",
                d.shutdown_timeout.as_secs(),
            )),
        }
    }

    /// Maximum attempts (including the first) for a job kind.
    pub fn max_attempts(&self, kind: JobKind) -> u32 {
        match kind {
            JobKind::PlanStory => 1 + self.max_attempts_plan_story,
            _ => self.max_attempts_default,
        }
    }

    /// Soft deadline for one job. `source_duration` is the media duration;
    /// `keep_duration` is the plan's total keep time for renders.
    pub fn deadline_for(
        &self,
        kind: JobKind,
        source_duration: f64,
        keep_duration: f64,
    ) -> Duration {
        let secs = match kind {
            JobKind::Probe => return Duration::from_secs(self.probe_timeout_s),
            JobKind::Transcribe | JobKind::DetectScenes | JobKind::DescribeFrames => {
                source_duration * self.analysis_deadline_factor
            }
            JobKind::ApplyPlan => keep_duration * self.render_deadline_factor,
            // Pure or cheap kinds get the floor
            _ => 0.0,
        };
        Duration::from_secs((secs as u64).max(self.min_deadline_s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_per_kind() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_attempts(JobKind::Transcribe), 3);
        assert_eq!(config.max_attempts(JobKind::ApplyPlan), 3);
        // One retry only for story planning
        assert_eq!(config.max_attempts(JobKind::PlanStory), 2);
    }

    #[test]
    fn deadlines_scale_with_input() {
        let config = WorkerConfig::default();
        assert_eq!(
            config.deadline_for(JobKind::Probe, 600.0, 0.0),
            Duration::from_secs(30)
        );
        assert_eq!(
            config.deadline_for(JobKind::Transcribe, 600.0, 0.0),
            Duration::from_secs(1800)
        );
        assert_eq!(
            config.deadline_for(JobKind::ApplyPlan, 600.0, 120.0),
            Duration::from_secs(600)
        );
        // Floor applies to short sources
        assert_eq!(
            config.deadline_for(JobKind::Transcribe, 1.0, 0.0),
            Duration::from_secs(60)
        );
    }
}
