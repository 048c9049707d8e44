//! Planning error types.

use thiserror::Error;

pub type PlanResult<T> = Result<T, PlanError>;

#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan has no keep duration; nothing could be rendered from it.
    #[error("unrenderable plan: {0}")]
    Unrenderable(String),

    /// Coverage fell outside the tolerance band and the caller opted into
    /// strict enforcement.
    #[error(
        "coverage {actual:.1}s outside [{lo:.1}s, {hi:.1}s] with strict enforcement"
    )]
    CoverageOutOfBand { actual: f64, lo: f64, hi: f64 },

    /// There is not enough enrichment signal to plan from at all.
    #[error("insufficient signal: {0}")]
    InsufficientSignal(String),

    /// The source has no usable timeline.
    #[error("empty source")]
    EmptySource,
}
