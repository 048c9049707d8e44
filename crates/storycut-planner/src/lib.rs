//! Scene indexing, clip selection, prompt assembly and EDL validation.
//!
//! Everything in this crate is a pure function over registry-held data.
//! The validator is the only component that ingests raw model output;
//! downstream code sees sanitised `Plan` values with invariants enforced.

pub mod compress;
pub mod error;
pub mod indexer;
pub mod prompt;
pub mod selector;
pub mod validate;

pub use compress::{compress, CompressedEnrichment, CompressorConfig, ContextSummary};
pub use error::{PlanError, PlanResult};
pub use indexer::index_scenes;
pub use prompt::build_prompt;
pub use selector::{select_clips, SelectorConfig};
pub use validate::{plan_to_raw, validate_raw, ValidatorConfig};
