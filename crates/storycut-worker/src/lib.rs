//! Job orchestrator: worker pool, retry supervisor and job handlers.
//!
//! The executor consumes delivery tickets, claims jobs through the
//! registry's conditional `Queued -> Running` transition, runs the
//! kind-specific handler under its deadline, and finalises the job record.
//! A retry supervisor enqueues successor jobs with exponential backoff;
//! the original record is never mutated after it reaches a terminal
//! status.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod logging;
pub mod preconditions;
pub mod retry;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::WorkerConfig;
pub use context::ProcessingContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
