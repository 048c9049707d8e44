//! Clients for the external transcription, vision and planning models.
//!
//! The pipeline only depends on the capability traits ([`Transcribe`],
//! [`DescribeFrames`], [`GeneratePlan`]); the HTTP client here talks to an
//! OpenAI-compatible endpoint, but any implementation (local model, other
//! vendor) slots in behind the same traits. Network errors are surfaced as
//! typed `MlError`s the orchestrator classifies for retry.

pub mod client;
pub mod config;
pub mod error;
pub mod traits;

pub use client::HttpModelClient;
pub use config::MlConfig;
pub use error::{MlError, MlResult};
pub use traits::{DescribeFrames, GeneratePlan, Transcribe};
