//! Media registry: the single durable source of truth.
//!
//! Every entity (media, jobs, enrichment artefacts, plans, renders) lives
//! behind the [`Registry`] trait. Status fields are only ever mutated via
//! conditional updates; a conditional write that observes a different
//! current status returns [`RegistryError::Conflict`], which callers treat
//! as a benign race.

pub mod error;
pub mod memory;
pub mod patch;
pub mod repo;

pub use error::{RegistryError, RegistryResult};
pub use memory::MemoryRegistry;
pub use patch::{JobPatch, MediaPatch, RenderPatch};
pub use repo::Registry;
