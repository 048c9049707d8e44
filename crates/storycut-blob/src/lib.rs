//! Blob store for originals, derived artefacts and rendered outputs.
//!
//! Keys follow a fixed layout:
//!
//! ```text
//! originals/<media_id>/<filename>
//! derived/<media_id>/audio.wav
//! derived/<media_id>/frames/<t>.jpg
//! renders/<plan_id>/<aspect>.mp4
//! tmp/<job_id>/segments/<index>.mkv      (deleted on job terminal)
//! ```
//!
//! Objects are immutable once written; intermediates live under a per-job
//! `tmp/` prefix that the worker deletes when the job reaches a terminal
//! status, successful or not.

pub mod error;
pub mod keys;
pub mod local;
pub mod s3;
pub mod store;

pub use error::{BlobError, BlobResult};
pub use local::LocalBlobStore;
pub use s3::{S3BlobStore, S3Config};
pub use store::{store_from_env, BlobStore};
