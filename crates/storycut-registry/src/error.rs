//! Registry error types.

use thiserror::Error;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// A conditional update observed a different current status.
    /// Not a failure: exactly one concurrent writer wins.
    #[error("conflict on {entity}: expected status '{expected}', found '{actual}'")]
    Conflict {
        entity: String,
        expected: String,
        actual: String,
    },

    /// The requested transition is not an edge of the state lattice.
    #[error("illegal transition on {entity}: '{from}' -> '{to}'")]
    IllegalTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

impl RegistryError {
    pub fn conflict(
        entity: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            entity: entity.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Whether this is the benign conditional-update race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RegistryError::Conflict { .. })
    }
}
