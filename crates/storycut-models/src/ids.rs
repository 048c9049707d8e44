//! Opaque string identifiers.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier for a source media.
    MediaId
);
string_id!(
    /// Unique identifier for one unit of asynchronous work.
    JobId
);
string_id!(
    /// Unique identifier for a validated plan.
    PlanId
);
string_id!(
    /// Unique identifier for one rendered output.
    RenderId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(MediaId::new(), MediaId::new());
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn id_roundtrips_through_serde() {
        let id = PlanId::from_string("plan-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"plan-1\"");
        let back: PlanId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
