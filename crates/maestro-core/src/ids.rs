//! Branded ID newtypes.
//!
//! Every entity carries a prefixed string id (`plan-{uuid}`, `todo-{uuid}`,
//! `task-{uuid}`). Newtypes keep the id spaces from being mixed up at
//! compile time while staying plain strings on the wire.

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

macro_rules! branded_id {
    ($(#[doc = $doc:literal])* $name:ident => $prefix:literal) => {
        $(#[doc = $doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh id (uuid v7, time-ordered).
            #[must_use]
            pub fn generate() -> Self {
                Self(format!("{}-{}", $prefix, uuid::Uuid::now_v7()))
            }

            /// Parse an existing id, validating the prefix.
            pub fn parse(s: &str) -> Result<Self, CoreError> {
                if s.starts_with(concat!($prefix, "-")) && s.len() > $prefix.len() + 1 {
                    Ok(Self(s.to_owned()))
                } else {
                    Err(CoreError::InvalidId {
                        expected_prefix: $prefix,
                        value: s.to_owned(),
                    })
                }
            }

            /// The id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifies one execution plan.
    PlanId => "plan"
}

branded_id! {
    /// Identifies one todo within a plan.
    TodoId => "todo"
}

branded_id! {
    /// Identifies one background task (the runtime handle for a todo).
    TaskId => "task"
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn generate_has_prefix() {
        assert!(PlanId::generate().as_str().starts_with("plan-"));
        assert!(TodoId::generate().as_str().starts_with("todo-"));
        assert!(TaskId::generate().as_str().starts_with("task-"));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = TodoId::generate();
        let b = TodoId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn parse_valid() {
        let id = PlanId::parse("plan-0190abc").unwrap();
        assert_eq!(id.as_str(), "plan-0190abc");
    }

    #[test]
    fn parse_wrong_prefix_rejected() {
        let err = PlanId::parse("todo-0190abc").unwrap_err();
        assert_matches!(err, CoreError::InvalidId { expected_prefix: "plan", .. });
    }

    #[test]
    fn parse_bare_prefix_rejected() {
        assert!(TodoId::parse("todo-").is_err());
        assert!(TodoId::parse("todo").is_err());
    }

    #[test]
    fn serde_transparent() {
        let id = TodoId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_str()));
        let back: TodoId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_matches_as_str() {
        let id = TaskId::generate();
        assert_eq!(id.to_string(), id.as_str());
    }
}
