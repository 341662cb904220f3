//! Stage role enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a stage plays within a pipeline chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    /// Produces the initial event stream.
    Source,
    /// Consumes events and emits transformed events.
    Transform,
    /// Consumes events and writes bytes.
    Render,
    /// Writes bytes directly, without an event stream.
    Reader,
}

impl StageRole {
    /// Returns the string representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Transform => "transform",
            Self::Render => "render",
            Self::Reader => "reader",
        }
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(StageRole::Source.to_string(), "source");
        assert_eq!(StageRole::Reader.as_str(), "reader");
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&StageRole::Transform).unwrap();
        assert_eq!(json, "\"transform\"");
    }
}
