//! Pipeline configuration.

use serde::{Deserialize, Serialize};

/// Tunables shared by event and stream pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of events captured for one event-cache entry.
    ///
    /// Captures that grow past the limit are dropped and not stored.
    #[serde(default = "default_max_capture_events")]
    pub max_capture_events: Option<usize>,
    /// Maximum number of bytes captured for one byte-cache entry.
    #[serde(default = "default_max_capture_bytes")]
    pub max_capture_bytes: Option<usize>,
}

const fn default_max_capture_events() -> Option<usize> {
    Some(1_000_000)
}

const fn default_max_capture_bytes() -> Option<usize> {
    Some(16 * 1024 * 1024) // 16MB
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_capture_events: default_max_capture_events(),
            max_capture_bytes: default_max_capture_bytes(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event capture limit.
    #[must_use]
    pub const fn with_max_capture_events(mut self, limit: Option<usize>) -> Self {
        self.max_capture_events = limit;
        self
    }

    /// Sets the byte capture limit.
    #[must_use]
    pub const fn with_max_capture_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_capture_bytes = limit;
        self
    }

    /// Removes both capture limits.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_capture_events: None,
            max_capture_bytes: None,
        }
    }
}
