//! Stored pipeline results.

use super::ValiditySet;
use crate::core::EventFragment;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The captured content of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ArtifactContent {
    /// An event fragment captured at a cacheable-prefix boundary.
    Events(EventFragment),
    /// Bytes captured from a rendered or read response.
    Bytes(Vec<u8>),
}

/// A stored result paired with the validity tokens that certified it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArtifact {
    /// The captured content.
    pub content: ArtifactContent,
    /// Validity tokens at the time of capture.
    pub validity: ValiditySet,
    /// Unix timestamp when the artifact was captured.
    pub created_at: f64,
}

impl CachedArtifact {
    /// Creates an artifact holding an event fragment.
    #[must_use]
    pub fn events(fragment: EventFragment, validity: ValiditySet) -> Self {
        Self::new(ArtifactContent::Events(fragment), validity)
    }

    /// Creates an artifact holding a byte buffer.
    #[must_use]
    pub fn bytes(bytes: Vec<u8>, validity: ValiditySet) -> Self {
        Self::new(ArtifactContent::Bytes(bytes), validity)
    }

    fn new(content: ArtifactContent, validity: ValiditySet) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        Self {
            content,
            validity,
            created_at,
        }
    }

    /// Returns the event fragment, if this artifact holds one.
    #[must_use]
    pub const fn as_events(&self) -> Option<&EventFragment> {
        match &self.content {
            ArtifactContent::Events(fragment) => Some(fragment),
            ArtifactContent::Bytes(_) => None,
        }
    }

    /// Returns the byte buffer, if this artifact holds one.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.content {
            ArtifactContent::Bytes(bytes) => Some(bytes),
            ArtifactContent::Events(_) => None,
        }
    }

    /// Size of the captured content, in events or bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        match &self.content {
            ArtifactContent::Events(fragment) => fragment.len(),
            ArtifactContent::Bytes(bytes) => bytes.len(),
        }
    }
}
