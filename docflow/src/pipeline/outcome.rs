//! Processing outcomes and cache strategy.

use crate::cache::CacheStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How caching participated in one `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CacheStatus {
    /// No cache lookup was attempted.
    Bypassed,
    /// A stored artifact covering `covered` stages was reused.
    Hit {
        /// Number of stages whose output came from the cache.
        covered: usize,
    },
    /// Nothing was stored for the key; the chain ran live.
    Miss {
        /// Whether the live result was stored.
        stored: bool,
    },
    /// A stale artifact was found and removed; the chain ran live.
    Invalidated {
        /// Whether the live result was stored.
        stored: bool,
    },
}

impl CacheStatus {
    /// Returns true if cached output was reused.
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }

    /// Returns true if this call stored a new artifact.
    #[must_use]
    pub const fn stored(&self) -> bool {
        matches!(
            self,
            Self::Miss { stored: true } | Self::Invalidated { stored: true }
        )
    }
}

/// Details of a completed stream pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Cache participation.
    pub cache: CacheStatus,
    /// Bytes written to the caller's sink.
    pub bytes_written: u64,
    /// Effective mime type of the response.
    pub mime_type: Option<String>,
}

/// Result of processing a stream pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Output was produced.
    Completed(Completion),
    /// The caller's copy is current; nothing was written.
    NotModified,
}

impl ProcessOutcome {
    /// Returns the completion details, if output was produced.
    #[must_use]
    pub const fn completion(&self) -> Option<&Completion> {
        match self {
            Self::Completed(completion) => Some(completion),
            Self::NotModified => None,
        }
    }
}

/// Caching behavior a pipeline is constructed with.
#[derive(Clone, Default)]
pub enum CacheStrategy {
    /// Always execute the full chain.
    #[default]
    Uncached,
    /// Look up and populate the given store.
    Cached(Arc<dyn CacheStore>),
}

impl CacheStrategy {
    /// Returns the store, if caching is enabled.
    #[must_use]
    pub const fn store(&self) -> Option<&Arc<dyn CacheStore>> {
        match self {
            Self::Uncached => None,
            Self::Cached(store) => Some(store),
        }
    }

    /// Returns true if caching is enabled.
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }
}

impl fmt::Debug for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uncached => write!(f, "Uncached"),
            Self::Cached(_) => write!(f, "Cached(..)"),
        }
    }
}

/// Picks the response mime type: stage-reported, then override, then declared.
#[must_use]
pub fn effective_mime_type(
    reported: Option<String>,
    override_type: Option<&str>,
    declared: Option<&str>,
) -> Option<String> {
    reported
        .or_else(|| override_type.map(str::to_string))
        .or_else(|| declared.map(str::to_string))
}
