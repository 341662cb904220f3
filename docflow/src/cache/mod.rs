//! Cache keys, validity and artifact storage.
//!
//! This module provides:
//! - Stage keys and ordered aggregate keys
//! - Validity tokens and per-stage validity sets
//! - Cached artifacts (event fragments or byte buffers)
//! - The cache store contract and an in-memory backend

mod artifact;
mod key;
mod store;
mod validity;

pub use artifact::{ArtifactContent, CachedArtifact};
pub use key::{hash_key, AggregateKey, StageKey};
#[cfg(test)]
pub use store::MockCacheStore;
pub use store::{CacheStore, InMemoryCacheStore};
pub use validity::{ValiditySet, ValidityToken};
