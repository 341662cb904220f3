//! Cache store contract and the in-memory backend.

use super::{AggregateKey, CachedArtifact};
use crate::errors::CacheStoreError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Storage backend for cached pipeline artifacts.
///
/// Stores are shared by all concurrently executing requests and must make
/// each operation atomic. Concurrent `put`s for the same key are allowed;
/// the last write wins. Eviction policy is the backend's concern.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Gets the artifact stored under a key.
    async fn get(&self, key: &AggregateKey) -> Result<Option<CachedArtifact>, CacheStoreError>;

    /// Stores an artifact under a key.
    async fn put(&self, key: AggregateKey, artifact: CachedArtifact) -> Result<(), CacheStoreError>;

    /// Removes the artifact stored under a key.
    async fn remove(&self, key: &AggregateKey) -> Result<(), CacheStoreError>;
}

/// In-memory cache store.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<AggregateKey, CachedArtifact>,
}

impl InMemoryCacheStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if an entry exists for the key.
    #[must_use]
    pub fn contains(&self, key: &AggregateKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns all stored keys.
    #[must_use]
    pub fn keys(&self) -> Vec<AggregateKey> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Clears all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &AggregateKey) -> Result<Option<CachedArtifact>, CacheStoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: AggregateKey, artifact: CachedArtifact) -> Result<(), CacheStoreError> {
        self.entries.insert(key, artifact);
        Ok(())
    }

    async fn remove(&self, key: &AggregateKey) -> Result<(), CacheStoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{StageKey, ValiditySet, ValidityToken};
    use crate::core::StageRole;

    fn key(k: u64) -> AggregateKey {
        std::iter::once(StageKey::new(StageRole::Reader, "file", k)).collect()
    }

    #[tokio::test]
    async fn test_in_memory_store_basic() {
        let store = InMemoryCacheStore::new();
        assert!(store.is_empty());

        let mut validity = ValiditySet::new();
        validity.insert(key(1).stages()[0].clone(), ValidityToken::tag("v1"));
        store
            .put(key(1), CachedArtifact::bytes(b"abc".to_vec(), validity.clone()))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.contains(&key(1)));

        let artifact = store.get(&key(1)).await.unwrap().unwrap();
        assert_eq!(artifact.as_bytes(), Some(&b"abc"[..]));
        assert_eq!(artifact.validity, validity);

        assert!(store.get(&key(2)).await.unwrap().is_none());

        store.remove(&key(1)).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = InMemoryCacheStore::new();
        store
            .put(key(1), CachedArtifact::bytes(b"first".to_vec(), ValiditySet::new()))
            .await
            .unwrap();
        store
            .put(key(1), CachedArtifact::bytes(b"second".to_vec(), ValiditySet::new()))
            .await
            .unwrap();

        let artifact = store.get(&key(1)).await.unwrap().unwrap();
        assert_eq!(artifact.as_bytes(), Some(&b"second"[..]));
        assert_eq!(store.keys(), vec![key(1)]);
    }

    #[tokio::test]
    async fn test_remove_missing_is_ok() {
        let store = InMemoryCacheStore::new();
        store.remove(&key(7)).await.unwrap();
        store.clear();
        assert!(store.is_empty());
    }
}
