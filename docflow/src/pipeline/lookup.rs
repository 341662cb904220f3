//! Validated cache lookup shared by the event and byte caches.

use crate::cache::{AggregateKey, CacheStore, CachedArtifact, ValiditySet};
use tracing::{debug, warn};

/// Result of looking up an aggregate key.
pub(super) enum Lookup<T> {
    /// A valid artifact of the expected kind.
    Hit(T),
    /// Nothing usable was stored, or the store failed.
    Miss,
    /// A stale or mismatched artifact was found and removed.
    Invalidated,
}

/// Looks up `key` and re-validates the stored tokens against `fresh`.
///
/// Store failures on `get` are absorbed as a miss. Stale entries, and
/// entries whose content `extract` rejects, are removed before returning
/// [`Lookup::Invalidated`].
pub(super) async fn lookup<T>(
    store: &dyn CacheStore,
    key: &AggregateKey,
    fresh: &ValiditySet,
    extract: impl FnOnce(CachedArtifact) -> Option<T>,
) -> Lookup<T> {
    let artifact = match store.get(key).await {
        Ok(Some(artifact)) => artifact,
        Ok(None) => return Lookup::Miss,
        Err(e) => {
            warn!(key = %key, error = %e, "Cache lookup failed; running live");
            return Lookup::Miss;
        }
    };

    if let Some(stale) = artifact.validity.first_invalid(fresh) {
        debug!(key = %key, stage = %stale, "Cached artifact is stale");
    } else if let Some(content) = extract(artifact) {
        return Lookup::Hit(content);
    } else {
        warn!(key = %key, "Cached artifact has unexpected content kind");
    }

    if let Err(e) = store.remove(key).await {
        warn!(key = %key, error = %e, "Failed to remove stale cache entry");
    }
    Lookup::Invalidated
}

/// Stores an artifact, absorbing store failures. Returns true if stored.
pub(super) async fn store_artifact(
    store: &dyn CacheStore,
    key: AggregateKey,
    artifact: CachedArtifact,
) -> bool {
    let size = artifact.size();
    match store.put(key.clone(), artifact).await {
        Ok(()) => {
            debug!(key = %key, size, "Stored cache artifact");
            true
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to store cache artifact");
            false
        }
    }
}
