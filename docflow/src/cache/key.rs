//! Stage keys and aggregate cache keys.

use crate::core::StageRole;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifies one stage instance within a chain for the current request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageKey {
    /// Role of the stage in the chain.
    pub role: StageRole,
    /// Registry identifier of the stage type.
    pub type_id: String,
    /// Key the stage generated for this request.
    pub key: u64,
}

impl StageKey {
    /// Creates a new stage key.
    #[must_use]
    pub fn new(role: StageRole, type_id: impl Into<String>, key: u64) -> Self {
        Self {
            role,
            type_id: type_id.into(),
            key,
        }
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.role, self.type_id, self.key)
    }
}

/// Ordered sequence of stage keys covering a cacheable span of a chain.
///
/// Element order follows the chain, starting at the source, so equal keys
/// always describe the same prefix of the same stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateKey(Vec<StageKey>);

impl AggregateKey {
    /// Creates an empty aggregate key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage key.
    pub fn push(&mut self, key: StageKey) {
        self.0.push(key);
    }

    /// Returns a copy extended by one more stage key.
    #[must_use]
    pub fn extended(&self, key: StageKey) -> Self {
        let mut next = self.clone();
        next.push(key);
        next
    }

    /// Returns the stage keys in chain order.
    #[must_use]
    pub fn stages(&self) -> &[StageKey] {
        &self.0
    }

    /// Returns the number of stages covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no stage is covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex fingerprint usable as a storage key by persistent backends.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for stage in &self.0 {
            hasher.update(stage.to_string().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(&hasher.finalize()[..16])
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("|"))
    }
}

impl FromIterator<StageKey> for AggregateKey {
    fn from_iter<I: IntoIterator<Item = StageKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Derives a stable, non-zero numeric stage key from string parts.
///
/// Stages use this to turn their request-scoped inputs (a locator, a
/// stylesheet path, parameters) into the key they report as cacheable.
#[must_use]
pub fn hash_key(parts: &[&str]) -> u64 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes).max(1)
}
