//! Validity tokens and validity sets.

use super::StageKey;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// An opaque token proving that a stage's output is still current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ValidityToken {
    /// Always valid.
    Nop,
    /// Valid while the modification time is unchanged.
    Timestamp(i64),
    /// Valid while the tag is unchanged.
    Tag(String),
    /// Valid while the content digest is unchanged.
    Digest(String),
    /// Valid until the given instant, whatever the fresh token says.
    Expires(DateTime<Utc>),
    /// Valid while every component is valid.
    Aggregate(Vec<ValidityToken>),
}

impl ValidityToken {
    /// Creates a tag token.
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tag(tag.into())
    }

    /// Creates a digest token over some content.
    #[must_use]
    pub fn digest(content: &[u8]) -> Self {
        Self::Digest(STANDARD.encode(Md5::digest(content)))
    }

    /// Creates a timestamp token from a modification time.
    #[must_use]
    pub fn modified_at(at: DateTime<Utc>) -> Self {
        Self::Timestamp(at.timestamp_millis())
    }

    /// Checks this stored token against a freshly computed one.
    #[must_use]
    pub fn is_valid(&self, fresh: &Self) -> bool {
        match (self, fresh) {
            (Self::Nop, _) => true,
            (Self::Expires(until), _) => Utc::now() < *until,
            (Self::Aggregate(stored), Self::Aggregate(current)) => {
                stored.len() == current.len()
                    && stored.iter().zip(current).all(|(s, c)| s.is_valid(c))
            }
            (stored, current) => stored == current,
        }
    }
}

/// Validity tokens keyed by stage, in chain order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValiditySet {
    entries: Vec<(StageKey, ValidityToken)>,
}

impl ValiditySet {
    /// Creates an empty validity set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a stage's token.
    pub fn insert(&mut self, key: StageKey, token: ValidityToken) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = token;
        } else {
            self.entries.push((key, token));
        }
    }

    /// Returns a copy with one more stage token.
    #[must_use]
    pub fn extended(&self, key: StageKey, token: ValidityToken) -> Self {
        let mut next = self.clone();
        next.insert(key, token);
        next
    }

    /// Looks up a stage's token.
    #[must_use]
    pub fn get(&self, key: &StageKey) -> Option<&ValidityToken> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, t)| t)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no tokens are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in chain order.
    pub fn iter(&self) -> impl Iterator<Item = &(StageKey, ValidityToken)> {
        self.entries.iter()
    }

    /// Returns the first stage whose stored token is not confirmed by `fresh`.
    ///
    /// Entries are checked in chain order and the walk stops at the first
    /// mismatch. A stage missing from `fresh` counts as a mismatch.
    #[must_use]
    pub fn first_invalid(&self, fresh: &Self) -> Option<&StageKey> {
        self.entries
            .iter()
            .find(|(key, stored)| !fresh.get(key).is_some_and(|current| stored.is_valid(current)))
            .map(|(key, _)| key)
    }

    /// Returns true if every stored token is confirmed by `fresh`.
    #[must_use]
    pub fn validates(&self, fresh: &Self) -> bool {
        self.first_invalid(fresh).is_none()
    }
}
