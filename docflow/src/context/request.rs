//! Request context handed to every stage during setup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The request-scoped view a pipeline and its stages see.
///
/// Carries the correlation ID, the caller's conditional-request state and
/// free-form attributes set by the request-dispatch layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// The unique ID for this request.
    pub request_id: Uuid,

    /// The time the caller's cached copy was last validated, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_modified_since: Option<DateTime<Utc>>,

    /// Arbitrary request attributes.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Creates a context with a generated request ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            if_modified_since: None,
            attributes: HashMap::new(),
        }
    }

    /// Sets the conditional-request timestamp.
    #[must_use]
    pub const fn with_if_modified_since(mut self, at: DateTime<Utc>) -> Self {
        self.if_modified_since = Some(at);
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Gets an attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    /// Returns true if the caller's copy is at least as new as `last_modified`.
    ///
    /// Compared at whole-second precision, the resolution of HTTP dates.
    #[must_use]
    pub fn is_fresh(&self, last_modified: DateTime<Utc>) -> bool {
        self.if_modified_since
            .is_some_and(|since| last_modified.timestamp() <= since.timestamp())
    }
}
