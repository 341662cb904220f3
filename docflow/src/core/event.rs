//! Document event model flowing between pipeline stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single parse-like event in a structured document.
///
/// Stages communicate exclusively through ordered sequences of these events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum DocEvent {
    /// Start of the document.
    StartDocument,
    /// End of the document.
    EndDocument,
    /// Opening element with its attributes.
    StartElement {
        /// Element name.
        name: String,
        /// Element attributes, ordered by name.
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
    /// Closing element.
    EndElement {
        /// Element name.
        name: String,
    },
    /// Character data.
    Characters(String),
    /// A comment.
    Comment(String),
    /// A processing instruction.
    ProcessingInstruction {
        /// Instruction target.
        target: String,
        /// Instruction data.
        data: String,
    },
}

impl DocEvent {
    /// Creates a start element event without attributes.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self::StartElement {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Creates a start element event with attributes.
    #[must_use]
    pub fn start_with<I, K, V>(name: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::StartElement {
            name: name.into(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Creates an end element event.
    #[must_use]
    pub fn end(name: impl Into<String>) -> Self {
        Self::EndElement { name: name.into() }
    }

    /// Creates a character data event.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Characters(text.into())
    }

    /// Returns true for events that open a nesting level.
    #[must_use]
    pub const fn opens(&self) -> bool {
        matches!(self, Self::StartDocument | Self::StartElement { .. })
    }

    /// Returns true for events that close a nesting level.
    #[must_use]
    pub const fn closes(&self) -> bool {
        matches!(self, Self::EndDocument | Self::EndElement { .. })
    }
}

/// An ordered run of events captured at a cache boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventFragment {
    events: Vec<DocEvent>,
}

impl EventFragment {
    /// Creates an empty fragment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&mut self, event: DocEvent) {
        self.events.push(event);
    }

    /// Returns the captured events.
    #[must_use]
    pub fn events(&self) -> &[DocEvent] {
        &self.events
    }

    /// Returns the number of captured events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Encodes the fragment for stores that persist artifacts.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a fragment previously produced by [`EventFragment::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl From<Vec<DocEvent>> for EventFragment {
    fn from(events: Vec<DocEvent>) -> Self {
        Self { events }
    }
}

impl IntoIterator for EventFragment {
    type Item = DocEvent;
    type IntoIter = std::vec::IntoIter<DocEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}
