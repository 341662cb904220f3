//! Terminal event sinks.

use super::EventConsumer;
use crate::core::{DocEvent, EventFragment};
use crate::errors::StageResult;
use async_trait::async_trait;

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventConsumer for NoOpEventSink {
    async fn consume(&mut self, _event: DocEvent) -> StageResult<()> {
        Ok(())
    }
}

/// A sink that records every event it receives.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Vec<DocEvent>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> &[DocEvent] {
        &self.events
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Consumes the sink, returning what it collected.
    #[must_use]
    pub fn into_fragment(self) -> EventFragment {
        EventFragment::from(self.events)
    }
}

#[async_trait]
impl EventConsumer for CollectingEventSink {
    async fn consume(&mut self, event: DocEvent) -> StageResult<()> {
        self.events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_sink() {
        let mut sink = NoOpEventSink;
        sink.consume(DocEvent::StartDocument).await.unwrap();
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let mut sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.consume(DocEvent::StartDocument).await.unwrap();
        sink.consume(DocEvent::text("x")).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events()[1], DocEvent::text("x"));

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_collecting_sink_through_reference() {
        let mut sink = CollectingEventSink::new();
        {
            let mut borrowed: Box<dyn EventConsumer + '_> = Box::new(&mut sink);
            borrowed.consume(DocEvent::EndDocument).await.unwrap();
        }
        assert_eq!(sink.into_fragment().events(), &[DocEvent::EndDocument]);
    }
}
