//! Capture-while-streaming for event chains.

use super::EventConsumer;
use crate::core::{DocEvent, EventFragment};
use crate::errors::StageResult;
use async_trait::async_trait;

/// Forwards every event downstream while recording it into a fragment.
///
/// Recording stops for good once more than `limit` events have passed; the
/// partial capture is discarded and [`EventTee::into_capture`] yields `None`.
/// Forwarding is never affected.
pub struct EventTee<'a, C: EventConsumer + ?Sized> {
    next: Box<C>,
    capture: &'a mut Option<EventFragment>,
    limit: Option<usize>,
}

impl<'a, C: EventConsumer + ?Sized> EventTee<'a, C> {
    /// Creates a tee writing into `capture`, which is reset to an empty fragment.
    pub fn new(next: Box<C>, capture: &'a mut Option<EventFragment>, limit: Option<usize>) -> Self {
        *capture = Some(EventFragment::new());
        Self {
            next,
            capture,
            limit,
        }
    }
}

#[async_trait]
impl<C: EventConsumer + ?Sized> EventConsumer for EventTee<'_, C> {
    async fn consume(&mut self, event: DocEvent) -> StageResult<()> {
        let over_limit = match (self.capture.as_ref(), self.limit) {
            (Some(fragment), Some(limit)) => fragment.len() >= limit,
            _ => false,
        };
        if over_limit {
            tracing::debug!(limit = ?self.limit, "Event capture limit exceeded; dropping capture");
            *self.capture = None;
        } else if let Some(fragment) = self.capture.as_mut() {
            fragment.push(event.clone());
        }
        self.next.consume(event).await
    }
}

/// Pushes every event of a captured fragment into `consumer`, in order.
pub async fn replay(
    fragment: &EventFragment,
    consumer: &mut (dyn EventConsumer + '_),
) -> StageResult<usize> {
    for event in fragment.events() {
        consumer.consume(event.clone()).await?;
    }
    Ok(fragment.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    fn document() -> Vec<DocEvent> {
        vec![
            DocEvent::StartDocument,
            DocEvent::start("p"),
            DocEvent::text("hi"),
            DocEvent::end("p"),
            DocEvent::EndDocument,
        ]
    }

    #[tokio::test]
    async fn test_tee_forwards_and_captures() {
        let mut sink = CollectingEventSink::new();
        let mut capture = None;
        {
            let mut tee = EventTee::new(Box::new(&mut sink), &mut capture, None);
            for event in document() {
                tee.consume(event).await.unwrap();
            }
        }

        assert_eq!(sink.events(), document().as_slice());
        assert_eq!(capture.unwrap().events(), document().as_slice());
    }

    #[tokio::test]
    async fn test_tee_drops_capture_over_limit() {
        let mut sink = CollectingEventSink::new();
        let mut capture = None;
        {
            let mut tee = EventTee::new(Box::new(&mut sink), &mut capture, Some(3));
            for event in document() {
                tee.consume(event).await.unwrap();
            }
        }

        assert_eq!(sink.len(), 5);
        assert!(capture.is_none());
    }

    #[tokio::test]
    async fn test_replay_preserves_order() {
        let fragment = EventFragment::from(document());
        let mut sink = CollectingEventSink::new();

        let count = replay(&fragment, &mut sink).await.unwrap();

        assert_eq!(count, 5);
        assert_eq!(sink.into_fragment(), fragment);
    }
}
