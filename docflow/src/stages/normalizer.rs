//! Pass-through seam placed between adjacent stages of a connected chain.

use crate::core::DocEvent;
use crate::errors::StageResult;
use crate::events::EventConsumer;
use async_trait::async_trait;

/// Forwards events unchanged to the next consumer.
///
/// Every connection between two stages goes through a normalizer. It keeps
/// per-link counters for diagnostics and never alters, drops or reorders
/// events.
pub struct Normalizer<C: EventConsumer + ?Sized> {
    next: Box<C>,
    forwarded: usize,
    depth: usize,
}

impl<C: EventConsumer + ?Sized> Normalizer<C> {
    /// Wraps the next consumer.
    pub fn new(next: Box<C>) -> Self {
        Self {
            next,
            forwarded: 0,
            depth: 0,
        }
    }

    /// Number of events forwarded so far.
    pub const fn forwarded(&self) -> usize {
        self.forwarded
    }

    /// Current element nesting depth seen on this link.
    pub const fn depth(&self) -> usize {
        self.depth
    }
}

#[async_trait]
impl<C: EventConsumer + ?Sized> EventConsumer for Normalizer<C> {
    async fn consume(&mut self, event: DocEvent) -> StageResult<()> {
        if event.opens() {
            self.depth += 1;
        } else if event.closes() {
            self.depth = self.depth.saturating_sub(1);
        }
        if matches!(event, DocEvent::EndDocument) {
            tracing::trace!(forwarded = self.forwarded + 1, "Normalizer reached end of document");
        }
        self.forwarded += 1;
        self.next.consume(event).await
    }
}
