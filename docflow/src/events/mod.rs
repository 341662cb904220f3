//! Document event consumers.
//!
//! This module provides:
//! - The [`EventConsumer`] trait every link in a connected chain implements
//! - Terminal sinks for collecting or discarding events
//! - The capture tee that records a fragment while forwarding it
//! - Replay of captured fragments into a consumer

mod sink;
mod tee;

pub use sink::{CollectingEventSink, NoOpEventSink};
pub use tee::{replay, EventTee};

use crate::core::DocEvent;
use crate::errors::StageResult;
use async_trait::async_trait;

/// Receives document events pushed by an upstream producer.
#[async_trait]
pub trait EventConsumer: Send {
    /// Consumes one event.
    async fn consume(&mut self, event: DocEvent) -> StageResult<()>;
}

#[async_trait]
impl<C: EventConsumer + ?Sized> EventConsumer for &mut C {
    async fn consume(&mut self, event: DocEvent) -> StageResult<()> {
        (**self).consume(event).await
    }
}

#[async_trait]
impl<C: EventConsumer + ?Sized> EventConsumer for Box<C> {
    async fn consume(&mut self, event: DocEvent) -> StageResult<()> {
        (**self).consume(event).await
    }
}
