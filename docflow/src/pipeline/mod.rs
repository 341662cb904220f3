//! Pipeline assembly and execution.
//!
//! This module provides:
//! - [`EventPipeline`]: a source and transforms producing document events
//! - [`StreamPipeline`]: a reader, or an event pipeline plus a render stage, producing bytes
//! - Event-level caching with partial-prefix reuse
//! - Byte-level caching of whole responses
//! - A pool of exclusive, recyclable pipeline instances

mod config;
mod connect;
mod event;
mod event_cache;
mod lookup;
mod outcome;
mod pool;
mod stream;
mod stream_cache;
mod writer;


pub use config::PipelineConfig;
pub use connect::StageRef;
pub use event::EventPipeline;
pub use outcome::{effective_mime_type, CacheStatus, CacheStrategy, Completion, ProcessOutcome};
pub use pool::{PipelinePool, Pooled, Recycle};
pub use stream::StreamPipeline;
pub use writer::CaptureWriter;
