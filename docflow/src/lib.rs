//! # Docflow
//!
//! Staged document-production pipelines with multi-tier result caching.
//!
//! Docflow assembles request-scoped chains of stages into a single
//! execution unit with support for:
//!
//! - **Event pipelines**: a source and transforms pushing document events
//! - **Stream pipelines**: a reader, or an event pipeline plus a render stage, producing bytes
//! - **Prefix caching**: event fragments of the longest cacheable prefix are replayed into a live suffix
//! - **Response caching**: whole byte responses cached when every stage is cacheable
//! - **Self-healing invalidation**: stale entries are removed the moment they fail validation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docflow::prelude::*;
//!
//! let mut registry = StageRegistry::new();
//! registry
//!     .register_source("file", || Box::new(FileSource::default()))
//!     .register_render("html", Some("text/html"), || Box::new(HtmlRender::default()));
//! let registry = Arc::new(registry);
//!
//! let mut events = EventPipeline::caching(registry.clone(), event_store);
//! events.set_source(StageRef::new("file").with_source("docs/index.xml"))?;
//!
//! let mut pipeline = StreamPipeline::caching(registry, byte_store);
//! pipeline.set_event_pipeline(events)?;
//! pipeline.set_render("html", None)?;
//!
//! let outcome = pipeline.process(&RequestContext::new(), &mut response).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cache;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{
        hash_key, AggregateKey, CacheStore, CachedArtifact, InMemoryCacheStore, StageKey,
        ValiditySet, ValidityToken,
    };
    pub use crate::context::RequestContext;
    pub use crate::core::{DocEvent, EventFragment, Parameters, StageRole};
    pub use crate::errors::{
        CacheStoreError, ConfigurationError, PipelineError, StageError, StageResult,
    };
    pub use crate::events::{CollectingEventSink, EventConsumer, NoOpEventSink};
    pub use crate::pipeline::{
        CacheStatus, Completion, EventPipeline, PipelineConfig, PipelinePool, ProcessOutcome,
        StageRef, StreamPipeline,
    };
    pub use crate::stages::{
        Cacheable, ReaderStage, RenderStage, SourceStage, Stage, StageRegistry, TransformStage,
    };
}
