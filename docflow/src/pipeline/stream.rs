//! Stream pipeline: bytes from a reader, or from an event pipeline and a render stage.

use super::connect::RenderConsumer;
use super::writer::CaptureWriter;
use super::{
    effective_mime_type, CacheStatus, CacheStrategy, Completion, EventPipeline, PipelineConfig,
    ProcessOutcome, Recycle, StageRef,
};
use crate::cache::{AggregateKey, CacheStore, ValiditySet};
use crate::context::RequestContext;
use crate::core::StageRole;
use crate::errors::{ConfigurationError, PipelineError, StageError};
use crate::observability::SpanTimer;
use crate::stages::{cache_entry, ReaderStage, RenderStage, StageRegistry};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// A byte-producing stage reference with an optional mime type override.
#[derive(Debug, Clone)]
struct ByteStage {
    stage: StageRef,
    mime_override: Option<String>,
}

/// Produces a byte stream for one request.
///
/// Assembled either with [`StreamPipeline::set_reader`], or with
/// [`StreamPipeline::set_event_pipeline`] plus [`StreamPipeline::set_render`].
/// A caching stream pipeline stores whole responses; it only does so when
/// every stage of the chain is cacheable for the request.
#[derive(Debug)]
pub struct StreamPipeline {
    registry: Arc<StageRegistry>,
    strategy: CacheStrategy,
    config: PipelineConfig,
    reader: Option<ByteStage>,
    event_pipeline: Option<EventPipeline>,
    render: Option<ByteStage>,
}

impl StreamPipeline {
    /// Creates a pipeline that always produces output live.
    #[must_use]
    pub fn new(registry: Arc<StageRegistry>) -> Self {
        Self::with_strategy(registry, CacheStrategy::Uncached)
    }

    /// Creates a pipeline that caches whole responses in `store`.
    #[must_use]
    pub fn caching(registry: Arc<StageRegistry>, store: Arc<dyn CacheStore>) -> Self {
        Self::with_strategy(registry, CacheStrategy::Cached(store))
    }

    /// Creates a pipeline with an explicit cache strategy.
    #[must_use]
    pub fn with_strategy(registry: Arc<StageRegistry>, strategy: CacheStrategy) -> Self {
        Self {
            registry,
            strategy,
            config: PipelineConfig::default(),
            reader: None,
            event_pipeline: None,
            render: None,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets an all-in-one reader stage.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a reader, event pipeline or render
    /// stage is already set.
    pub fn set_reader(
        &mut self,
        stage: impl Into<StageRef>,
        mime_override: Option<&str>,
    ) -> Result<(), ConfigurationError> {
        let stage = stage.into();
        if self.event_pipeline.is_some() {
            return Err(ConfigurationError::mixed_assembly("an event pipeline", "a reader"));
        }
        if self.render.is_some() {
            return Err(ConfigurationError::mixed_assembly("a render stage", "a reader"));
        }
        if let Some(existing) = &self.reader {
            return Err(ConfigurationError::duplicate(
                StageRole::Reader,
                &existing.stage.type_id,
                &stage.type_id,
            ));
        }
        self.reader = Some(ByteStage {
            stage,
            mime_override: mime_override.map(str::to_string),
        });
        Ok(())
    }

    /// Sets the event pipeline feeding the render stage.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a reader or another event pipeline
    /// is already set.
    pub fn set_event_pipeline(&mut self, pipeline: EventPipeline) -> Result<(), ConfigurationError> {
        if self.reader.is_some() {
            return Err(ConfigurationError::mixed_assembly("a reader", "an event pipeline"));
        }
        if self.event_pipeline.is_some() {
            return Err(ConfigurationError::duplicate_event_pipeline());
        }
        self.event_pipeline = Some(pipeline);
        Ok(())
    }

    /// Sets the render stage.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a reader or another render stage is
    /// already set.
    pub fn set_render(
        &mut self,
        stage: impl Into<StageRef>,
        mime_override: Option<&str>,
    ) -> Result<(), ConfigurationError> {
        let stage = stage.into();
        if self.reader.is_some() {
            return Err(ConfigurationError::mixed_assembly("a reader", "a render stage"));
        }
        if let Some(existing) = &self.render {
            return Err(ConfigurationError::duplicate(
                StageRole::Render,
                &existing.stage.type_id,
                &stage.type_id,
            ));
        }
        self.render = Some(ByteStage {
            stage,
            mime_override: mime_override.map(str::to_string),
        });
        Ok(())
    }

    /// Returns the event pipeline, if one is set.
    #[must_use]
    pub const fn event_pipeline(&self) -> Option<&EventPipeline> {
        self.event_pipeline.as_ref()
    }

    /// Produces the response into `out`.
    ///
    /// Returns [`ProcessOutcome::NotModified`] without writing anything when
    /// a reader reports a last-modified time the caller already has.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pipeline is incomplete, a setup
    /// error if a stage fails to configure, or an execution error if a stage
    /// or `out` fails while producing. Nothing is cached for a failed call.
    #[tracing::instrument(
        name = "stream_pipeline",
        skip_all,
        fields(request_id = %ctx.request_id, caching = self.strategy.is_cached())
    )]
    pub async fn process(
        &mut self,
        ctx: &RequestContext,
        out: &mut (dyn AsyncWrite + Unpin + Send + '_),
    ) -> Result<ProcessOutcome, PipelineError> {
        let timer = SpanTimer::start("stream_pipeline");
        let Self {
            registry,
            strategy,
            config,
            reader,
            event_pipeline,
            render,
        } = self;
        let shared = Shared {
            registry: &**registry,
            store: strategy.store().map(|store| &**store),
            config: &*config,
        };

        let outcome = match (reader.as_ref(), event_pipeline.as_mut(), render.as_ref()) {
            (Some(reader), _, _) => shared.process_reader(ctx, reader, out).await?,
            (None, Some(events), Some(render)) => {
                shared.process_composed(ctx, events, render, out).await?
            }
            (None, None, _) => {
                return Err(ConfigurationError::incomplete("reader or event pipeline").into())
            }
            (None, Some(_), None) => {
                return Err(ConfigurationError::incomplete("render stage").into())
            }
        };
        debug!(?outcome, elapsed_ms = timer.elapsed_ms(), "Stream pipeline completed");
        Ok(outcome)
    }

    /// Clears all request-scoped state so the instance can be reused.
    pub fn recycle(&mut self) {
        self.reader = None;
        self.event_pipeline = None;
        self.render = None;
    }
}

impl Recycle for StreamPipeline {
    fn recycle(&mut self) {
        Self::recycle(self);
    }
}

/// Pipeline state borrowed for one `process` call.
struct Shared<'p> {
    registry: &'p StageRegistry,
    store: Option<&'p dyn CacheStore>,
    config: &'p PipelineConfig,
}

impl Shared<'_> {
    async fn process_reader(
        &self,
        ctx: &RequestContext,
        spec: &ByteStage,
        out: &mut (dyn AsyncWrite + Unpin + Send + '_),
    ) -> Result<ProcessOutcome, PipelineError> {
        let type_id = spec.stage.type_id.as_str();
        let mut reader = self.registry.create_reader(type_id)?;
        reader
            .configure(ctx, spec.stage.source.as_deref(), &spec.stage.params)
            .await
            .map_err(|e| PipelineError::setup(StageRole::Reader, type_id, e))?;

        let mime_type = effective_mime_type(
            reader.mime_type(),
            spec.mime_override.as_deref(),
            self.registry.declared_mime_type(StageRole::Reader, type_id),
        );

        if let Some(last_modified) = reader.last_modified() {
            if ctx.is_fresh(last_modified) {
                debug!(reader = type_id, %last_modified, "Resource not modified");
                return Ok(ProcessOutcome::NotModified);
            }
        }

        let cache_target = self.store.and_then(|store| {
            let (stage_key, token) =
                cache_entry(StageRole::Reader, type_id, reader.as_cacheable())?;
            let key = AggregateKey::new().extended(stage_key.clone());
            let validity = ValiditySet::new().extended(stage_key, token);
            Some((store, key, validity))
        });

        let mut producer = Producer::Reader(reader.as_mut());
        let (cache, bytes_written) = match cache_target {
            Some((store, key, validity)) => {
                super::stream_cache::produce_cached(
                    store,
                    self.config,
                    key,
                    validity,
                    &mut producer,
                    out,
                )
                .await?
            }
            None => (CacheStatus::Bypassed, producer.run_counting(out).await?),
        };

        Ok(ProcessOutcome::Completed(Completion {
            cache,
            bytes_written,
            mime_type,
        }))
    }

    async fn process_composed(
        &self,
        ctx: &RequestContext,
        events: &mut EventPipeline,
        spec: &ByteStage,
        out: &mut (dyn AsyncWrite + Unpin + Send + '_),
    ) -> Result<ProcessOutcome, PipelineError> {
        let type_id = spec.stage.type_id.as_str();
        self.registry.ensure(StageRole::Render, type_id)?;
        events.prepare(ctx).await?;

        let mut render = self.registry.create_render(type_id)?;
        if let Err(e) = render
            .configure(ctx, spec.stage.source.as_deref(), &spec.stage.params)
            .await
        {
            events.release_prepared();
            return Err(PipelineError::setup(StageRole::Render, type_id, e));
        }

        let mime_type = effective_mime_type(
            render.mime_type(),
            spec.mime_override.as_deref(),
            self.registry.declared_mime_type(StageRole::Render, type_id),
        );

        let cache_target = self.store.and_then(|store| {
            let chain = events.whole_chain_key();
            let render_entry = cache_entry(StageRole::Render, type_id, render.as_cacheable());
            let Some(((chain_key, chain_validity), (stage_key, token))) = chain.zip(render_entry)
            else {
                debug!(render = type_id, "Chain not fully cacheable; bypassing byte cache");
                return None;
            };
            let key = chain_key.extended(stage_key.clone());
            let validity = chain_validity.extended(stage_key, token);
            Some((store, key, validity))
        });

        let mut producer = Producer::Composed {
            events,
            render: render.as_mut(),
        };
        let result = match cache_target {
            Some((store, key, validity)) => {
                super::stream_cache::produce_cached(
                    store,
                    self.config,
                    key,
                    validity,
                    &mut producer,
                    out,
                )
                .await
            }
            None => producer
                .run_counting(out)
                .await
                .map(|written| (CacheStatus::Bypassed, written)),
        };
        producer.release();
        let (cache, bytes_written) = result?;

        Ok(ProcessOutcome::Completed(Completion {
            cache,
            bytes_written,
            mime_type,
        }))
    }
}

/// The byte-producing end of a stream pipeline.
pub(super) enum Producer<'p> {
    Reader(&'p mut dyn ReaderStage),
    Composed {
        events: &'p mut EventPipeline,
        render: &'p mut dyn RenderStage,
    },
}

impl Producer<'_> {
    /// Produces the whole response into `out` and flushes it.
    pub(super) async fn run<W>(&mut self, out: &mut W) -> Result<(), PipelineError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            Self::Reader(reader) => reader.read(out).await.map_err(PipelineError::execution)?,
            Self::Composed { events, render } => {
                let mut consumer = RenderConsumer::new(&mut **render, out);
                let status = events.execute(&mut consumer).await?;
                debug!(?status, "Event pipeline fed render stage");
                consumer.finish().await.map_err(PipelineError::execution)?;
            }
        }
        out.flush()
            .await
            .map_err(|e| PipelineError::execution(StageError::Io(e)))
    }

    /// Produces into `out` without capturing, returning the bytes written.
    async fn run_counting(
        &mut self,
        out: &mut (dyn AsyncWrite + Unpin + Send + '_),
    ) -> Result<u64, PipelineError> {
        let mut writer = CaptureWriter::counting(out);
        self.run(&mut writer).await?;
        Ok(writer.written())
    }

    /// Drops event stages prepared but never executed, e.g. after a byte-cache hit.
    fn release(&mut self) {
        if let Self::Composed { events, .. } = self {
            events.release_prepared();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryCacheStore, ValidityToken};
    use crate::testing::{StageProbe, TestRegistry};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn reader_registry(probe: &Arc<StageProbe>) -> Arc<StageRegistry> {
        TestRegistry::new()
            .reader("file", Some("application/octet-stream"), probe, b"payload", None)
            .build()
    }

    #[test]
    fn test_reader_and_event_pipeline_are_exclusive() {
        let probe = StageProbe::uncacheable();
        let registry = reader_registry(&probe);
        let mut pipeline = StreamPipeline::new(Arc::clone(&registry));
        pipeline.set_reader("file", None).unwrap();

        let err = pipeline
            .set_event_pipeline(EventPipeline::new(Arc::clone(&registry)))
            .unwrap_err();
        assert_eq!(err.code, "PIPELINE-MIXED-ASSEMBLY");
        let err = pipeline.set_render("html", None).unwrap_err();
        assert_eq!(err.code, "PIPELINE-MIXED-ASSEMBLY");

        let mut composed = StreamPipeline::new(Arc::clone(&registry));
        composed.set_render("html", None).unwrap();
        let err = composed.set_reader("file", None).unwrap_err();
        assert_eq!(err.code, "PIPELINE-MIXED-ASSEMBLY");
    }

    #[test]
    fn test_duplicate_render_rejected() {
        let probe = StageProbe::uncacheable();
        let mut pipeline = StreamPipeline::new(reader_registry(&probe));
        pipeline.set_render("html", None).unwrap();

        let err = pipeline.set_render("text", None).unwrap_err();
        assert_eq!(err.code, "PIPELINE-DUPLICATE-STAGE");
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_incomplete() {
        let probe = StageProbe::uncacheable();
        let mut pipeline = StreamPipeline::new(reader_registry(&probe));
        let mut out: Vec<u8> = Vec::new();

        let err = pipeline
            .process(&RequestContext::new(), &mut out)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_event_pipeline_without_render_is_incomplete() {
        let probe = StageProbe::uncacheable();
        let registry = TestRegistry::new().source("src", &probe).build();
        let mut events = EventPipeline::new(Arc::clone(&registry));
        events.set_source("src").unwrap();
        let mut pipeline = StreamPipeline::new(registry);
        pipeline.set_event_pipeline(events).unwrap();

        let err = pipeline
            .process(&RequestContext::new(), &mut Vec::<u8>::new())
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert_eq!(probe.configure_count(), 0);
    }

    #[tokio::test]
    async fn test_plain_reader_writes_bytes() {
        let probe = StageProbe::uncacheable();
        let mut pipeline = StreamPipeline::new(reader_registry(&probe));
        pipeline.set_reader("file", None).unwrap();
        let mut out: Vec<u8> = Vec::new();

        let outcome = pipeline
            .process(&RequestContext::new(), &mut out)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProcessOutcome::Completed(Completion {
                cache: CacheStatus::Bypassed,
                bytes_written: 7,
                mime_type: Some("application/octet-stream".to_string()),
            })
        );
        assert_eq!(out, b"payload");
    }

    #[tokio::test]
    async fn test_reader_mime_override_beats_declared() {
        let probe = StageProbe::uncacheable();
        let mut pipeline = StreamPipeline::new(reader_registry(&probe));
        pipeline.set_reader("file", Some("text/plain")).unwrap();

        let outcome = pipeline
            .process(&RequestContext::new(), &mut Vec::<u8>::new())
            .await
            .unwrap();

        assert_eq!(
            outcome.completion().unwrap().mime_type.as_deref(),
            Some("text/plain")
        );
    }

    #[tokio::test]
    async fn test_reader_not_modified_writes_nothing() {
        let probe = StageProbe::cacheable(5, ValidityToken::tag("v1"));
        let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let registry = TestRegistry::new()
            .reader("file", None, &probe, b"payload", Some(modified))
            .build();
        let store = Arc::new(InMemoryCacheStore::new());
        let mut pipeline = StreamPipeline::caching(registry, store.clone());
        pipeline.set_reader("file", None).unwrap();
        let ctx = RequestContext::new().with_if_modified_since(modified);
        let mut out: Vec<u8> = Vec::new();

        let outcome = pipeline.process(&ctx, &mut out).await.unwrap();

        assert_eq!(outcome, ProcessOutcome::NotModified);
        assert!(out.is_empty());
        assert_eq!(probe.run_count(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reader_modified_since_is_served() {
        let probe = StageProbe::uncacheable();
        let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let registry = TestRegistry::new()
            .reader("file", None, &probe, b"payload", Some(modified))
            .build();
        let mut pipeline = StreamPipeline::new(registry);
        pipeline.set_reader("file", None).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut out: Vec<u8> = Vec::new();

        let outcome = pipeline
            .process(&RequestContext::new().with_if_modified_since(earlier), &mut out)
            .await
            .unwrap();

        assert!(outcome.completion().is_some());
        assert_eq!(out, b"payload");
    }

    #[tokio::test]
    async fn test_failed_hit_write_releases_prepared_events() {
        let probe = StageProbe::cacheable(5, ValidityToken::tag("v1"));
        let registry = TestRegistry::new()
            .source("src", &probe)
            .transform("up", &probe)
            .render("markup", Some("text/html"), None, &probe)
            .build();
        let mut events =
            EventPipeline::caching(Arc::clone(&registry), Arc::new(InMemoryCacheStore::new()));
        events.set_source("src").unwrap();
        events.add_transform("up");
        let mut pipeline = StreamPipeline::caching(registry, Arc::new(InMemoryCacheStore::new()));
        pipeline.set_event_pipeline(events).unwrap();
        pipeline.set_render("markup", None).unwrap();
        let mut warm: Vec<u8> = Vec::new();
        pipeline
            .process(&RequestContext::new(), &mut warm)
            .await
            .unwrap();

        let mut out = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "client went away",
            ))
            .build();
        let err = pipeline
            .process(&RequestContext::new(), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Execution { .. }));
        let events = pipeline.event_pipeline().unwrap();
        assert!(events.whole_chain_key().is_none());
        assert!(events.cacheable_prefix().is_none());
    }

    #[tokio::test]
    async fn test_composed_pipeline_renders_events() {
        let probe = StageProbe::uncacheable();
        let registry = TestRegistry::new()
            .source("src", &probe)
            .transform("up", &probe)
            .render("markup", Some("text/html"), Some("application/xhtml+xml"), &probe)
            .build();
        let mut events = EventPipeline::new(Arc::clone(&registry));
        events.set_source("src").unwrap();
        events.add_transform("up");
        let mut pipeline = StreamPipeline::new(registry);
        pipeline.set_event_pipeline(events).unwrap();
        pipeline.set_render("markup", Some("text/plain")).unwrap();
        let mut out: Vec<u8> = Vec::new();

        let outcome = pipeline
            .process(&RequestContext::new(), &mut out)
            .await
            .unwrap();

        assert_eq!(out, b"<doc>up(content)</doc>\n");
        let completion = outcome.completion().unwrap();
        assert_eq!(completion.bytes_written, out.len() as u64);
        assert_eq!(completion.mime_type.as_deref(), Some("application/xhtml+xml"));
    }

    #[tokio::test]
    async fn test_render_setup_failure_is_wrapped() {
        let source = StageProbe::uncacheable();
        let render = StageProbe::uncacheable();
        render.fail_setup(true);
        let registry = TestRegistry::new()
            .source("src", &source)
            .render("markup", None, None, &render)
            .build();
        let mut events = EventPipeline::new(Arc::clone(&registry));
        events.set_source("src").unwrap();
        let mut pipeline = StreamPipeline::new(registry);
        pipeline.set_event_pipeline(events).unwrap();
        pipeline.set_render("markup", None).unwrap();

        let err = pipeline
            .process(&RequestContext::new(), &mut Vec::<u8>::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Setup {
                role: StageRole::Render,
                ..
            }
        ));
        assert_eq!(source.run_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_render_fails_before_event_setup() {
        let source = StageProbe::uncacheable();
        let registry = TestRegistry::new().source("src", &source).build();
        let mut events = EventPipeline::new(Arc::clone(&registry));
        events.set_source("src").unwrap();
        let mut pipeline = StreamPipeline::new(registry);
        pipeline.set_event_pipeline(events).unwrap();
        pipeline.set_render("missing", None).unwrap();

        let err = pipeline
            .process(&RequestContext::new(), &mut Vec::<u8>::new())
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert_eq!(source.configure_count(), 0);
    }

    #[test]
    fn test_recycle_allows_reassembly() {
        let probe = StageProbe::uncacheable();
        let mut pipeline = StreamPipeline::new(reader_registry(&probe));
        pipeline.set_reader("file", None).unwrap();

        pipeline.recycle();

        pipeline.set_render("html", None).unwrap();
        assert!(pipeline.event_pipeline().is_none());
    }
}
