//! Event pipeline: a source followed by transforms, emitting document events.

use super::connect::connect;
use super::{CacheStatus, CacheStrategy, PipelineConfig, Recycle, StageRef};
use crate::cache::{AggregateKey, CacheStore, ValiditySet};
use crate::context::RequestContext;
use crate::core::StageRole;
use crate::errors::{ConfigurationError, PipelineError, StageResult};
use crate::events::EventConsumer;
use crate::observability::SpanTimer;
use crate::stages::{cache_entry, SourceStage, StageRegistry, TransformStage};
use std::sync::Arc;
use tracing::debug;

/// Orders a source and zero or more transforms into one event producer.
///
/// Constructed plain ([`EventPipeline::new`]) or caching
/// ([`EventPipeline::caching`]); the two differ only in their
/// [`CacheStrategy`]. Instances are request-scoped and reused through
/// [`EventPipeline::recycle`].
#[derive(Debug)]
pub struct EventPipeline {
    registry: Arc<StageRegistry>,
    strategy: CacheStrategy,
    config: PipelineConfig,
    source: Option<StageRef>,
    transforms: Vec<StageRef>,
    prepared: Option<PreparedChain>,
}

/// Stages instantiated and configured for the current request.
#[derive(Debug)]
pub(super) struct PreparedChain {
    pub(super) source: Box<dyn SourceStage>,
    pub(super) transforms: Vec<Box<dyn TransformStage>>,
    pub(super) resolution: Option<KeyResolution>,
}

/// The cacheable prefix of a prepared chain.
#[derive(Debug, Clone)]
pub(super) struct KeyResolution {
    pub(super) key: AggregateKey,
    pub(super) validity: ValiditySet,
    /// Number of leading transforms covered by `key`.
    pub(super) covered_transforms: usize,
}

impl EventPipeline {
    /// Creates a pipeline that always executes the full chain.
    #[must_use]
    pub fn new(registry: Arc<StageRegistry>) -> Self {
        Self::with_strategy(registry, CacheStrategy::Uncached)
    }

    /// Creates a pipeline that caches event fragments in `store`.
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
            source: None,
            transforms: Vec::new(),
            prepared: None,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns true if this pipeline caches.
    #[must_use]
    pub const fn is_caching(&self) -> bool {
        self.strategy.is_cached()
    }

    /// Sets the source stage.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a source is already set.
    pub fn set_source(&mut self, stage: impl Into<StageRef>) -> Result<(), ConfigurationError> {
        let stage = stage.into();
        if let Some(existing) = &self.source {
            return Err(ConfigurationError::duplicate(
                StageRole::Source,
                &existing.type_id,
                &stage.type_id,
            ));
        }
        self.source = Some(stage);
        Ok(())
    }

    /// Appends a transform stage.
    pub fn add_transform(&mut self, stage: impl Into<StageRef>) {
        self.transforms.push(stage.into());
    }

    /// Returns the assembled source, if any.
    #[must_use]
    pub const fn source(&self) -> Option<&StageRef> {
        self.source.as_ref()
    }

    /// Returns the assembled transforms, in order.
    #[must_use]
    pub fn transforms(&self) -> &[StageRef] {
        &self.transforms
    }

    /// Validates assembly, instantiates and configures every stage, and
    /// resolves the cacheable prefix when caching.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any stage is created if the
    /// chain is incomplete, or a setup error if a stage fails to configure.
    pub async fn prepare(&mut self, ctx: &RequestContext) -> Result<(), PipelineError> {
        self.prepared = None;
        let source_ref = self.validate()?.clone();

        let mut source = self.registry.create_source(&source_ref.type_id)?;
        source
            .configure(ctx, source_ref.source.as_deref(), &source_ref.params)
            .await
            .map_err(|e| PipelineError::setup(StageRole::Source, &source_ref.type_id, e))?;

        let mut transforms = Vec::with_capacity(self.transforms.len());
        for stage_ref in &self.transforms {
            let mut transform = self.registry.create_transform(&stage_ref.type_id)?;
            transform
                .configure(ctx, stage_ref.source.as_deref(), &stage_ref.params)
                .await
                .map_err(|e| PipelineError::setup(StageRole::Transform, &stage_ref.type_id, e))?;
            transforms.push(transform);
        }

        let resolution = if self.strategy.is_cached() {
            resolve_prefix(&source_ref, source.as_ref(), &self.transforms, &transforms)
        } else {
            None
        };

        self.prepared = Some(PreparedChain {
            source,
            transforms,
            resolution,
        });
        Ok(())
    }

    /// Aggregate key of the cacheable prefix resolved by the last `prepare`.
    #[must_use]
    pub fn cacheable_prefix(&self) -> Option<&AggregateKey> {
        self.prepared
            .as_ref()
            .and_then(|p| p.resolution.as_ref())
            .map(|r| &r.key)
    }

    /// Key and validity covering the whole prepared chain.
    ///
    /// `None` unless this pipeline caches and every stage, source through
    /// last transform, was cacheable for this request.
    #[must_use]
    pub fn whole_chain_key(&self) -> Option<(AggregateKey, ValiditySet)> {
        let prepared = self.prepared.as_ref()?;
        let resolution = prepared.resolution.as_ref()?;
        (resolution.covered_transforms == prepared.transforms.len())
            .then(|| (resolution.key.clone(), resolution.validity.clone()))
    }

    /// Executes the prepared chain into `sink`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pipeline was not prepared, or
    /// an execution error wrapping the first stage failure.
    pub async fn execute(
        &mut self,
        sink: &mut (dyn EventConsumer + '_),
    ) -> Result<CacheStatus, PipelineError> {
        let mut prepared = self
            .prepared
            .take()
            .ok_or_else(ConfigurationError::not_prepared)?;

        match (self.strategy.store(), prepared.resolution.take()) {
            (Some(store), Some(resolution)) => {
                super::event_cache::execute_cached(
                    store.as_ref(),
                    &self.config,
                    prepared,
                    resolution,
                    sink,
                )
                .await
            }
            _ => {
                run_live(prepared.source, prepared.transforms, sink)
                    .await
                    .map_err(PipelineError::execution)?;
                Ok(CacheStatus::Bypassed)
            }
        }
    }

    /// Prepares and executes the pipeline for one request.
    ///
    /// # Errors
    ///
    /// See [`EventPipeline::prepare`] and [`EventPipeline::execute`].
    #[tracing::instrument(
        name = "event_pipeline",
        skip_all,
        fields(request_id = %ctx.request_id, caching = self.strategy.is_cached())
    )]
    pub async fn process(
        &mut self,
        ctx: &RequestContext,
        sink: &mut (dyn EventConsumer + '_),
    ) -> Result<CacheStatus, PipelineError> {
        let timer = SpanTimer::start("event_pipeline");
        self.prepare(ctx).await?;
        let status = self.execute(sink).await?;
        debug!(?status, elapsed_ms = timer.elapsed_ms(), "Event pipeline completed");
        Ok(status)
    }

    /// Clears all request-scoped state so the instance can be reused.
    pub fn recycle(&mut self) {
        self.source = None;
        self.transforms.clear();
        self.prepared = None;
    }

    pub(super) fn release_prepared(&mut self) {
        self.prepared = None;
    }

    fn validate(&self) -> Result<&StageRef, ConfigurationError> {
        let source = self.source.as_ref().ok_or_else(ConfigurationError::no_source)?;
        self.registry.ensure(StageRole::Source, &source.type_id)?;
        for transform in &self.transforms {
            self.registry.ensure(StageRole::Transform, &transform.type_id)?;
        }
        Ok(source)
    }
}

impl Recycle for EventPipeline {
    fn recycle(&mut self) {
        Self::recycle(self);
    }
}

/// Runs the whole chain live: source, every transform, then `sink`.
pub(super) async fn run_live(
    mut source: Box<dyn SourceStage>,
    transforms: Vec<Box<dyn TransformStage>>,
    sink: &mut (dyn EventConsumer + '_),
) -> StageResult<()> {
    let mut head = connect(transforms, Box::new(sink));
    source.generate(&mut *head).await
}

/// Resolves the longest cacheable prefix, starting at the source.
///
/// Returns `None` if the source itself is not cacheable. Otherwise walks the
/// transforms in order and stops at the first one without a usable key and
/// validity; later transforms are never consulted.
fn resolve_prefix(
    source_ref: &StageRef,
    source: &dyn SourceStage,
    transform_refs: &[StageRef],
    transforms: &[Box<dyn TransformStage>],
) -> Option<KeyResolution> {
    let Some((source_key, source_validity)) =
        cache_entry(StageRole::Source, &source_ref.type_id, source.as_cacheable())
    else {
        debug!(source = %source_ref.type_id, "Source is not cacheable; caching disabled");
        return None;
    };

    let mut key = AggregateKey::new();
    let mut validity = ValiditySet::new();
    key.push(source_key.clone());
    validity.insert(source_key, source_validity);

    let mut covered_transforms = 0;
    for (stage_ref, stage) in transform_refs.iter().zip(transforms) {
        match cache_entry(StageRole::Transform, &stage_ref.type_id, stage.as_cacheable()) {
            Some((stage_key, token)) => {
                key.push(stage_key.clone());
                validity.insert(stage_key, token);
                covered_transforms += 1;
            }
            None => {
                debug!(
                    transform = %stage_ref.type_id,
                    position = covered_transforms,
                    "Cacheable prefix ends before non-cacheable transform"
                );
                break;
            }
        }
    }

    Some(KeyResolution {
        key,
        validity,
        covered_transforms,
    })
}
