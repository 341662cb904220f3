//! Event-level cache orchestration: replay on hit, capture on miss.

use super::connect::connect;
use super::event::{run_live, KeyResolution, PreparedChain};
use super::lookup::{lookup, store_artifact, Lookup};
use super::{CacheStatus, PipelineConfig};
use crate::cache::{ArtifactContent, CacheStore, CachedArtifact};
use crate::core::EventFragment;
use crate::errors::{PipelineError, StageResult};
use crate::events::{replay, EventConsumer, EventTee};
use crate::stages::{SourceStage, TransformStage};
use tracing::debug;

/// Executes a prepared chain whose prefix resolved to a cache key.
pub(super) async fn execute_cached(
    store: &dyn CacheStore,
    config: &PipelineConfig,
    prepared: PreparedChain,
    resolution: KeyResolution,
    sink: &mut (dyn EventConsumer + '_),
) -> Result<CacheStatus, PipelineError> {
    let PreparedChain {
        source,
        mut transforms,
        ..
    } = prepared;
    let KeyResolution {
        key,
        validity,
        covered_transforms,
    } = resolution;
    let suffix = transforms.split_off(covered_transforms);

    let cached = lookup(store, &key, &validity, |artifact| match artifact.content {
        ArtifactContent::Events(fragment) => Some(fragment),
        ArtifactContent::Bytes(_) => None,
    })
    .await;

    match cached {
        Lookup::Hit(fragment) => {
            debug!(key = %key, events = fragment.len(), "Replaying cached event fragment");
            let mut tail = connect(suffix, Box::new(sink));
            replay(&fragment, &mut *tail)
                .await
                .map_err(PipelineError::execution)?;
            Ok(CacheStatus::Hit { covered: key.len() })
        }
        Lookup::Invalidated => {
            // The next call finds nothing and repopulates.
            transforms.extend(suffix);
            run_live(source, transforms, sink)
                .await
                .map_err(PipelineError::execution)?;
            Ok(CacheStatus::Invalidated { stored: false })
        }
        Lookup::Miss => {
            let capture = run_capturing(source, transforms, suffix, sink, config)
                .await
                .map_err(PipelineError::execution)?;
            let Some(fragment) = capture else {
                return Ok(CacheStatus::Miss { stored: false });
            };
            let artifact = CachedArtifact::events(fragment, validity);
            let stored = store_artifact(store, key, artifact).await;
            Ok(CacheStatus::Miss { stored })
        }
    }
}

/// Runs the chain live, recording the events leaving the cached prefix.
///
/// The tee sits between the last covered transform and the first uncovered
/// one, so exactly the prefix output is captured.
async fn run_capturing(
    mut source: Box<dyn SourceStage>,
    prefix: Vec<Box<dyn TransformStage>>,
    suffix: Vec<Box<dyn TransformStage>>,
    sink: &mut (dyn EventConsumer + '_),
    config: &PipelineConfig,
) -> StageResult<Option<EventFragment>> {
    let mut capture = None;
    {
        let tail = connect(suffix, Box::new(sink));
        let tee = EventTee::new(tail, &mut capture, config.max_capture_events);
        let mut head = connect(prefix, Box::new(tee));
        source.generate(&mut *head).await?;
    }
    Ok(capture)
}
