//! Byte-level cache orchestration: whole responses, all or nothing.

use super::lookup::{lookup, store_artifact, Lookup};
use super::stream::Producer;
use super::writer::CaptureWriter;
use super::{CacheStatus, PipelineConfig};
use crate::cache::{AggregateKey, ArtifactContent, CacheStore, CachedArtifact, ValiditySet};
use crate::errors::{PipelineError, StageError};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Serves the response from the byte cache, or produces it live while
/// capturing it for the cache.
///
/// Returns the cache status and the number of bytes written to `out`.
pub(super) async fn produce_cached(
    store: &dyn CacheStore,
    config: &PipelineConfig,
    key: AggregateKey,
    validity: ValiditySet,
    producer: &mut Producer<'_>,
    out: &mut (dyn AsyncWrite + Unpin + Send + '_),
) -> Result<(CacheStatus, u64), PipelineError> {
    let cached = lookup(store, &key, &validity, |artifact| match artifact.content {
        ArtifactContent::Bytes(bytes) => Some(bytes),
        ArtifactContent::Events(_) => None,
    })
    .await;

    let invalidated = match cached {
        Lookup::Hit(bytes) => {
            debug!(key = %key, bytes = bytes.len(), "Serving cached response");
            let written = write_hit(out, &bytes).await?;
            return Ok((CacheStatus::Hit { covered: key.len() }, written));
        }
        Lookup::Miss => false,
        Lookup::Invalidated => true,
    };

    let mut writer = CaptureWriter::capturing(out, config.max_capture_bytes);
    producer.run(&mut writer).await?;
    let (written, capture) = writer.into_parts();

    let stored = match capture {
        Some(bytes) => {
            let artifact = CachedArtifact::bytes(bytes, validity);
            store_artifact(store, key, artifact).await
        }
        None => false,
    };
    let status = if invalidated {
        CacheStatus::Invalidated { stored }
    } else {
        CacheStatus::Miss { stored }
    };
    Ok((status, written))
}

async fn write_hit(
    out: &mut (dyn AsyncWrite + Unpin + Send + '_),
    bytes: &[u8],
) -> Result<u64, PipelineError> {
    let io = |e| PipelineError::execution(StageError::Io(e));
    out.write_all(bytes).await.map_err(io)?;
    out.flush().await.map_err(io)?;
    Ok(bytes.len() as u64)
}
