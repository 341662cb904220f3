//! Stage traits, the registry and the normalizer seam.
//!
//! Stages are the units that produce or transform a document. Each role
//! has its own trait on top of the common [`Stage`] contract; the optional
//! [`Cacheable`] capability is exposed through [`Stage::as_cacheable`].

mod normalizer;
mod registry;

pub use normalizer::Normalizer;
pub use registry::{
    ReaderFactory, RenderFactory, SourceFactory, StageRegistry, TransformFactory,
};

use crate::cache::{StageKey, ValidityToken};
use crate::context::RequestContext;
use crate::core::{DocEvent, Parameters, StageRole};
use crate::errors::StageResult;
use crate::events::EventConsumer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use tokio::io::AsyncWrite;

/// Contract shared by stages of every role.
#[async_trait]
pub trait Stage: Send + Debug {
    /// Binds request-scoped parameters. No events are produced here.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The request being served
    /// * `source` - Locator of the resource the stage works on, if any
    /// * `params` - Stage parameters for this request
    async fn configure(
        &mut self,
        _ctx: &RequestContext,
        _source: Option<&str>,
        _params: &Parameters,
    ) -> StageResult<()> {
        Ok(())
    }

    /// Returns the stage's cacheable capability, if it has one.
    fn as_cacheable(&self) -> Option<&dyn Cacheable> {
        None
    }
}

/// Optional capability of a stage to take part in result caching.
pub trait Cacheable {
    /// Key identifying this stage's output for the current request.
    ///
    /// `None` or `Some(0)` means the output cannot be cached.
    fn cache_key(&self) -> Option<u64>;

    /// Token proving the output for [`Cacheable::cache_key`] is current.
    fn validity(&self) -> Option<ValidityToken>;
}

/// Produces the initial event stream of a chain.
#[async_trait]
pub trait SourceStage: Stage {
    /// Pushes the whole document into `out`.
    async fn generate(&mut self, out: &mut (dyn EventConsumer + '_)) -> StageResult<()>;
}

/// Transforms events on their way downstream.
#[async_trait]
pub trait TransformStage: Stage {
    /// Handles one event, pushing zero or more events into `next`.
    async fn transform(
        &mut self,
        event: DocEvent,
        next: &mut (dyn EventConsumer + '_),
    ) -> StageResult<()>;
}

/// Turns an event stream into bytes.
#[async_trait]
pub trait RenderStage: Stage {
    /// Mime type of the rendered output, if the stage knows it.
    fn mime_type(&self) -> Option<String> {
        None
    }

    /// Renders one event into `out`.
    async fn render(
        &mut self,
        event: DocEvent,
        out: &mut (dyn AsyncWrite + Unpin + Send + '_),
    ) -> StageResult<()>;

    /// Called once after the last event.
    async fn finish(&mut self, _out: &mut (dyn AsyncWrite + Unpin + Send + '_)) -> StageResult<()> {
        Ok(())
    }
}

/// Produces bytes directly, without an event stream.
#[async_trait]
pub trait ReaderStage: Stage {
    /// Mime type of the resource, if the stage knows it.
    fn mime_type(&self) -> Option<String> {
        None
    }

    /// Last modification time of the resource, if known.
    fn last_modified(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Writes the whole resource into `out`.
    async fn read(&mut self, out: &mut (dyn AsyncWrite + Unpin + Send + '_)) -> StageResult<()>;
}

/// Reads a configured stage's cache key and validity.
///
/// Returns `None` unless the stage is cacheable and reports both a non-zero
/// key and a validity token for this request.
pub(crate) fn cache_entry(
    role: StageRole,
    type_id: &str,
    cacheable: Option<&dyn Cacheable>,
) -> Option<(StageKey, ValidityToken)> {
    let cacheable = cacheable?;
    let key = cacheable.cache_key().filter(|key| *key != 0)?;
    let validity = cacheable.validity()?;
    Some((StageKey::new(role, type_id, key), validity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fixed {
        key: Option<u64>,
        validity: Option<ValidityToken>,
    }

    impl Stage for Fixed {
        fn as_cacheable(&self) -> Option<&dyn Cacheable> {
            Some(self)
        }
    }

    impl Cacheable for Fixed {
        fn cache_key(&self) -> Option<u64> {
            self.key
        }

        fn validity(&self) -> Option<ValidityToken> {
            self.validity.clone()
        }
    }

    #[derive(Debug)]
    struct Plain;

    impl Stage for Plain {}

    #[test]
    fn test_cache_entry_requires_key_and_validity() {
        let full = Fixed {
            key: Some(7),
            validity: Some(ValidityToken::tag("v1")),
        };
        let (key, validity) = cache_entry(StageRole::Source, "file", full.as_cacheable()).unwrap();
        assert_eq!(key, StageKey::new(StageRole::Source, "file", 7));
        assert_eq!(validity, ValidityToken::tag("v1"));

        let zero = Fixed {
            key: Some(0),
            validity: Some(ValidityToken::Nop),
        };
        assert!(cache_entry(StageRole::Source, "file", zero.as_cacheable()).is_none());

        let no_validity = Fixed {
            key: Some(3),
            validity: None,
        };
        assert!(cache_entry(StageRole::Source, "file", no_validity.as_cacheable()).is_none());

        assert!(cache_entry(StageRole::Transform, "plain", Plain.as_cacheable()).is_none());
    }

    #[tokio::test]
    async fn test_default_configure_accepts_anything() {
        let mut stage = Plain;
        let ctx = RequestContext::new();
        stage
            .configure(&ctx, Some("a.xml"), &Parameters::new().with("x", "1"))
            .await
            .unwrap();
    }
}
