//! Mock stages for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::cache::ValidityToken;
use crate::context::RequestContext;
use crate::core::{DocEvent, Parameters};
use crate::errors::{StageError, StageResult};
use crate::events::EventConsumer;
use crate::stages::{
    Cacheable, ReaderStage, RenderStage, SourceStage, Stage, TransformStage,
};

/// Shared control and observation point for mock stages.
///
/// Stage instances are created per request by registry factories; tests keep
/// the probe to steer what those instances report and to count what they did.
#[derive(Debug, Default)]
pub struct StageProbe {
    cacheable: AtomicBool,
    key: Mutex<Option<u64>>,
    validity: Mutex<Option<ValidityToken>>,
    fail_setup: AtomicBool,
    fail_run: AtomicBool,
    configured: AtomicUsize,
    runs: AtomicUsize,
}

impl StageProbe {
    /// Creates a probe for a cacheable stage.
    #[must_use]
    pub fn cacheable(key: u64, validity: ValidityToken) -> Arc<Self> {
        let probe = Self::default();
        probe.cacheable.store(true, Ordering::SeqCst);
        *probe.key.lock() = Some(key);
        *probe.validity.lock() = Some(validity);
        Arc::new(probe)
    }

    /// Creates a probe for a stage without the cacheable capability.
    #[must_use]
    pub fn uncacheable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Turns the cacheable capability on or off.
    pub fn set_cacheable(&self, cacheable: bool) {
        self.cacheable.store(cacheable, Ordering::SeqCst);
    }

    /// Sets the key reported to the pipeline.
    pub fn set_key(&self, key: Option<u64>) {
        *self.key.lock() = key;
    }

    /// Sets the validity reported to the pipeline.
    pub fn set_validity(&self, validity: Option<ValidityToken>) {
        *self.validity.lock() = validity;
    }

    /// Makes `configure` fail.
    pub fn fail_setup(&self, fail: bool) {
        self.fail_setup.store(fail, Ordering::SeqCst);
    }

    /// Makes the production operation fail.
    pub fn fail_run(&self, fail: bool) {
        self.fail_run.store(fail, Ordering::SeqCst);
    }

    /// Number of times a stage was configured.
    #[must_use]
    pub fn configure_count(&self) -> usize {
        self.configured.load(Ordering::SeqCst)
    }

    /// Number of times a stage actually produced output.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Resets the counters.
    pub fn reset_counts(&self) {
        self.configured.store(0, Ordering::SeqCst);
        self.runs.store(0, Ordering::SeqCst);
    }

    fn is_cacheable(&self) -> bool {
        self.cacheable.load(Ordering::SeqCst)
    }

    fn on_configure(&self) -> StageResult<()> {
        self.configured.fetch_add(1, Ordering::SeqCst);
        if self.fail_setup.load(Ordering::SeqCst) {
            return Err(StageError::Unavailable("probe setup failure".to_string()));
        }
        Ok(())
    }

    fn on_run(&self) -> StageResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail_run.load(Ordering::SeqCst) {
            return Err(StageError::failed("probe run failure"));
        }
        Ok(())
    }
}

impl Cacheable for StageProbe {
    fn cache_key(&self) -> Option<u64> {
        *self.key.lock()
    }

    fn validity(&self) -> Option<ValidityToken> {
        self.validity.lock().clone()
    }
}

macro_rules! probe_stage {
    ($ty:ty) => {
        #[async_trait]
        impl Stage for $ty {
            async fn configure(
                &mut self,
                _ctx: &RequestContext,
                _source: Option<&str>,
                params: &Parameters,
            ) -> StageResult<()> {
                self.probe.on_configure()?;
                self.apply(params);
                Ok(())
            }

            fn as_cacheable(&self) -> Option<&dyn Cacheable> {
                if self.probe.is_cacheable() {
                    Some(self.probe.as_ref())
                } else {
                    None
                }
            }
        }
    };
}

/// A source that emits a fixed document.
#[derive(Debug)]
pub struct MockSource {
    probe: Arc<StageProbe>,
    events: Vec<DocEvent>,
}

impl MockSource {
    /// Creates a source emitting a small default document.
    #[must_use]
    pub fn new(probe: Arc<StageProbe>) -> Self {
        Self::with_events(
            probe,
            vec![
                DocEvent::StartDocument,
                DocEvent::start("doc"),
                DocEvent::text("content"),
                DocEvent::end("doc"),
                DocEvent::EndDocument,
            ],
        )
    }

    /// Creates a source emitting the given events.
    #[must_use]
    pub fn with_events(probe: Arc<StageProbe>, events: Vec<DocEvent>) -> Self {
        Self { probe, events }
    }

    fn apply(&mut self, params: &Parameters) {
        if let Some(text) = params.get("text") {
            self.events = vec![
                DocEvent::StartDocument,
                DocEvent::start("doc"),
                DocEvent::text(text),
                DocEvent::end("doc"),
                DocEvent::EndDocument,
            ];
        }
    }
}

probe_stage!(MockSource);

#[async_trait]
impl SourceStage for MockSource {
    async fn generate(&mut self, out: &mut (dyn EventConsumer + '_)) -> StageResult<()> {
        self.probe.on_run()?;
        for event in self.events.clone() {
            out.consume(event).await?;
        }
        Ok(())
    }
}

/// A transform that wraps character data in its label, e.g. `b(text)`.
#[derive(Debug)]
pub struct MockTransform {
    probe: Arc<StageProbe>,
    label: String,
}

impl MockTransform {
    /// Creates a labelled transform.
    #[must_use]
    pub fn new(probe: Arc<StageProbe>, label: impl Into<String>) -> Self {
        Self {
            probe,
            label: label.into(),
        }
    }

    fn apply(&mut self, params: &Parameters) {
        if let Some(label) = params.get("label") {
            self.label = label.to_string();
        }
    }
}

probe_stage!(MockTransform);

#[async_trait]
impl TransformStage for MockTransform {
    async fn transform(
        &mut self,
        event: DocEvent,
        next: &mut (dyn EventConsumer + '_),
    ) -> StageResult<()> {
        if matches!(event, DocEvent::StartDocument) {
            self.probe.on_run()?;
        }
        match event {
            DocEvent::Characters(text) => {
                next.consume(DocEvent::Characters(format!("{}({text})", self.label)))
                    .await
            }
            other => next.consume(other).await,
        }
    }
}

/// A render stage writing a compact markup form of the events.
#[derive(Debug)]
pub struct MockRender {
    probe: Arc<StageProbe>,
    mime_type: Option<String>,
}

impl MockRender {
    /// Creates a render stage that reports no mime type.
    #[must_use]
    pub const fn new(probe: Arc<StageProbe>) -> Self {
        Self {
            probe,
            mime_type: None,
        }
    }

    /// Makes the stage report a mime type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    fn apply(&mut self, _params: &Parameters) {}
}

probe_stage!(MockRender);

#[async_trait]
impl RenderStage for MockRender {
    fn mime_type(&self) -> Option<String> {
        self.mime_type.clone()
    }

    async fn render(
        &mut self,
        event: DocEvent,
        out: &mut (dyn AsyncWrite + Unpin + Send + '_),
    ) -> StageResult<()> {
        let text = match event {
            DocEvent::StartDocument => {
                self.probe.on_run()?;
                return Ok(());
            }
            DocEvent::StartElement { name, .. } => format!("<{name}>"),
            DocEvent::EndElement { name } => format!("</{name}>"),
            DocEvent::Characters(text) => text,
            _ => return Ok(()),
        };
        out.write_all(text.as_bytes()).await?;
        Ok(())
    }

    async fn finish(&mut self, out: &mut (dyn AsyncWrite + Unpin + Send + '_)) -> StageResult<()> {
        out.write_all(b"\n").await?;
        Ok(())
    }
}

/// A reader that writes fixed bytes.
#[derive(Debug)]
pub struct MockReader {
    probe: Arc<StageProbe>,
    content: Vec<u8>,
    mime_type: Option<String>,
    last_modified: Option<DateTime<Utc>>,
}

impl MockReader {
    /// Creates a reader writing `content`.
    #[must_use]
    pub const fn new(probe: Arc<StageProbe>, content: Vec<u8>) -> Self {
        Self {
            probe,
            content,
            mime_type: None,
            last_modified: None,
        }
    }

    /// Makes the reader report a mime type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Makes the reader report a last-modified time.
    #[must_use]
    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }

    fn apply(&mut self, _params: &Parameters) {}
}

probe_stage!(MockReader);

#[async_trait]
impl ReaderStage for MockReader {
    fn mime_type(&self) -> Option<String> {
        self.mime_type.clone()
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    async fn read(&mut self, out: &mut (dyn AsyncWrite + Unpin + Send + '_)) -> StageResult<()> {
        self.probe.on_run()?;
        out.write_all(&self.content).await?;
        Ok(())
    }
}
