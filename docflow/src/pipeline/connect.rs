//! Stage references and producer-to-consumer wiring.

use crate::core::{DocEvent, Parameters};
use crate::errors::StageResult;
use crate::events::EventConsumer;
use crate::stages::{Normalizer, RenderStage, TransformStage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

/// A stage named by registry identifier, with its request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRef {
    /// Registry identifier.
    pub type_id: String,
    /// Locator of the resource the stage works on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Stage parameters.
    #[serde(default)]
    pub params: Parameters,
}

impl StageRef {
    /// Creates a reference without source or parameters.
    #[must_use]
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            source: None,
            params: Parameters::new(),
        }
    }

    /// Sets the source locator.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets all parameters.
    #[must_use]
    pub fn with_params(mut self, params: Parameters) -> Self {
        self.params = params;
        self
    }

    /// Adds one parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.set(name, value);
        self
    }
}

impl From<&str> for StageRef {
    fn from(type_id: &str) -> Self {
        Self::new(type_id)
    }
}

/// A transform stage bound to its downstream consumer.
struct TransformLink<'a> {
    stage: Box<dyn TransformStage>,
    next: Box<dyn EventConsumer + 'a>,
}

#[async_trait]
impl EventConsumer for TransformLink<'_> {
    async fn consume(&mut self, event: DocEvent) -> StageResult<()> {
        self.stage.transform(event, &mut *self.next).await
    }
}

/// Connects transforms in order in front of `tail`.
///
/// A [`Normalizer`] seam sits in front of every transform and in front of
/// `tail`, so the returned head is always a seam.
pub(crate) fn connect<'a>(
    transforms: Vec<Box<dyn TransformStage>>,
    tail: Box<dyn EventConsumer + 'a>,
) -> Box<dyn EventConsumer + 'a> {
    let mut head: Box<dyn EventConsumer + 'a> = Box::new(Normalizer::new(tail));
    for stage in transforms.into_iter().rev() {
        head = Box::new(Normalizer::new(Box::new(TransformLink { stage, next: head })));
    }
    head
}

/// Adapts a render stage and its byte sink into an event consumer.
pub(crate) struct RenderConsumer<'a, R: RenderStage + ?Sized, W> {
    render: &'a mut R,
    out: &'a mut W,
}

impl<'a, R: RenderStage + ?Sized, W: AsyncWrite + Unpin + Send> RenderConsumer<'a, R, W> {
    pub(crate) fn new(render: &'a mut R, out: &'a mut W) -> Self {
        Self { render, out }
    }

    pub(crate) async fn finish(self) -> StageResult<()> {
        self.render.finish(self.out).await
    }
}

#[async_trait]
impl<R, W> EventConsumer for RenderConsumer<'_, R, W>
where
    R: RenderStage + ?Sized,
    W: AsyncWrite + Unpin + Send,
{
    async fn consume(&mut self, event: DocEvent) -> StageResult<()> {
        self.render.render(event, &mut *self.out).await
    }
}
