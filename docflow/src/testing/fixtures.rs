//! Test fixtures for pipeline testing.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{MockReader, MockRender, MockSource, MockTransform, StageProbe};
use crate::core::DocEvent;
use crate::stages::StageRegistry;

/// Builder for a registry of probe-backed mock stages.
#[derive(Debug, Default)]
pub struct TestRegistry {
    registry: StageRegistry,
}

impl TestRegistry {
    /// Creates an empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a [`MockSource`] emitting its default document.
    #[must_use]
    pub fn source(mut self, type_id: &str, probe: &Arc<StageProbe>) -> Self {
        let probe = Arc::clone(probe);
        self.registry
            .register_source(type_id, move || Box::new(MockSource::new(probe.clone())));
        self
    }

    /// Registers a [`MockSource`] emitting the given events.
    #[must_use]
    pub fn source_with_events(
        mut self,
        type_id: &str,
        probe: &Arc<StageProbe>,
        events: Vec<DocEvent>,
    ) -> Self {
        let probe = Arc::clone(probe);
        self.registry.register_source(type_id, move || {
            Box::new(MockSource::with_events(probe.clone(), events.clone()))
        });
        self
    }

    /// Registers a [`MockTransform`] labelled with its identifier.
    #[must_use]
    pub fn transform(mut self, type_id: &str, probe: &Arc<StageProbe>) -> Self {
        let probe = Arc::clone(probe);
        let label = type_id.to_string();
        self.registry.register_transform(type_id, move || {
            Box::new(MockTransform::new(probe.clone(), label.clone()))
        });
        self
    }

    /// Registers a [`MockRender`].
    #[must_use]
    pub fn render(
        mut self,
        type_id: &str,
        declared_mime_type: Option<&str>,
        reported_mime_type: Option<&str>,
        probe: &Arc<StageProbe>,
    ) -> Self {
        let probe = Arc::clone(probe);
        let reported = reported_mime_type.map(str::to_string);
        self.registry
            .register_render(type_id, declared_mime_type, move || {
                let render = MockRender::new(probe.clone());
                Box::new(match &reported {
                    Some(mime) => render.with_mime_type(mime.clone()),
                    None => render,
                })
            });
        self
    }

    /// Registers a [`MockReader`].
    #[must_use]
    pub fn reader(
        mut self,
        type_id: &str,
        declared_mime_type: Option<&str>,
        probe: &Arc<StageProbe>,
        content: &[u8],
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        let probe = Arc::clone(probe);
        let content = content.to_vec();
        self.registry
            .register_reader(type_id, declared_mime_type, move || {
                let reader = MockReader::new(probe.clone(), content.clone());
                Box::new(match last_modified {
                    Some(at) => reader.with_last_modified(at),
                    None => reader,
                })
            });
        self
    }

    /// Finishes the registry.
    #[must_use]
    pub fn build(self) -> Arc<StageRegistry> {
        Arc::new(self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageRole;

    #[test]
    fn test_fixture_registers_all_roles() {
        let probe = StageProbe::uncacheable();
        let registry = TestRegistry::new()
            .source("src", &probe)
            .transform("t", &probe)
            .render("html", Some("text/html"), None, &probe)
            .reader("file", None, &probe, b"abc", None)
            .build();

        assert!(registry.contains(StageRole::Source, "src"));
        assert!(registry.contains(StageRole::Transform, "t"));
        assert!(registry.contains(StageRole::Render, "html"));
        assert!(registry.contains(StageRole::Reader, "file"));
        assert_eq!(
            registry.declared_mime_type(StageRole::Render, "html"),
            Some("text/html")
        );
    }
}
