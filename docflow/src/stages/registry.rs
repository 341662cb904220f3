//! Registry mapping stage identifiers to factories.

use super::{ReaderStage, RenderStage, SourceStage, TransformStage};
use crate::core::StageRole;
use crate::errors::ConfigurationError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Factory for source stages.
pub type SourceFactory = Arc<dyn Fn() -> Box<dyn SourceStage> + Send + Sync>;
/// Factory for transform stages.
pub type TransformFactory = Arc<dyn Fn() -> Box<dyn TransformStage> + Send + Sync>;
/// Factory for render stages.
pub type RenderFactory = Arc<dyn Fn() -> Box<dyn RenderStage> + Send + Sync>;
/// Factory for reader stages.
pub type ReaderFactory = Arc<dyn Fn() -> Box<dyn ReaderStage> + Send + Sync>;

struct Registration<F> {
    factory: F,
    mime_type: Option<String>,
}

/// Maps stable stage identifiers to factories, per role.
///
/// Built once at startup and shared read-only between pipelines. Pipelines
/// keep only identifiers and parameters until they are prepared.
#[derive(Default)]
pub struct StageRegistry {
    sources: HashMap<String, Registration<SourceFactory>>,
    transforms: HashMap<String, Registration<TransformFactory>>,
    renders: HashMap<String, Registration<RenderFactory>>,
    readers: HashMap<String, Registration<ReaderFactory>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source stage.
    pub fn register_source<F>(&mut self, type_id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn SourceStage> + Send + Sync + 'static,
    {
        self.sources.insert(
            type_id.into(),
            Registration {
                factory: Arc::new(factory),
                mime_type: None,
            },
        );
        self
    }

    /// Registers a transform stage.
    pub fn register_transform<F>(&mut self, type_id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn TransformStage> + Send + Sync + 'static,
    {
        self.transforms.insert(
            type_id.into(),
            Registration {
                factory: Arc::new(factory),
                mime_type: None,
            },
        );
        self
    }

    /// Registers a render stage with its declared default mime type.
    pub fn register_render<F>(
        &mut self,
        type_id: impl Into<String>,
        mime_type: Option<&str>,
        factory: F,
    ) -> &mut Self
    where
        F: Fn() -> Box<dyn RenderStage> + Send + Sync + 'static,
    {
        self.renders.insert(
            type_id.into(),
            Registration {
                factory: Arc::new(factory),
                mime_type: mime_type.map(str::to_string),
            },
        );
        self
    }

    /// Registers a reader stage with its declared default mime type.
    pub fn register_reader<F>(
        &mut self,
        type_id: impl Into<String>,
        mime_type: Option<&str>,
        factory: F,
    ) -> &mut Self
    where
        F: Fn() -> Box<dyn ReaderStage> + Send + Sync + 'static,
    {
        self.readers.insert(
            type_id.into(),
            Registration {
                factory: Arc::new(factory),
                mime_type: mime_type.map(str::to_string),
            },
        );
        self
    }

    /// Returns true if a stage is registered for the role and identifier.
    #[must_use]
    pub fn contains(&self, role: StageRole, type_id: &str) -> bool {
        match role {
            StageRole::Source => self.sources.contains_key(type_id),
            StageRole::Transform => self.transforms.contains_key(type_id),
            StageRole::Render => self.renders.contains_key(type_id),
            StageRole::Reader => self.readers.contains_key(type_id),
        }
    }

    /// Checks that a stage is registered.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the missing stage.
    pub fn ensure(&self, role: StageRole, type_id: &str) -> Result<(), ConfigurationError> {
        if self.contains(role, type_id) {
            Ok(())
        } else {
            Err(ConfigurationError::unknown_stage(role, type_id))
        }
    }

    /// Declared default mime type of a render or reader stage.
    #[must_use]
    pub fn declared_mime_type(&self, role: StageRole, type_id: &str) -> Option<&str> {
        let registration = match role {
            StageRole::Render => self.renders.get(type_id).map(|r| &r.mime_type),
            StageRole::Reader => self.readers.get(type_id).map(|r| &r.mime_type),
            StageRole::Source | StageRole::Transform => None,
        };
        registration.and_then(Option::as_deref)
    }

    /// Instantiates a source stage.
    pub fn create_source(&self, type_id: &str) -> Result<Box<dyn SourceStage>, ConfigurationError> {
        self.sources
            .get(type_id)
            .map(|r| (r.factory)())
            .ok_or_else(|| ConfigurationError::unknown_stage(StageRole::Source, type_id))
    }

    /// Instantiates a transform stage.
    pub fn create_transform(
        &self,
        type_id: &str,
    ) -> Result<Box<dyn TransformStage>, ConfigurationError> {
        self.transforms
            .get(type_id)
            .map(|r| (r.factory)())
            .ok_or_else(|| ConfigurationError::unknown_stage(StageRole::Transform, type_id))
    }

    /// Instantiates a render stage.
    pub fn create_render(&self, type_id: &str) -> Result<Box<dyn RenderStage>, ConfigurationError> {
        self.renders
            .get(type_id)
            .map(|r| (r.factory)())
            .ok_or_else(|| ConfigurationError::unknown_stage(StageRole::Render, type_id))
    }

    /// Instantiates a reader stage.
    pub fn create_reader(&self, type_id: &str) -> Result<Box<dyn ReaderStage>, ConfigurationError> {
        self.readers
            .get(type_id)
            .map(|r| (r.factory)())
            .ok_or_else(|| ConfigurationError::unknown_stage(StageRole::Reader, type_id))
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sources: Vec<&String> = self.sources.keys().collect();
        let mut transforms: Vec<&String> = self.transforms.keys().collect();
        let mut renders: Vec<&String> = self.renders.keys().collect();
        let mut readers: Vec<&String> = self.readers.keys().collect();
        sources.sort();
        transforms.sort();
        renders.sort();
        readers.sort();
        f.debug_struct("StageRegistry")
            .field("sources", &sources)
            .field("transforms", &transforms)
            .field("renders", &renders)
            .field("readers", &readers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockReader, MockSource, StageProbe};

    #[test]
    fn test_register_and_create() {
        let source_probe = StageProbe::uncacheable();
        let reader_probe = StageProbe::uncacheable();
        let mut registry = StageRegistry::new();
        registry
            .register_source("file", move || Box::new(MockSource::new(source_probe.clone())))
            .register_reader("resource", Some("text/plain"), move || {
                Box::new(MockReader::new(reader_probe.clone(), b"x".to_vec()))
            });

        assert!(registry.contains(StageRole::Source, "file"));
        assert!(!registry.contains(StageRole::Transform, "file"));
        assert!(registry.create_source("file").is_ok());
        assert!(registry.create_reader("resource").is_ok());
        assert_eq!(
            registry.declared_mime_type(StageRole::Reader, "resource"),
            Some("text/plain")
        );
        assert_eq!(registry.declared_mime_type(StageRole::Source, "file"), None);
    }

    #[test]
    fn test_unknown_stage_is_configuration_error() {
        let registry = StageRegistry::new();
        let err = registry.create_transform("xslt").unwrap_err();
        assert_eq!(err.code, "PIPELINE-UNKNOWN-STAGE");
        assert!(registry.ensure(StageRole::Render, "html").is_err());
    }

    #[test]
    fn test_debug_lists_identifiers() {
        let mut registry = StageRegistry::new();
        registry.register_source("b", || Box::new(MockSource::new(StageProbe::uncacheable())));
        registry.register_source("a", || Box::new(MockSource::new(StageProbe::uncacheable())));
        let debug = format!("{registry:?}");
        assert!(debug.contains("[\"a\", \"b\"]"));
    }
}
