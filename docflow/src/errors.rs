//! Error types for docflow pipelines.
//!
//! Fatal conditions surface as a single [`PipelineError`] carrying the
//! original cause. Cache-store failures and stale cache entries are absorbed
//! inside the pipeline and never reach the caller.

use crate::core::StageRole;
use thiserror::Error;

/// The error returned by pipeline processing.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline was assembled incompletely.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A stage failed to configure.
    #[error("Setup of {role} stage '{stage}' failed: {source}")]
    Setup {
        /// Role of the failing stage.
        role: StageRole,
        /// Registry identifier of the failing stage.
        stage: String,
        /// The original cause.
        #[source]
        source: StageError,
    },

    /// A stage failed while producing or transforming output.
    #[error("Pipeline execution failed: {source}")]
    Execution {
        /// The original cause.
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    /// Wraps a stage setup failure.
    #[must_use]
    pub fn setup(role: StageRole, stage: impl Into<String>, source: StageError) -> Self {
        Self::Setup {
            role,
            stage: stage.into(),
            source,
        }
    }

    /// Wraps a stage execution failure.
    #[must_use]
    pub const fn execution(source: StageError) -> Self {
        Self::Execution { source }
    }

    /// Returns true if the error was raised before any stage ran.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Error raised when a pipeline is assembled incompletely.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// Machine-readable error code (e.g., "PIPELINE-NO-SOURCE").
    pub code: String,
    /// The stage identifiers involved in the error.
    pub stages: Vec<String>,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            stages: Vec::new(),
            fix_hint: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    pub(crate) fn no_source() -> Self {
        Self::new("PIPELINE-NO-SOURCE", "Pipeline has no source stage")
            .with_fix_hint("Call set_source before processing the pipeline.")
    }

    pub(crate) fn duplicate(role: StageRole, existing: &str, attempted: &str) -> Self {
        Self::new(
            "PIPELINE-DUPLICATE-STAGE",
            format!("A {role} stage '{existing}' is already set; cannot set '{attempted}'"),
        )
        .with_stages(vec![existing.to_string(), attempted.to_string()])
        .with_fix_hint(format!("A pipeline accepts at most one {role} stage."))
    }

    pub(crate) fn unknown_stage(role: StageRole, type_id: &str) -> Self {
        Self::new(
            "PIPELINE-UNKNOWN-STAGE",
            format!("No {role} stage registered as '{type_id}'"),
        )
        .with_stages(vec![type_id.to_string()])
        .with_fix_hint("Register the stage factory before assembling pipelines that use it.")
    }

    pub(crate) fn mixed_assembly(existing: &str, attempted: &str) -> Self {
        Self::new(
            "PIPELINE-MIXED-ASSEMBLY",
            format!("Cannot add {attempted} to a pipeline that already has {existing}"),
        )
        .with_fix_hint("Use either a reader, or an event pipeline followed by a render stage.")
    }

    pub(crate) fn duplicate_event_pipeline() -> Self {
        Self::new(
            "PIPELINE-DUPLICATE-STAGE",
            "An event pipeline is already set",
        )
    }

    pub(crate) fn incomplete(missing: &str) -> Self {
        Self::new(
            "PIPELINE-INCOMPLETE",
            format!("Stream pipeline is missing its {missing}"),
        )
        .with_fix_hint(
            "Call set_reader, or both set_event_pipeline and set_render, before processing.",
        )
    }

    pub(crate) fn not_prepared() -> Self {
        Self::new(
            "PIPELINE-NOT-PREPARED",
            "Pipeline must be prepared before it is executed",
        )
    }
}

/// Error raised by a stage during setup or execution.
#[derive(Debug, Error)]
pub enum StageError {
    /// A parameter was missing or malformed.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A resource the stage depends on could not be reached.
    #[error("Resource unavailable: {0}")]
    Unavailable(String),

    /// The stage failed for a stage-specific reason.
    #[error("{0}")]
    Failed(String),

    /// Writing to or reading from a byte stream failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error raised by stage business logic.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    /// Creates an invalid parameter error.
    #[must_use]
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a generic failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result alias for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Error raised by a cache store backend.
#[derive(Debug, Error)]
pub enum CacheStoreError {
    /// The backend could not serve the request.
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    /// An artifact could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error in a persistent backend.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_builders() {
        let err = ConfigurationError::new("TEST-001", "Test error")
            .with_stages(vec!["file".to_string()])
            .with_fix_hint("Fix this by doing that");

        assert_eq!(err.code, "TEST-001");
        assert_eq!(err.to_string(), "Test error");
        assert_eq!(err.stages, vec!["file".to_string()]);
        assert_eq!(err.fix_hint, Some("Fix this by doing that".to_string()));
    }

    #[test]
    fn test_duplicate_stage_message() {
        let err = ConfigurationError::duplicate(StageRole::Source, "file", "dir");
        assert_eq!(err.code, "PIPELINE-DUPLICATE-STAGE");
        assert!(err.to_string().contains("'file'"));
        assert!(err.to_string().contains("'dir'"));
    }

    #[test]
    fn test_setup_error_keeps_cause() {
        let err = PipelineError::setup(
            StageRole::Transform,
            "xslt",
            StageError::invalid_parameter("stylesheet", "missing"),
        );

        assert!(err.to_string().contains("transform stage 'xslt'"));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(
            source,
            Some("Invalid parameter 'stylesheet': missing".to_string())
        );
    }

    #[test]
    fn test_configuration_conversion() {
        let err: PipelineError = ConfigurationError::no_source().into();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_stage_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client went away");
        let err = PipelineError::execution(io.into());
        assert!(err.to_string().contains("client went away"));
        assert!(!err.is_configuration());
    }
}
