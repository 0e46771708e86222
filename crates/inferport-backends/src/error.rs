//! Error types for backend registration, selection, and job validation.
//!
//! [`ErrorKind`] is the taxonomy shared by every crate in the workspace;
//! [`ApiError`] is what a backend API call returns, whether it ran in-process
//! or inside a worker.

use std::path::PathBuf;

use inferport_targets::{bulleted_alternatives, TargetError};

/// Broad category of a failure, used to decide how it is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unsupported chip, core or accelerator, or an ownership violation.
    Resolution,
    /// No backend can serve the target, or the chosen one cannot.
    Selection,
    /// Malformed or conflicting build request.
    Validation,
    /// Image acquisition, spawn or readiness failure of an isolated worker.
    WorkerLifecycle,
    /// A worker reported an error-level record.
    EscalatedRuntime,
    /// A worker HTTP failure whose body was not a structured error.
    Transport,
    /// A backend implementation failed while building.
    Backend,
    /// Broken configuration, I/O, or anything else not caused by the request.
    Internal,
}

impl ErrorKind {
    /// Errors caused by the request itself, detected before any work starts.
    pub fn is_request_error(self) -> bool {
        matches!(
            self,
            ErrorKind::Resolution | ErrorKind::Selection | ErrorKind::Validation
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Resolution => "resolution",
            ErrorKind::Selection => "selection",
            ErrorKind::Validation => "validation",
            ErrorKind::WorkerLifecycle => "worker-lifecycle",
            ErrorKind::EscalatedRuntime => "escalated-runtime",
            ErrorKind::Transport => "transport",
            ErrorKind::Backend => "backend",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while registering backends or verifying build jobs.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Target resolution failed.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// A backend with this name is already registered.
    #[error("A backend of the name {name} already exists")]
    AlreadyRegistered { name: String },

    /// A backend target references a runtime the backend did not declare.
    #[error("backend {backend}: runtime {runtime} not in {declared:?}")]
    UndeclaredRuntime {
        backend: String,
        runtime: String,
        declared: Vec<String>,
    },

    /// A backend target references a firmware platform the backend did not declare.
    #[error("backend {backend}: firmware platform {firmware_platform} not in {declared:?}")]
    UndeclaredFirmwarePlatform {
        backend: String,
        firmware_platform: String,
        declared: Vec<String>,
    },

    /// The user named a backend that is not registered.
    #[error("Could not find the backend \"{name}\"{}", bulleted_alternatives(.available))]
    BackendNotFound { name: String, available: Vec<String> },

    /// No registered backend can serve the target.
    #[error("Could not find a backend which supports this configuration ({target})")]
    NoMatchingBackend { target: String },

    /// The user-chosen backend cannot serve the target.
    #[error("{backend} cannot support the passed configuration ({target})")]
    CannotSupport { backend: String, target: String },

    /// Two enabled jobs target the same accelerator.
    #[error("{accelerator} already has {owner} targeting it")]
    AcceleratorConflict {
        accelerator: String,
        /// Name of the job that claimed the accelerator first.
        owner: String,
    },

    /// Nothing is enabled.
    #[error("No enabled configurations found")]
    NoEnabledJobs,

    /// Two jobs in one batch share a name.
    #[error("duplicate job name '{name}' in batch")]
    DuplicateJob { name: String },

    /// No project exists for the targeted core.
    #[error("A project for {core} could not be found")]
    MissingProject { core: String },

    /// User-supplied backend extensions do not match the backend's schema.
    #[error("invalid extensions for backend {backend}: {detail}")]
    InvalidExtensions { backend: String, detail: String },

    /// A backend manifest declares an execution kind that cannot be dispatched.
    #[error("unsupported backend kind '{kind}' for backend {backend}")]
    UnsupportedBackendKind { backend: String, kind: String },

    /// A backend manifest declares a worker protocol that cannot be dispatched.
    #[error("unsupported worker protocol '{protocol}' for backend {backend}")]
    UnsupportedProtocol { backend: String, protocol: String },

    /// A backend manifest is structurally wrong.
    #[error("invalid backend manifest: {detail}")]
    InvalidManifest { detail: String },

    /// TOML deserialization error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON error in an extension schema or job payload.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest or schema file not found.
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Target(e) if e.is_resolution_failure() => ErrorKind::Resolution,
            BackendError::BackendNotFound { .. }
            | BackendError::NoMatchingBackend { .. }
            | BackendError::CannotSupport { .. } => ErrorKind::Selection,
            BackendError::AcceleratorConflict { .. }
            | BackendError::NoEnabledJobs
            | BackendError::DuplicateJob { .. }
            | BackendError::MissingProject { .. }
            | BackendError::InvalidExtensions { .. } => ErrorKind::Validation,
            _ => ErrorKind::Internal,
        }
    }
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Failure of a backend API call.
///
/// Renders as its message only; the kind decides how callers surface it
/// (for example, which HTTP status a worker answers with).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// A failure inside a backend implementation.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backend, message)
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        ApiError::new(err.kind(), err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::new(ErrorKind::Internal, err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let resolution = BackendError::Target(TargetError::UnsupportedSoc {
            soc: "X".into(),
            supported: vec![],
        });
        assert_eq!(resolution.kind(), ErrorKind::Resolution);
        let fault = BackendError::Target(TargetError::Configuration {
            detail: "x".into(),
        });
        assert_eq!(fault.kind(), ErrorKind::Internal);
        assert_eq!(BackendError::NoEnabledJobs.kind(), ErrorKind::Validation);
        assert_eq!(
            BackendError::NoMatchingBackend { target: "t".into() }.kind(),
            ErrorKind::Selection
        );
    }

    #[test]
    fn backend_not_found_lists_registered() {
        let err = BackendError::BackendNotFound {
            name: "onnx".into(),
            available: vec!["tflm".into(), "izer".into()],
        };
        assert_eq!(
            err.to_string(),
            "Could not find the backend \"onnx\"\nBut the following are supported\n  - izer\n  - tflm"
        );
    }

    #[test]
    fn api_error_keeps_kind_and_message() {
        let err: ApiError = BackendError::AcceleratorConflict {
            accelerator: "CNN".into(),
            owner: "first".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "CNN already has first targeting it");
        assert!(err.kind().is_request_error());
    }
}
