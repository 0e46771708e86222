//! Error types for isolated worker orchestration.

use std::time::Duration;

use inferport_backends::{ApiError, ErrorKind};

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Result type for container engine calls, before image context is attached.
pub type EngineResult<T> = std::result::Result<T, WorkerFailure>;

/// What went wrong while running a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerFailure {
    #[error(
        "Credentials are required to pull this image. Please set the \"INFERPORT_USERNAME\" and \"INFERPORT_API_KEY\" environment variables"
    )]
    CredentialsRequired,

    #[error("Failed to login into the registry \"{registry}\"\n{detail}")]
    AuthenticationFailed { registry: String, detail: String },

    #[error("Failed to pull the image \"{image}\"\n{detail}")]
    PullFailed { image: String, detail: String },

    #[error("Could not connect to the container engine\n{detail}")]
    EngineUnavailable { detail: String },

    #[error("Could not spawn a container\n{detail}")]
    SpawnFailed { detail: String },

    #[error("Service in container did not become ready in time ({timeout:?})")]
    ReadinessTimeout { timeout: Duration },

    /// The worker logged an error-level record.
    #[error("{message}")]
    Escalated { message: String },

    /// The worker answered with a structured error body.
    #[error("{detail}")]
    Remote { status: u16, detail: String },

    #[error("Unknown server error occurred ({detail})")]
    Transport { detail: String },

    #[error("container engine command failed: {detail}")]
    Engine { detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerFailure::CredentialsRequired
            | WorkerFailure::AuthenticationFailed { .. }
            | WorkerFailure::PullFailed { .. }
            | WorkerFailure::EngineUnavailable { .. }
            | WorkerFailure::SpawnFailed { .. }
            | WorkerFailure::ReadinessTimeout { .. }
            | WorkerFailure::Engine { .. } => ErrorKind::WorkerLifecycle,
            WorkerFailure::Escalated { .. } => ErrorKind::EscalatedRuntime,
            WorkerFailure::Remote { status: 422, .. } => ErrorKind::Validation,
            WorkerFailure::Remote { .. } => ErrorKind::Backend,
            WorkerFailure::Transport { .. } => ErrorKind::Transport,
            WorkerFailure::Io(_) | WorkerFailure::Json(_) => ErrorKind::Internal,
        }
    }
}

/// A worker failure tagged with the engine and image it happened in.
///
/// Renders as `[engine@image] message`.
#[derive(Debug, thiserror::Error)]
#[error("[{engine}@{image}] {failure}")]
pub struct WorkerError {
    engine: String,
    image: String,
    failure: WorkerFailure,
}

impl WorkerError {
    pub fn new(
        engine: impl Into<String>,
        image: impl Into<String>,
        failure: WorkerFailure,
    ) -> Self {
        Self {
            engine: engine.into(),
            image: image.into(),
            failure,
        }
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn failure(&self) -> &WorkerFailure {
        &self.failure
    }

    pub fn kind(&self) -> ErrorKind {
        self.failure.kind()
    }
}

impl From<WorkerError> for ApiError {
    fn from(err: WorkerError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        ApiError::new(kind, message).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_engine_and_image() {
        let err = WorkerError::new(
            "docker",
            "workers/izer:1.4",
            WorkerFailure::Escalated {
                message: "boom".into(),
            },
        );
        assert_eq!(err.to_string(), "[docker@workers/izer:1.4] boom");
        assert_eq!(err.kind(), ErrorKind::EscalatedRuntime);
    }

    #[test]
    fn remote_status_selects_kind() {
        let invalid = WorkerFailure::Remote {
            status: 422,
            detail: "bad".into(),
        };
        assert_eq!(invalid.kind(), ErrorKind::Validation);
        let failed = WorkerFailure::Remote {
            status: 500,
            detail: "bad".into(),
        };
        assert_eq!(failed.kind(), ErrorKind::Backend);
    }

    #[test]
    fn converts_to_api_error() {
        let err = WorkerError::new(
            "docker",
            "img",
            WorkerFailure::ReadinessTimeout {
                timeout: Duration::from_secs(2),
            },
        );
        let api: ApiError = err.into();
        assert_eq!(api.kind(), ErrorKind::WorkerLifecycle);
        assert!(api.message().starts_with("[docker@img] Service in container"));
    }
}
