//! Shared state for running isolated workers.

use std::sync::Arc;

use inferport_backends::WorkerImage;

use crate::config::{OrchestratorConfig, RegistryCredentials};
use crate::docker::DockerCli;
use crate::engine::ContainerEngine;
use crate::error::{WorkerError, WorkerFailure};
use crate::image::ensure_image;

/// Container engine, settings and credentials used by every worker client.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn ContainerEngine>,
    config: OrchestratorConfig,
    credentials: Option<RegistryCredentials>,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: OrchestratorConfig) -> Self {
        Self {
            engine,
            config,
            credentials: None,
        }
    }

    /// Docker CLI, settings and credentials taken from the environment.
    pub fn from_env() -> Self {
        let config = OrchestratorConfig::from_env();
        let engine = Arc::new(DockerCli::new(config.engine.clone()));
        Self::new(engine, config).with_credentials(RegistryCredentials::from_env())
    }

    pub fn with_credentials(mut self, credentials: Option<RegistryCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Attach engine and image context to a failure.
    pub fn error(&self, image: &WorkerImage, failure: WorkerFailure) -> WorkerError {
        WorkerError::new(self.engine.name(), image.name.as_str(), failure)
    }

    /// Pull `image` if it is not cached yet.
    pub async fn prepare_image(&self, image: &WorkerImage) -> Result<(), WorkerError> {
        ensure_image(self.engine.as_ref(), image, self.credentials.as_ref())
            .await
            .map_err(|failure| self.error(image, failure))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// A fresh container name.
pub fn container_name() -> String {
    format!("inferport-{}", uuid::Uuid::new_v4())
}

/// Environment telling the worker which host user owns generated files.
pub fn caller_env() -> Vec<(String, String)> {
    let (uid, gid) = caller_ids();
    vec![
        ("HOST_UID".to_string(), uid.to_string()),
        ("HOST_GID".to_string(), gid.to_string()),
    ]
}

#[cfg(unix)]
fn caller_ids() -> (u32, u32) {
    (nix::unistd::getuid().as_raw(), nix::unistd::getgid().as_raw())
}

#[cfg(not(unix))]
fn caller_ids() -> (u32, u32) {
    (1000, 1000)
}
