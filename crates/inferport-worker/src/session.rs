//! Lifetime of one worker container.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::engine::{ContainerEngine, ContainerId, ContainerSpec};
use crate::error::EngineResult;
use crate::relay::LogDrain;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    ImageReady,
    Spawned,
    Probing,
    Active,
    Draining,
    Terminated,
}

/// A worker container owned by one dispatch call.
///
/// [`WorkerSession::teardown`] stops and removes the container and joins the
/// log drain. A session dropped without teardown still has its container
/// removed in the background.
pub struct WorkerSession {
    engine: Arc<dyn ContainerEngine>,
    image: String,
    state: SessionState,
    container: Option<ContainerId>,
    host_port: Option<u16>,
    drain: Option<LogDrain>,
}

impl WorkerSession {
    pub fn new(engine: Arc<dyn ContainerEngine>, image: impl Into<String>) -> Self {
        Self {
            engine,
            image: image.into(),
            state: SessionState::Created,
            container: None,
            host_port: None,
            drain: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn container(&self) -> Option<&ContainerId> {
        self.container.as_ref()
    }

    pub fn host_port(&self) -> Option<u16> {
        self.host_port
    }

    pub fn advance(&mut self, state: SessionState) {
        trace!(image = %self.image, from = ?self.state, to = ?state, "worker session");
        self.state = state;
    }

    pub async fn spawn(&mut self, spec: &ContainerSpec) -> EngineResult<ContainerId> {
        let id = self.engine.spawn(spec).await?;
        debug!(image = %self.image, container = %id, "spawned worker");
        self.container = Some(id.clone());
        self.advance(SessionState::Spawned);
        Ok(id)
    }

    pub fn set_host_port(&mut self, port: u16) {
        self.host_port = Some(port);
    }

    /// Relay the container's output in the background until teardown.
    pub async fn start_drain(&mut self) -> EngineResult<()> {
        let Some(id) = &self.container else {
            return Ok(());
        };
        let stream = self.engine.log_stream(id).await?;
        self.drain = Some(LogDrain::spawn(stream, self.image.clone()));
        Ok(())
    }

    /// Write the container's captured output at debug level.
    pub async fn dump_logs(&self) {
        let Some(id) = &self.container else {
            return;
        };
        match self.engine.logs(id).await {
            Ok(logs) => debug!("Container logs:\n\n{logs}"),
            Err(e) => debug!("could not read container logs: {e}"),
        }
    }

    /// Stop and remove the container, then join the drain task.
    ///
    /// Failures are logged; teardown never fails.
    pub async fn teardown(&mut self, drain_join_timeout: Duration) {
        self.advance(SessionState::Draining);
        if let Some(id) = self.container.take() {
            if let Err(e) = self.engine.stop(&id).await {
                warn!(container = %id, "failed to stop worker: {e}");
            }
            if let Err(e) = self.engine.remove(&id).await {
                warn!(container = %id, "failed to remove worker: {e}");
            }
        }
        if let Some(drain) = self.drain.take() {
            drain.stop(drain_join_timeout).await;
        }
        self.advance(SessionState::Terminated);
    }
}

impl Drop for WorkerSession {
    fn drop(&mut self) {
        let Some(id) = self.container.take() else {
            return;
        };
        warn!(container = %id, "worker session dropped before teardown, removing container");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let engine = self.engine.clone();
            handle.spawn(async move {
                if let Err(e) = engine.remove(&id).await {
                    warn!(container = %id, "failed to remove worker: {e}");
                }
            });
        }
    }
}
