//! Backends run as one-shot worker invocations.

use std::io::Write;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use inferport_backends::{ApiError, BackendApi, BuildBatch, Operation, WorkerImage};

use crate::engine::ContainerSpec;
use crate::error::{EngineResult, WorkerError, WorkerFailure};
use crate::mounts::{create_output_dirs, MountPlan};
use crate::orchestrator::{caller_env, container_name, Orchestrator};
use crate::relay::relay_until_error;
use crate::session::{SessionState, WorkerSession};

/// Runs each batch by starting a worker with the operation as its command
/// and the batch in a mounted config file.
///
/// Success means the worker's output ended without an error-level record;
/// its exit status is not consulted.
#[derive(Debug, Clone)]
pub struct DirectWorkerExecutor {
    orchestrator: Orchestrator,
    image: WorkerImage,
}

impl DirectWorkerExecutor {
    pub fn new(orchestrator: Orchestrator, image: WorkerImage) -> Self {
        Self {
            orchestrator,
            image,
        }
    }

    pub fn image(&self) -> &WorkerImage {
        &self.image
    }

    #[instrument(skip(self, batch), fields(image = %self.image.name, jobs = batch.len()))]
    pub async fn run(&self, op: Operation, batch: &BuildBatch) -> Result<(), WorkerError> {
        self.orchestrator.prepare_image(&self.image).await?;

        let plan = MountPlan::for_batch(batch).map_err(|e| self.error(e.into()))?;
        let remote = plan.rewrite(batch);
        // Removed when dropped, on every path out of this function.
        let config = self
            .write_config(&remote)
            .map_err(|failure| self.error(failure))?;
        create_output_dirs(batch);

        let mut session =
            WorkerSession::new(self.orchestrator.engine().clone(), self.image.name.clone());
        session.advance(SessionState::ImageReady);
        let spec = ContainerSpec {
            image: self.image.name.clone(),
            name: container_name(),
            mounts: plan.with_config(config.path()).into_mounts(),
            env: caller_env(),
            publish: None,
            command: vec![op.as_str().to_string()],
        };
        let outcome = self.execute(&mut session, &spec).await;
        if let Err(failure) = &outcome {
            if !matches!(failure, WorkerFailure::Escalated { .. }) {
                session.dump_logs().await;
            }
        }
        session
            .teardown(self.orchestrator.config().drain_join_timeout)
            .await;
        if let Err(e) = config.close() {
            warn!("failed to remove worker config file: {e}");
        }
        outcome.map_err(|failure| self.error(failure))
    }

    fn write_config(&self, remote: &BuildBatch) -> EngineResult<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("inferport-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer(&mut file, remote)?;
        file.flush()?;
        debug!(path = %file.path().display(), "wrote worker config");
        Ok(file)
    }

    async fn execute(&self, session: &mut WorkerSession, spec: &ContainerSpec) -> EngineResult<()> {
        let id = session.spawn(spec).await?;
        session.advance(SessionState::Active);
        let mut stream = self.orchestrator.engine().log_stream(&id).await?;
        match relay_until_error(&mut stream, &self.image.name).await {
            Some(message) => Err(WorkerFailure::Escalated { message }),
            None => Ok(()),
        }
    }

    fn error(&self, failure: WorkerFailure) -> WorkerError {
        self.orchestrator.error(&self.image, failure)
    }
}

#[async_trait]
impl BackendApi for DirectWorkerExecutor {
    async fn build(&self, batch: &BuildBatch) -> Result<(), ApiError> {
        Ok(self.run(Operation::Build, batch).await?)
    }

    async fn check(&self, batch: &BuildBatch) -> Result<(), ApiError> {
        Ok(self.run(Operation::Check, batch).await?)
    }
}
