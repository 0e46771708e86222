//! Backends served by a persistent HTTP worker.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use inferport_backends::{ApiError, BackendApi, BuildBatch, Operation, WorkerImage};

use crate::engine::ContainerSpec;
use crate::error::{EngineResult, WorkerError, WorkerFailure};
use crate::mounts::MountPlan;
use crate::orchestrator::{caller_env, container_name, Orchestrator};
use crate::probe::ReadinessProbe;
use crate::session::{SessionState, WorkerSession};

/// Error body a worker answers with.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Runs each batch by starting a worker, waiting for its HTTP service and
/// posting the batch to `/build` or `/check`.
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    orchestrator: Orchestrator,
    image: WorkerImage,
    client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new(orchestrator: Orchestrator, image: WorkerImage) -> Self {
        Self {
            orchestrator,
            image,
            client: reqwest::Client::new(),
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

        let mut session =
            WorkerSession::new(self.orchestrator.engine().clone(), self.image.name.clone());
        session.advance(SessionState::ImageReady);
        let outcome = self.exchange(&mut session, plan, op, &remote).await;
        if outcome.is_err() {
            session.dump_logs().await;
        }
        session
            .teardown(self.orchestrator.config().drain_join_timeout)
            .await;
        outcome.map_err(|failure| self.error(failure))
    }

    async fn exchange(
        &self,
        session: &mut WorkerSession,
        plan: MountPlan,
        op: Operation,
        remote: &BuildBatch,
    ) -> EngineResult<()> {
        let config = self.orchestrator.config();
        let spec = ContainerSpec {
            image: self.image.name.clone(),
            name: container_name(),
            mounts: plan.into_mounts(),
            env: caller_env(),
            publish: Some((config.host.clone(), config.service_port)),
            command: Vec::new(),
        };
        let id = session.spawn(&spec).await?;

        session.advance(SessionState::Probing);
        let engine = self.orchestrator.engine();
        let service_port = config.service_port;
        let port = ReadinessProbe::from_config(config)
            .wait(|| {
                let id = &id;
                async move { engine.host_port(id, service_port).await.ok().flatten() }
            })
            .await?;
        session.set_host_port(port);

        session.advance(SessionState::Active);
        session.start_drain().await?;
        self.post(port, op, remote).await
    }

    async fn post(&self, port: u16, op: Operation, batch: &BuildBatch) -> EngineResult<()> {
        let url = format!("http://{}:{port}/{op}", self.orchestrator.config().host);
        debug!(%url, "sending batch to worker");
        let response = self
            .client
            .post(&url)
            .json(batch)
            .send()
            .await
            .map_err(|e| WorkerFailure::Transport {
                detail: e.to_string(),
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await.unwrap_or_default();
        Err(match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(err) => WorkerFailure::Remote {
                status: status.as_u16(),
                detail: err.detail,
            },
            Err(_) => WorkerFailure::Transport {
                detail: format!("HTTP {status}"),
            },
        })
    }

    fn error(&self, failure: WorkerFailure) -> WorkerError {
        self.orchestrator.error(&self.image, failure)
    }
}

#[async_trait]
impl BackendApi for HttpWorkerClient {
    async fn build(&self, batch: &BuildBatch) -> Result<(), ApiError> {
        Ok(self.run(Operation::Build, batch).await?)
    }

    async fn check(&self, batch: &BuildBatch) -> Result<(), ApiError> {
        Ok(self.run(Operation::Check, batch).await?)
    }
}
