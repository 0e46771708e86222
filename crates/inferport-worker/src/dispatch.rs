//! Routing verified batches to the right execution adapter.

use std::sync::Arc;

use tracing::info;

use inferport_backends::{
    ApiError, Backend, BackendApi, BackendError, BackendRegistry, BuildBatch, ExecutionKind,
    Operation, Protocol,
};

use crate::direct::DirectWorkerExecutor;
use crate::http::HttpWorkerClient;
use crate::orchestrator::Orchestrator;

/// The API that runs batches for `backend`.
pub fn adapter_for(backend: &Backend, orchestrator: &Orchestrator) -> Arc<dyn BackendApi> {
    match backend.kind() {
        ExecutionKind::Local(api) => Arc::clone(api),
        ExecutionKind::Isolated {
            protocol: Protocol::Http,
            image,
        } => Arc::new(HttpWorkerClient::new(orchestrator.clone(), image.clone())),
        ExecutionKind::Isolated {
            protocol: Protocol::Direct,
            image,
        } => Arc::new(DirectWorkerExecutor::new(orchestrator.clone(), image.clone())),
    }
}

/// The API for the backend registered as `name`, if any.
pub fn execution_adapter(
    registry: &BackendRegistry,
    name: &str,
    orchestrator: &Orchestrator,
) -> Option<Arc<dyn BackendApi>> {
    registry
        .get(name)
        .map(|backend| adapter_for(backend, orchestrator))
}

/// Run `op` on each batch in order, stopping at the first failure.
pub async fn dispatch_batches(
    registry: &BackendRegistry,
    orchestrator: &Orchestrator,
    batches: &[BuildBatch],
    op: Operation,
) -> Result<(), ApiError> {
    for batch in batches {
        let Some(name) = batch.backend_name() else {
            continue;
        };
        let adapter = execution_adapter(registry, name, orchestrator).ok_or_else(|| {
            BackendError::BackendNotFound {
                name: name.to_string(),
                available: registry.names(),
            }
        })?;
        info!(backend = name, jobs = batch.len(), "running {op}");
        adapter.invoke(op, batch).await?;
    }
    Ok(())
}
