//! Isolated worker orchestration for inferport.
//!
//! Backends that cannot run in the host process are packaged as container
//! images. This crate runs a [`BuildBatch`](inferport_backends::BuildBatch)
//! inside such a worker and makes it look like any other
//! [`BackendApi`](inferport_backends::BackendApi) call:
//!
//! - [`HttpWorkerClient`] starts a worker serving HTTP, waits for `/health`,
//!   posts the batch to `/build` or `/check` and relays the worker's log
//!   stream from a background task.
//! - [`DirectWorkerExecutor`] starts a one-shot worker with the operation as
//!   its command and the batch in a mounted file, relaying its output until
//!   it ends or reports an error.
//!
//! Either way the container is stopped and removed before the call returns.
//! [`dispatch_batches`] picks the right adapter for each verified batch, and
//! [`runtime`] is the worker side of both protocols.

pub mod config;
pub mod direct;
pub mod dispatch;
pub mod docker;
pub mod engine;
pub mod error;
pub mod http;
pub mod image;
pub mod mounts;
pub mod orchestrator;
pub mod probe;
pub mod relay;
pub mod runtime;
pub mod session;

// Re-exports for convenience.
pub use config::{OrchestratorConfig, RegistryCredentials};
pub use direct::DirectWorkerExecutor;
pub use dispatch::{adapter_for, dispatch_batches, execution_adapter};
pub use docker::DockerCli;
pub use engine::{ContainerEngine, ContainerId, ContainerSpec, LogStream, Mount};
pub use error::{EngineResult, Result, WorkerError, WorkerFailure};
pub use http::HttpWorkerClient;
pub use image::ensure_image;
pub use mounts::{MountPlan, CONFIG_PATH, MODELS_DIR, OUTPUT_DIR};
pub use orchestrator::Orchestrator;
pub use probe::ReadinessProbe;
pub use relay::{LogDrain, LogRecord, Severity};
pub use session::{SessionState, WorkerSession};
