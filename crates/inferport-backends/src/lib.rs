//! Backend registry, selection, and build job verification for inferport.
//!
//! A backend is a pluggable code generator. It declares which
//! (hardware, runtime, firmware platform) combinations it serves and how it
//! is executed: in-process, or inside an isolated worker.
//!
//! # Flow
//!
//! A [`DeploymentPlan`] is verified against the target catalog and the
//! [`BackendRegistry`]: each enabled model is resolved, matched to a backend
//! (exact match first, then a relaxed match on runtime and firmware
//! platform) and grouped into one [`BuildBatch`] per backend. Batches are
//! then handed to the backend's [`BackendApi`].

pub mod api;
pub mod builtin;
pub mod error;
pub mod events;
pub mod extensions;
pub mod job;
pub mod kind;
pub mod manifest;
pub mod plan;
pub mod registry;
pub mod support;
pub mod validate;

// Re-exports for convenience.
pub use api::{BackendApi, Operation};
pub use builtin::{default_output_subdir, register_builtin, ModelArrayBackend};
pub use error::{ApiError, BackendError, ErrorKind, Result};
pub use extensions::{parse_extension_flags, validate_extensions};
pub use job::{BuildBatch, BuildJob, ProjectInfo};
pub use kind::{ExecutionKind, Protocol, WorkerImage};
pub use manifest::{register_manifests, BackendManifest, LocalImplementations};
pub use plan::{BackendChoice, DeploymentPlan, ModelConfig, ProjectConfig};
pub use registry::{Backend, BackendCapabilities, BackendRegistry};
pub use support::{MatchPhase, MinProjectTarget, SupportedBackend};
pub use validate::{check_accelerator_claims, verify_plan};
