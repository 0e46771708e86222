//! The set of registered backends.
//!
//! A [`BackendRegistry`] is built once at startup and then passed by
//! reference to selection and dispatch; it is never mutated afterwards.

use serde::Serialize;
use tracing::debug;

use inferport_targets::{BackendTarget, ResolvedTarget};

use crate::error::{BackendError, Result};
use crate::kind::ExecutionKind;
use crate::support::SupportedBackend;

/// A registered backend: what it supports and how it runs.
#[derive(Debug, Clone)]
pub struct Backend {
    support: SupportedBackend,
    kind: ExecutionKind,
    extension_schema: Option<serde_json::Value>,
}

impl Backend {
    pub fn new(support: SupportedBackend, kind: ExecutionKind) -> Self {
        Self {
            support,
            kind,
            extension_schema: None,
        }
    }

    /// Attach a JSON schema describing accepted extension options.
    pub fn with_extension_schema(mut self, schema: serde_json::Value) -> Self {
        self.extension_schema = Some(schema);
        self
    }

    pub fn name(&self) -> &str {
        &self.support.name
    }

    pub fn support(&self) -> &SupportedBackend {
        &self.support
    }

    pub fn kind(&self) -> &ExecutionKind {
        &self.kind
    }

    pub fn extension_schema(&self) -> Option<&serde_json::Value> {
        self.extension_schema.as_ref()
    }
}

/// Per-backend answer to a capability query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackendCapabilities {
    pub name: String,
    pub kind: String,
    pub targets: Vec<BackendTarget>,
    pub runtimes: Vec<String>,
    pub firmware_platforms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

/// Registered backends, in registration order.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: Vec<Backend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend. Registering a name twice is an error; nothing is overwritten.
    pub fn register(&mut self, backend: Backend) -> Result<()> {
        if self.get(backend.name()).is_some() {
            return Err(BackendError::AlreadyRegistered {
                name: backend.name().to_string(),
            });
        }
        debug!(backend = backend.name(), kind = %backend.kind().label(), "registered backend");
        self.backends.push(backend);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Backend> {
        self.backends.iter().find(|b| b.name() == name)
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.backends.iter()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Pick a backend able to serve `target`.
    ///
    /// All capable backends are collected in registration order and the last
    /// one wins. The choice is deterministic but carries no ranking.
    pub fn find_backend(&self, target: &ResolvedTarget) -> Option<&str> {
        let capable: Vec<&Backend> = self
            .backends
            .iter()
            .filter(|b| b.support().can_support(target))
            .collect();
        if capable.len() > 1 {
            debug!(
                target = %target,
                candidates = ?capable.iter().map(|b| b.name()).collect::<Vec<_>>(),
                "several backends can serve target, taking the last registered"
            );
        }
        capable.last().map(|b| b.name())
    }

    /// Capability listing of every backend.
    pub fn capabilities(&self) -> Vec<BackendCapabilities> {
        self.backends
            .iter()
            .map(|b| BackendCapabilities {
                name: b.name().to_string(),
                kind: b.kind().label(),
                targets: b.support().targets.clone(),
                runtimes: b.support().runtimes.clone(),
                firmware_platforms: b.support().firmware_platforms.clone(),
                extensions: b.extension_schema().cloned(),
            })
            .collect()
    }
}
