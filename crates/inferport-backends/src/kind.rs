//! How a backend is executed.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::BackendApi;

/// Wire protocol spoken by an isolated worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// A long-running HTTP server inside the worker.
    Http,
    /// A one-shot process driven by command argument and config file.
    Direct,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Direct => "direct",
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "direct" => Ok(Protocol::Direct),
            other => Err(other.to_string()),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container image a worker runs from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkerImage {
    /// Full image reference (registry, repository and tag).
    pub name: String,
    /// Private images need registry credentials to pull.
    #[serde(default)]
    pub requires_credentials: bool,
}

impl WorkerImage {
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_credentials: false,
        }
    }

    pub fn private(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_credentials: true,
        }
    }
}

/// Execution kind of a backend.
#[derive(Clone)]
pub enum ExecutionKind {
    /// Runs inside the host process.
    Local(Arc<dyn BackendApi>),
    /// Runs inside an isolated worker started from `image`.
    Isolated { protocol: Protocol, image: WorkerImage },
}

impl ExecutionKind {
    pub fn local(api: impl BackendApi + 'static) -> Self {
        ExecutionKind::Local(Arc::new(api))
    }

    pub fn isolated(protocol: Protocol, image: WorkerImage) -> Self {
        ExecutionKind::Isolated { protocol, image }
    }

    /// Short label used in listings, e.g. `local` or `container/http`.
    pub fn label(&self) -> String {
        match self {
            ExecutionKind::Local(_) => "local".into(),
            ExecutionKind::Isolated { protocol, .. } => format!("container/{protocol}"),
        }
    }
}

impl std::fmt::Debug for ExecutionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionKind::Local(_) => f.write_str("Local(..)"),
            ExecutionKind::Isolated { protocol, image } => f
                .debug_struct("Isolated")
                .field("protocol", protocol)
                .field("image", image)
                .finish(),
        }
    }
}
