//! Backend manifests: `.backend.toml` files that register extra backends.
//!
//! ```toml
//! name = "tflm-remote"
//! kind = "container"
//! protocol = "http"
//! image = "ghcr.io/example/tflm-worker:1.2"
//! runtimes = ["tflm"]
//! firmware-platforms = ["msdk", "zephyr"]
//! extensions-schema = "tflm.schema.json"
//!
//! [[targets]]
//! hardware = { kind = "generic", family = "cortex-m4" }
//! runtime = "tflm"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use inferport_targets::BackendTarget;

use crate::api::BackendApi;
use crate::error::{BackendError, Result};
use crate::kind::{ExecutionKind, Protocol, WorkerImage};
use crate::registry::{Backend, BackendRegistry};
use crate::support::SupportedBackend;

/// File suffix of backend manifests.
pub const MANIFEST_SUFFIX: &str = ".backend.toml";

/// In-process implementations available to `kind = "local"` manifests.
pub type LocalImplementations = HashMap<String, Arc<dyn BackendApi>>;

/// A parsed, not yet validated, backend manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackendManifest {
    pub name: String,
    /// `local` or `container`.
    pub kind: String,
    /// `http` or `direct`; container backends only.
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub requires_credentials: bool,
    #[serde(default)]
    pub runtimes: Vec<String>,
    #[serde(default)]
    pub firmware_platforms: Vec<String>,
    #[serde(default)]
    pub targets: Vec<BackendTarget>,
    /// JSON schema file for extensions, relative to the manifest.
    #[serde(default)]
    pub extensions_schema: Option<PathBuf>,
}

impl BackendManifest {
    /// Build the execution kind this manifest asks for.
    pub fn execution_kind(&self, locals: &LocalImplementations) -> Result<ExecutionKind> {
        match self.kind.trim().to_ascii_lowercase().as_str() {
            "local" => locals
                .get(&self.name)
                .cloned()
                .map(ExecutionKind::Local)
                .ok_or_else(|| BackendError::InvalidManifest {
                    detail: format!("no in-process implementation for local backend {}", self.name),
                }),
            "container" => {
                let Some(protocol) = &self.protocol else {
                    return Err(BackendError::InvalidManifest {
                        detail: format!("container backend {} does not name a protocol", self.name),
                    });
                };
                let protocol: Protocol =
                    protocol
                        .parse()
                        .map_err(|protocol| BackendError::UnsupportedProtocol {
                            backend: self.name.clone(),
                            protocol,
                        })?;
                let Some(image) = &self.image else {
                    return Err(BackendError::InvalidManifest {
                        detail: format!("container backend {} does not name an image", self.name),
                    });
                };
                Ok(ExecutionKind::isolated(
                    protocol,
                    WorkerImage {
                        name: image.clone(),
                        requires_credentials: self.requires_credentials,
                    },
                ))
            }
            other => Err(BackendError::UnsupportedBackendKind {
                backend: self.name.clone(),
                kind: other.to_string(),
            }),
        }
    }

    /// Turn the manifest into a registrable backend.
    ///
    /// `base_dir` anchors a relative extension schema path.
    pub fn into_backend(self, base_dir: &Path, locals: &LocalImplementations) -> Result<Backend> {
        let kind = self.execution_kind(locals)?;
        let schema = match &self.extensions_schema {
            Some(path) => {
                let path = base_dir.join(path);
                if !path.exists() {
                    return Err(BackendError::NotFound { path });
                }
                let text = std::fs::read_to_string(&path)?;
                Some(serde_json::from_str::<serde_json::Value>(&text)?)
            }
            None => None,
        };
        let support = SupportedBackend::new(
            &self.name,
            self.targets,
            self.runtimes,
            self.firmware_platforms,
        )?;
        let backend = Backend::new(support, kind);
        Ok(match schema {
            Some(schema) => backend.with_extension_schema(schema),
            None => backend,
        })
    }
}

/// Load a manifest from a `.backend.toml` file.
pub fn load_backend_manifest(path: &Path) -> Result<BackendManifest> {
    if !path.exists() {
        return Err(BackendError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_backend_manifest(&content)
}

/// Parse a manifest from a TOML string.
pub fn parse_backend_manifest(toml_str: &str) -> Result<BackendManifest> {
    let manifest: BackendManifest = toml::from_str(toml_str)?;
    Ok(manifest)
}

/// Discover all `.backend.toml` files directly inside `dir`, sorted by name.
pub fn discover_backend_manifests(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut manifests = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(name) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(MANIFEST_SUFFIX))
        {
            manifests.push((name.to_string(), path.clone()));
        }
    }
    manifests.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(manifests)
}

/// Register every manifest found in `dir`. Returns how many were added.
pub fn register_manifests(
    registry: &mut BackendRegistry,
    dir: &Path,
    locals: &LocalImplementations,
) -> Result<usize> {
    let mut added = 0;
    for (_, path) in discover_backend_manifests(dir)? {
        let manifest = load_backend_manifest(&path)?;
        registry.register(manifest.into_backend(dir, locals)?)?;
        added += 1;
    }
    Ok(added)
}
