//! Catalog, registry and logging setup shared by every command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use inferport_backends::{
    register_builtin, register_manifests, BackendApi, BackendRegistry, LocalImplementations,
    ModelArrayBackend,
};
use inferport_targets::parse::extend_catalog;
use inferport_targets::Catalog;

/// Environment variable naming a default backend manifest directory.
pub const BACKENDS_DIR_ENV: &str = "INFERPORT_BACKENDS_DIR";

/// Install the global subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "inferport=debug,inferport_backends=debug,inferport_worker=debug"
    } else {
        "inferport=info,inferport_backends=info,inferport_worker=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Everything a command needs to look up hardware and backends.
pub struct Context {
    pub catalog: Catalog,
    pub registry: BackendRegistry,
}

impl Context {
    /// Builtin catalog and backends, extended by user catalogs and manifests.
    pub fn load(catalogs: &[PathBuf], backends_dir: Option<&Path>) -> Result<Self> {
        let mut catalog = Catalog::builtin();
        for path in catalogs {
            let added = extend_catalog(&mut catalog, path)
                .with_context(|| format!("loading catalog {}", path.display()))?;
            debug!(path = %path.display(), added, "extended chip catalog");
        }

        let mut registry = BackendRegistry::new();
        register_builtin(&mut registry)?;

        let env_dir = std::env::var_os(BACKENDS_DIR_ENV).map(PathBuf::from);
        if let Some(dir) = backends_dir.map(Path::to_path_buf).or(env_dir) {
            let added = register_manifests(&mut registry, &dir, &local_implementations())
                .with_context(|| format!("loading backend manifests from {}", dir.display()))?;
            debug!(dir = %dir.display(), added, "registered backend manifests");
        }

        Ok(Self { catalog, registry })
    }
}

/// In-process code generators that `kind = "local"` manifests may name.
fn local_implementations() -> LocalImplementations {
    let mut locals = LocalImplementations::new();
    locals.insert(
        "model-array".to_string(),
        Arc::new(ModelArrayBackend) as Arc<dyn BackendApi>,
    );
    locals
}
