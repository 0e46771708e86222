//! Host to worker path mapping.
//!
//! Model and network-config files are mounted read-only under
//! [`MODELS_DIR`], one mount per distinct file. Each distinct project
//! directory is mounted read-write under [`OUTPUT_DIR`], which becomes the
//! workspace of every job the worker sees.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use inferport_backends::{default_output_subdir, BuildBatch};
use tracing::{debug, warn};

use crate::engine::Mount;

pub const MODELS_DIR: &str = "/mnt/models";
pub const OUTPUT_DIR: &str = "/mnt/out";
/// Where the Direct protocol mounts the serialized batch.
pub const CONFIG_PATH: &str = "/mnt/config/verified.json";

/// Mounts for one batch and the path rewrite that goes with them.
#[derive(Debug, Clone, Default)]
pub struct MountPlan {
    mounts: Vec<Mount>,
    inputs: HashMap<PathBuf, PathBuf>,
}

impl MountPlan {
    pub fn for_batch(batch: &BuildBatch) -> std::io::Result<Self> {
        let mut plan = Self::default();
        let mut assigned = HashSet::new();
        for file in batch.input_files() {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "input".to_string());
            // Distinct files sharing a name get the first free numeric prefix.
            let mut internal_name = name.clone();
            let mut n = 0usize;
            while assigned.contains(&internal_name) {
                n += 1;
                internal_name = format!("{n}-{name}");
            }
            assigned.insert(internal_name.clone());
            let internal = Path::new(MODELS_DIR).join(internal_name);
            plan.mounts
                .push(Mount::read_only(std::path::absolute(&file)?, internal.clone()));
            plan.inputs.insert(file, internal);
        }
        for project in batch.projects() {
            let internal = Path::new(OUTPUT_DIR).join(&project.name);
            plan.mounts.push(Mount::read_write(
                std::path::absolute(project.project_dir())?,
                internal,
            ));
        }
        Ok(plan)
    }

    /// Add the read-only mount of a Direct-protocol config file.
    pub fn with_config(mut self, host_path: &Path) -> Self {
        self.mounts.push(Mount::read_only(host_path, CONFIG_PATH));
        self
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    pub fn into_mounts(self) -> Vec<Mount> {
        self.mounts
    }

    /// Worker path of a host input file.
    pub fn internal_path(&self, host_path: &Path) -> Option<&Path> {
        self.inputs.get(host_path).map(PathBuf::as_path)
    }

    /// The batch as the worker must see it.
    pub fn rewrite(&self, batch: &BuildBatch) -> BuildBatch {
        batch.map_jobs(|job| {
            let model = self
                .internal_path(job.model_file())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| job.model_file().to_path_buf());
            let network = job.extra_network_file().map(|path| {
                self.internal_path(path)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| path.to_path_buf())
            });
            job.relocated(model, network, PathBuf::from(OUTPUT_DIR))
        })
    }
}

/// Create every job's host output directory before a worker writes to it.
///
/// A directory created by the engine would belong to the engine's user.
/// Failures are reported and skipped.
pub fn create_output_dirs(batch: &BuildBatch) {
    for job in batch {
        let mut dir = job.project().output_path();
        if job.project().uses_default_out_dir() {
            if let Some(subdir) = default_output_subdir(job.backend_name()) {
                dir = dir.join(subdir);
            }
        }
        match std::fs::create_dir_all(&dir) {
            Ok(()) => debug!(path = %dir.display(), "created output directory"),
            Err(e) => warn!("Failure trying to create {}: {e}", dir.display()),
        }
    }
}
