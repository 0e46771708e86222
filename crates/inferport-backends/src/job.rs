//! Verified build jobs and the batches sent to a backend.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use inferport_targets::ResolvedTarget;

use crate::error::{BackendError, Result};

/// Where a job's generated code goes: `workspace / name / out_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectInfo {
    pub name: String,
    pub workspace: PathBuf,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".")
}

impl ProjectInfo {
    pub fn new(
        name: impl Into<String>,
        workspace: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            workspace: workspace.into(),
            out_dir: out_dir.into(),
        }
    }

    /// The project directory, `workspace / name`.
    pub fn project_dir(&self) -> PathBuf {
        self.workspace.join(&self.name)
    }

    pub fn output_path(&self) -> PathBuf {
        self.project_dir().join(&self.out_dir)
    }

    /// Whether no explicit output directory was configured.
    pub fn uses_default_out_dir(&self) -> bool {
        self.out_dir == Path::new(".")
    }
}

/// One model to generate code for, fully verified.
///
/// Jobs are never mutated after verification; [`BuildJob::relocated`] makes
/// a copy with different paths (used when mounting into a worker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildJob {
    name: String,
    project: ProjectInfo,
    model_file: PathBuf,
    target: ResolvedTarget,
    backend_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extensions: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extra_network_file: Option<PathBuf>,
}

impl BuildJob {
    pub fn new(
        name: impl Into<String>,
        project: ProjectInfo,
        model_file: impl Into<PathBuf>,
        target: ResolvedTarget,
        backend_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            project,
            model_file: model_file.into(),
            target,
            backend_name: backend_name.into(),
            extensions: None,
            extra_network_file: None,
        }
    }

    pub fn with_extensions(mut self, extensions: Option<serde_json::Value>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_extra_network_file(mut self, path: Option<PathBuf>) -> Self {
        self.extra_network_file = path;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project(&self) -> &ProjectInfo {
        &self.project
    }

    pub fn model_file(&self) -> &Path {
        &self.model_file
    }

    pub fn target(&self) -> &ResolvedTarget {
        &self.target
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn extensions(&self) -> Option<&serde_json::Value> {
        self.extensions.as_ref()
    }

    pub fn extra_network_file(&self) -> Option<&Path> {
        self.extra_network_file.as_deref()
    }

    /// Copy of this job pointing at other model, network and workspace paths.
    pub fn relocated(
        &self,
        model_file: PathBuf,
        extra_network_file: Option<PathBuf>,
        workspace: PathBuf,
    ) -> Self {
        let mut job = self.clone();
        job.model_file = model_file;
        job.extra_network_file = extra_network_file;
        job.project.workspace = workspace;
        job
    }
}

/// Ordered jobs for one backend, unique by job name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildBatch {
    jobs: Vec<BuildJob>,
}

impl BuildBatch {
    pub fn new(jobs: Vec<BuildJob>) -> Result<Self> {
        let mut batch = Self::default();
        for job in jobs {
            batch.push(job)?;
        }
        Ok(batch)
    }

    /// Append a job, rejecting a name already in the batch.
    pub fn push(&mut self, job: BuildJob) -> Result<()> {
        if self.jobs.iter().any(|j| j.name == job.name) {
            return Err(BackendError::DuplicateJob { name: job.name });
        }
        self.jobs.push(job);
        Ok(())
    }

    pub fn jobs(&self) -> &[BuildJob] {
        &self.jobs
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildJob> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Backend of the first job (all jobs in a verified batch share it).
    pub fn backend_name(&self) -> Option<&str> {
        self.jobs.first().map(|j| j.backend_name())
    }

    /// Apply `f` to every job, keeping order. Used to rewrite paths.
    pub fn map_jobs(&self, f: impl FnMut(&BuildJob) -> BuildJob) -> Self {
        Self {
            jobs: self.jobs.iter().map(f).collect(),
        }
    }

    /// Distinct model and network-config files, in first-use order.
    pub fn input_files(&self) -> Vec<PathBuf> {
        let mut seen = BTreeSet::new();
        let mut files = Vec::new();
        for job in &self.jobs {
            let paths = std::iter::once(job.model_file()).chain(job.extra_network_file());
            for path in paths {
                if seen.insert(path.to_path_buf()) {
                    files.push(path.to_path_buf());
                }
            }
        }
        files
    }

    /// Distinct projects, in first-use order.
    pub fn projects(&self) -> Vec<&ProjectInfo> {
        let mut seen = BTreeSet::new();
        let mut projects = Vec::new();
        for job in &self.jobs {
            if seen.insert(job.project().project_dir()) {
                projects.push(job.project());
            }
        }
        projects
    }
}

impl<'a> IntoIterator for &'a BuildBatch {
    type Item = &'a BuildJob;
    type IntoIter = std::slice::Iter<'a, BuildJob>;

    fn into_iter(self) -> Self::IntoIter {
        self.jobs.iter()
    }
}
