//! Deployment plans: the user's description of what to build.
//!
//! A plan names one chip and lists projects (one per core) with the models
//! each should host. It is the unverified input to
//! [`verify_plan`](crate::validate::verify_plan).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use inferport_targets::canonical_name;

use crate::error::{BackendError, Result};

/// A user-chosen backend and its extension options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackendChoice {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

/// One model to deploy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModelConfig {
    /// Unique name of this configuration.
    pub name: String,
    /// Model file.
    pub model: PathBuf,
    /// Additional network description some backends need.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_config: Option<PathBuf>,
    /// Output directory relative to the project directory.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    /// Core to run on. Defaults to the project's core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendChoice>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A firmware project hosted on one core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    pub name: String,
    pub core: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_platform: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

/// Everything to deploy on one chip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeploymentPlan {
    pub soc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_enabled() -> bool {
    true
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, model: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            network_config: None,
            out_dir: default_out_dir(),
            core: None,
            accelerator: None,
            runtime: None,
            backend: None,
            enabled: true,
        }
    }

    /// The core this model targets: its own, else the project's.
    pub fn core_in<'a>(&'a self, project: &'a ProjectConfig) -> &'a str {
        self.core.as_deref().unwrap_or(&project.core)
    }
}

impl DeploymentPlan {
    /// Enabled models of enabled projects, in file order.
    pub fn iter_enabled(&self) -> impl Iterator<Item = (&ProjectConfig, &ModelConfig)> {
        self.projects
            .iter()
            .filter(|p| p.enabled)
            .flat_map(|p| p.models.iter().filter(|m| m.enabled).map(move |m| (p, m)))
    }

    /// Whether some project is hosted on `core`.
    pub fn has_project_for(&self, core: &str) -> bool {
        let core = canonical_name(core);
        self.projects.iter().any(|p| canonical_name(&p.core) == core)
    }

    /// Keep only projects on `core`.
    pub fn restrict_to_core(&mut self, core: &str) {
        let core = canonical_name(core);
        self.projects.retain(|p| canonical_name(&p.core) == core);
    }
}

/// Load a plan from an `inferport.toml` file.
pub fn load_plan_toml(path: &Path) -> Result<DeploymentPlan> {
    if !path.exists() {
        return Err(BackendError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_plan_toml(&content)
}

/// Parse a plan from a TOML string.
pub fn parse_plan_toml(toml_str: &str) -> Result<DeploymentPlan> {
    let plan: DeploymentPlan = toml::from_str(toml_str)?;
    Ok(plan)
}
