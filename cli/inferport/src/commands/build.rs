//! `inferport build` / `inferport check`: verify a deployment plan and run it.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use clap::Args;
use serde_json::Value;

use inferport_backends::plan::load_plan_toml;
use inferport_backends::{
    parse_extension_flags, verify_plan, BackendChoice, BuildBatch, DeploymentPlan, ModelConfig,
    Operation, ProjectConfig,
};
use inferport_targets::UserTarget;
use inferport_worker::{dispatch_batches, Orchestrator};

use crate::context::Context;

/// Plan file looked up in the working directory when `--config` is absent.
pub const DEFAULT_PLAN: &str = "inferport.toml";

#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Deployment plan (default: inferport.toml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,
    /// Deploy a single model to <soc>[<package>].<core>[.<accelerator>]
    #[arg(long, requires = "model", conflicts_with = "config")]
    pub target: Option<UserTarget>,
    /// Model file for --target
    #[arg(long, requires = "target")]
    pub model: Option<PathBuf>,
    /// Backend to use instead of the automatic choice
    #[arg(long, requires = "target")]
    pub backend: Option<String>,
    /// Inference runtime (e.g. tflm)
    #[arg(long, requires = "target")]
    pub runtime: Option<String>,
    /// Firmware platform of the project (e.g. msdk, zephyr)
    #[arg(long, requires = "target")]
    pub firmware_platform: Option<String>,
    /// Network description file some backends need
    #[arg(long, requires = "target")]
    pub network_config: Option<PathBuf>,
    /// Backend extension option (repeatable)
    #[arg(long = "extension", short = 'e', value_name = "KEY=VALUE", requires = "backend")]
    pub extensions: Vec<String>,
    /// Workspace the projects are generated in
    #[arg(long)]
    pub output_path: Option<PathBuf>,
    /// Only deploy projects hosted on this core
    #[arg(long)]
    pub only_core: Option<String>,
}

pub fn run(ctx: &Context, args: &BuildArgs, op: Operation) -> Result<()> {
    let cwd = std::env::current_dir().context("reading the working directory")?;
    let (mut plan, workspace) = match &args.target {
        Some(target) => plan_from_flags(target, args, &cwd)?,
        None => {
            let config = args.config.clone().unwrap_or_else(|| cwd.join(DEFAULT_PLAN));
            let plan = load_plan_toml(&config)
                .with_context(|| format!("loading plan {}", config.display()))?;
            let workspace = match &args.output_path {
                Some(path) => path.clone(),
                None => plan_workspace(&config),
            };
            (plan, workspace)
        }
    };

    if let Some(core) = &args.only_core {
        if !plan.has_project_for(core) {
            bail!("no project in the plan is hosted on core '{core}'");
        }
        plan.restrict_to_core(core);
    }

    let batches = verify_plan(&ctx.catalog, &ctx.registry, &plan, &workspace)?;
    if batches.is_empty() {
        println!("Nothing to {op}: no enabled models.");
        return Ok(());
    }
    print_batches(&batches);

    let orchestrator = Orchestrator::from_env();
    let runtime = tokio::runtime::Runtime::new().context("starting the async runtime")?;
    runtime.block_on(dispatch_batches(&ctx.registry, &orchestrator, &batches, op))?;

    let models: usize = batches.iter().map(BuildBatch::len).sum();
    println!();
    println!("{op} finished for {models} model(s).");
    Ok(())
}

/// Directory holding the plan file; projects are generated next to it.
fn plan_workspace(config: &Path) -> PathBuf {
    match config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// A one-project, one-model plan built from `--target` and friends.
///
/// Relative paths are taken from `cwd`, the workspace defaults to it.
pub fn plan_from_flags(
    target: &UserTarget,
    args: &BuildArgs,
    cwd: &Path,
) -> Result<(DeploymentPlan, PathBuf)> {
    let Some(model) = &args.model else {
        bail!("--target needs a --model to deploy");
    };
    let name = model
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("model")
        .to_string();

    let mut config = ModelConfig::new(name, cwd.join(model));
    config.network_config = args.network_config.as_ref().map(|p| cwd.join(p));
    config.accelerator = target.accelerator.clone();
    config.runtime = args.runtime.clone();
    if let Some(backend) = &args.backend {
        let extensions = parse_extension_flags(&args.extensions)?;
        config.backend = Some(BackendChoice {
            name: backend.clone(),
            extensions: (!extensions.is_empty()).then(|| Value::Object(extensions)),
        });
    } else if !args.extensions.is_empty() {
        bail!("--extension needs an explicit --backend");
    }

    let plan = DeploymentPlan {
        soc: target.soc.clone(),
        package: target.package.clone(),
        projects: vec![ProjectConfig {
            name: target.core.to_lowercase(),
            core: target.core.clone(),
            firmware_platform: args.firmware_platform.clone(),
            enabled: true,
            models: vec![config],
        }],
    };
    let workspace = match &args.output_path {
        Some(path) => cwd.join(path),
        None => cwd.to_path_buf(),
    };
    Ok((plan, workspace))
}

fn print_batches(batches: &[BuildBatch]) {
    for batch in batches {
        let backend = batch.backend_name().unwrap_or("-");
        println!("Backend {backend}:");
        for job in batch {
            println!(
                "  {:<20} {:<28} -> {}",
                job.name(),
                job.target().to_string(),
                job.project().output_path().display()
            );
        }
    }
}
