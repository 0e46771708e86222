//! Backends shipped with inferport.
//!
//! - `izer`: CNN accelerator code generation, run in a private worker image
//!   over the direct protocol.
//! - `tflm`: embeds a TensorFlow Lite model as a C array for TFLM; runs
//!   in-process.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use inferport_targets::{BackendTarget, HardwareSpec};

use crate::api::BackendApi;
use crate::error::{ApiError, Result};
use crate::events::file_created;
use crate::job::{BuildBatch, BuildJob};
use crate::kind::{ExecutionKind, Protocol, WorkerImage};
use crate::registry::{Backend, BackendRegistry};
use crate::support::SupportedBackend;

/// Worker image of the `izer` backend.
pub const IZER_IMAGE: &str = "registry.inferport.dev/workers/izer:1.4";

/// Subdirectory used by `tflm` when a job has no explicit output directory.
pub const TFLM_DEFAULT_SUBDIR: &str = "src/inferport_tflm";

/// Subdirectory used by `izer` when a job has no explicit output directory.
pub const IZER_DEFAULT_SUBDIR: &str = "src/inferport_cnn";

/// Register every built-in backend.
pub fn register_builtin(registry: &mut BackendRegistry) -> Result<()> {
    registry.register(izer()?)?;
    registry.register(tflm()?)?;
    Ok(())
}

/// Output subdirectory a built-in backend writes to when `out-dir` is `.`.
pub fn default_output_subdir(backend: &str) -> Option<&'static str> {
    match backend {
        "izer" => Some(IZER_DEFAULT_SUBDIR),
        "tflm" => Some(TFLM_DEFAULT_SUBDIR),
        _ => None,
    }
}

fn izer() -> Result<Backend> {
    let mut targets = Vec::new();
    for soc in ["MAX78000", "MAX78002"] {
        for core in ["CM4", "RV"] {
            targets.push(BackendTarget::new(
                HardwareSpec::explicit(soc, core, Some("CNN")),
                None,
                Some("MSDK"),
            ));
        }
    }
    let support = SupportedBackend::new("izer", targets, Vec::new(), vec!["MSDK".into()])?;
    let kind = ExecutionKind::isolated(Protocol::Direct, WorkerImage::private(IZER_IMAGE));
    Ok(Backend::new(support, kind).with_extension_schema(json!({
        "properties": {
            "avg-pool-rounding": {"type": "boolean", "default": true, "description": "Round average pooling results"},
            "clock-divider": {"type": "integer", "default": 1, "description": "Clock divider for the CNN accelerator"},
            "compact-data": {"type": "boolean", "default": false, "description": "Store sample data compactly"},
            "fifo": {"type": "boolean", "default": true, "description": "Stream layer data through a FIFO"},
            "input-shape": {"anyOf": [{"type": "string"}, {"type": "null"}], "default": null, "description": "Sample input shape, e.g. 3,32,32"},
            "pipeline": {"type": "boolean", "default": true, "description": "Enable the CNN pipeline"},
            "pll": {"type": "boolean", "default": false, "description": "Clock the CNN from the PLL"},
            "prefix": {"anyOf": [{"type": "string"}, {"type": "null"}], "default": null, "description": "Generated test name prefix"}
        },
        "additionalProperties": false
    })))
}

fn tflm() -> Result<Backend> {
    let targets = ["CORTEX-M4", "CORTEX-M33", "CORTEX-M7"]
        .into_iter()
        .map(|family| BackendTarget::new(HardwareSpec::generic(family, None), Some("TFLM"), None))
        .collect();
    let support = SupportedBackend::new(
        "tflm",
        targets,
        vec!["TFLM".into()],
        vec!["MSDK".into(), "ZEPHYR".into()],
    )?;
    Ok(Backend::new(support, ExecutionKind::local(ModelArrayBackend))
        .with_extension_schema(json!({
            "properties": {
                "section": {"anyOf": [{"type": "string"}, {"type": "null"}], "default": null, "description": "Memory section for data"},
                "symbol": {"anyOf": [{"type": "string"}, {"type": "null"}], "default": null, "description": "C symbol used for the data array and file names"}
            },
            "additionalProperties": false
        })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ModelArrayOptions {
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
}

/// In-process TFLM backend: writes the model bytes as a C array.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelArrayBackend;

struct PlannedOutput {
    symbol: String,
    section: Option<String>,
    build_dir: PathBuf,
    report_dir: PathBuf,
}

impl ModelArrayBackend {
    fn plan(
        job: &BuildJob,
        used: &mut HashSet<String>,
    ) -> std::result::Result<PlannedOutput, ApiError> {
        let options: ModelArrayOptions = match job.extensions() {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                ApiError::backend(format!(
                    "extensions of {} are not valid tflm options: {e}",
                    job.name()
                ))
            })?,
            None => ModelArrayOptions::default(),
        };

        let project = job.project();
        let (build_dir, report_dir) = if project.uses_default_out_dir() {
            (
                project.output_path().join(TFLM_DEFAULT_SUBDIR),
                PathBuf::from(&project.name).join(TFLM_DEFAULT_SUBDIR),
            )
        } else {
            (project.output_path(), project.out_dir.clone())
        };

        let symbol = to_c_identifier(options.symbol.as_deref().unwrap_or(job.name()));
        if !used.insert(symbol.clone()) {
            return Err(ApiError::backend(format!("Duplicate model symbol \"{symbol}\" found")));
        }

        Ok(PlannedOutput {
            symbol,
            section: options.section,
            build_dir,
            report_dir,
        })
    }
}

#[async_trait]
impl BackendApi for ModelArrayBackend {
    async fn build(&self, batch: &BuildBatch) -> std::result::Result<(), ApiError> {
        let mut used = HashSet::new();
        for job in batch {
            let out = Self::plan(job, &mut used)?;
            let model = tokio::fs::read(job.model_file()).await.map_err(|e| {
                ApiError::backend(format!("cannot read model {}: {e}", job.model_file().display()))
                    .with_source(e)
            })?;
            tokio::fs::create_dir_all(&out.build_dir).await?;

            let source = out.build_dir.join(format!("{}.cpp", out.symbol));
            tokio::fs::write(&source, render_source(&out.symbol, &model)).await?;
            file_created(&out.report_dir.join(format!("{}.cpp", out.symbol)));

            let header = out.build_dir.join(format!("{}.hpp", out.symbol));
            let model_name = file_name(job.model_file());
            let header_text = render_header(&out.symbol, out.section.as_deref(), &model_name);
            tokio::fs::write(&header, header_text).await?;
            file_created(&out.report_dir.join(format!("{}.hpp", out.symbol)));

            info!(job = job.name(), bytes = model.len(), "embedded model");
        }
        Ok(())
    }

    async fn check(&self, batch: &BuildBatch) -> std::result::Result<(), ApiError> {
        let mut used = HashSet::new();
        for job in batch {
            Self::plan(job, &mut used)?;
            if !tokio::fs::try_exists(job.model_file()).await.unwrap_or(false) {
                return Err(ApiError::backend(format!(
                    "model file {} does not exist",
                    job.model_file().display()
                )));
            }
            debug!(job = job.name(), "check passed");
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Make `s` a valid C identifier.
pub fn to_c_identifier(s: &str) -> String {
    let mut ident: String = s
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if !ident.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        ident.insert(0, '_');
    }
    ident
}

fn render_source(symbol: &str, model: &[u8]) -> String {
    let mut out = format!(
        "/*\n * Generated C representation of {symbol}. Do not modify.\n */\n\n#include \"{symbol}.hpp\"\n\nconst unsigned int {symbol}_len = {};\nalignas(16) unsigned char {symbol}[] = {{",
        model.len()
    );
    for (i, chunk) in model.chunks(12).enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str("\n  ");
        let bytes: Vec<String> = chunk.iter().map(|b| format!("0x{b:02x}")).collect();
        out.push_str(&bytes.join(", "));
    }
    out.push_str("\n};\n");
    out
}

fn render_header(symbol: &str, section: Option<&str>, model_name: &str) -> String {
    let section = section
        .map(|s| format!("section(\"{s}\"), "))
        .unwrap_or_default();
    format!(
        "/*\n * Generated C representation of {model_name}. Do not modify.\n */\n\n#pragma once\n\nextern const unsigned int {symbol}_len;\nextern unsigned char {symbol}[] __attribute__(({section}aligned(16)));\n"
    )
}
