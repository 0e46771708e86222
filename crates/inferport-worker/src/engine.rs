//! The container engine seam.
//!
//! The orchestrator only talks to containers through [`ContainerEngine`];
//! [`crate::docker::DockerCli`] is the production implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::trace;

use crate::config::RegistryCredentials;
use crate::error::EngineResult;

/// Engine-assigned identifier of a running container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A host path bound into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: PathBuf,
    pub target: PathBuf,
    pub read_only: bool,
}

impl Mount {
    pub fn read_only(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: true,
        }
    }

    pub fn read_write(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }
}

/// Everything needed to start one worker container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub mounts: Vec<Mount>,
    pub env: Vec<(String, String)>,
    /// Container port published on an ephemeral host port bound to `host`.
    pub publish: Option<(String, u16)>,
    /// Arguments passed after the image name.
    pub command: Vec<String>,
}

/// Lines of a container's combined output, in the order they were read.
pub struct LogStream {
    lines: mpsc::Receiver<String>,
    _child: Option<Child>,
}

impl LogStream {
    /// Stream the lines of `reader`.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(256);
        forward_lines(reader, tx);
        Self {
            lines: rx,
            _child: None,
        }
    }

    /// Stream the stdout and stderr of a log-following process.
    ///
    /// Lines keep their order within each of the two streams; lines of
    /// stdout and stderr may interleave differently than they were written.
    /// The process is killed when the stream is dropped.
    pub fn from_child(mut child: Child) -> Self {
        let (tx, rx) = mpsc::channel(256);
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx);
        }
        Self {
            lines: rx,
            _child: Some(child),
        }
    }

    /// Next line, or `None` once the container's output has ended.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Next line already read, without waiting.
    pub fn try_next_line(&mut self) -> Option<String> {
        self.lines.try_recv().ok()
    }
}

/// Forward `reader` line by line until it ends or fails.
///
/// Bytes that are not UTF-8 are replaced, so one bad line never hides the
/// lines after it.
fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    trace!("worker output ended: {e}");
                    break;
                }
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']).to_string();
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

/// Operations the orchestrator needs from a container engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Engine name used in error context, e.g. `docker`.
    fn name(&self) -> &str;

    /// Whether `image` is in the local image cache.
    async fn image_present(&self, image: &str) -> EngineResult<bool>;

    async fn login(&self, credentials: &RegistryCredentials) -> EngineResult<()>;

    async fn pull(&self, image: &str) -> EngineResult<()>;

    /// Start a detached container.
    async fn spawn(&self, spec: &ContainerSpec) -> EngineResult<ContainerId>;

    /// Host port currently mapped to `container_port`, if any.
    async fn host_port(&self, id: &ContainerId, container_port: u16) -> EngineResult<Option<u16>>;

    /// Follow the container's combined output until it exits.
    async fn log_stream(&self, id: &ContainerId) -> EngineResult<LogStream>;

    /// Everything the container has written so far.
    async fn logs(&self, id: &ContainerId) -> EngineResult<String>;

    async fn stop(&self, id: &ContainerId) -> EngineResult<()>;

    /// Remove the container, stopping it first if needed.
    async fn remove(&self, id: &ContainerId) -> EngineResult<()>;
}
