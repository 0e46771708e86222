//! [`ContainerEngine`] backed by the `docker` command line.

use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::RegistryCredentials;
use crate::engine::{ContainerEngine, ContainerId, ContainerSpec, LogStream};
use crate::error::{EngineResult, WorkerFailure};

/// Drives containers through a docker-compatible CLI (`docker`, `podman`).
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    async fn output(&self, args: &[&str]) -> EngineResult<Output> {
        debug!(program = %self.program, ?args, "running container engine");
        self.command()
            .args(args)
            .output()
            .await
            .map_err(|e| unavailable(&self.program, e))
    }

    /// Run a command that must succeed.
    async fn checked(&self, args: &[&str]) -> EngineResult<String> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(WorkerFailure::Engine {
                detail: format!("{} {}: {}", self.program, args.join(" "), stderr_of(&output)),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

fn unavailable(program: &str, err: std::io::Error) -> WorkerFailure {
    WorkerFailure::EngineUnavailable {
        detail: format!("failed to run {program}: {err}"),
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Arguments of `docker run` for `spec`.
pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--detach".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    for mount in &spec.mounts {
        let mode = if mount.read_only { "ro" } else { "rw" };
        args.push("--volume".into());
        args.push(format!(
            "{}:{}:{}",
            mount.source.display(),
            mount.target.display(),
            mode
        ));
    }
    for (key, value) in &spec.env {
        args.push("--env".into());
        args.push(format!("{key}={value}"));
    }
    if let Some((host, port)) = &spec.publish {
        args.push("--publish".into());
        args.push(format!("{host}::{port}"));
    }
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

/// First host port in `docker port` output such as `127.0.0.1:49153`.
pub fn parse_port_output(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
}

#[async_trait]
impl ContainerEngine for DockerCli {
    fn name(&self) -> &str {
        &self.program
    }

    async fn image_present(&self, image: &str) -> EngineResult<bool> {
        let output = self
            .output(&["image", "inspect", "--format", "{{.Id}}", image])
            .await?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = stderr_of(&output);
        if stderr.contains("Cannot connect") {
            return Err(WorkerFailure::EngineUnavailable { detail: stderr });
        }
        Ok(false)
    }

    async fn login(&self, credentials: &RegistryCredentials) -> EngineResult<()> {
        let mut child = self
            .command()
            .args([
                "login",
                "--username",
                credentials.username.as_str(),
                "--password-stdin",
                credentials.registry.as_str(),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| unavailable(&self.program, e))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(credentials.password.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(WorkerFailure::AuthenticationFailed {
                registry: credentials.registry.clone(),
                detail: stderr_of(&output),
            });
        }
        Ok(())
    }

    async fn pull(&self, image: &str) -> EngineResult<()> {
        let output = self.output(&["pull", image]).await?;
        if !output.status.success() {
            return Err(WorkerFailure::PullFailed {
                image: image.to_string(),
                detail: stderr_of(&output),
            });
        }
        Ok(())
    }

    async fn spawn(&self, spec: &ContainerSpec) -> EngineResult<ContainerId> {
        let args = run_args(spec);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.output(&args).await?;
        if !output.status.success() {
            return Err(WorkerFailure::SpawnFailed {
                detail: stderr_of(&output),
            });
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(WorkerFailure::SpawnFailed {
                detail: "engine returned no container id".into(),
            });
        }
        Ok(ContainerId::new(id))
    }

    async fn host_port(&self, id: &ContainerId, container_port: u16) -> EngineResult<Option<u16>> {
        let port = format!("{container_port}/tcp");
        let output = self.output(&["port", id.as_str(), &port]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(parse_port_output(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn log_stream(&self, id: &ContainerId) -> EngineResult<LogStream> {
        let child = self
            .command()
            .args(["logs", "--follow", id.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| unavailable(&self.program, e))?;
        Ok(LogStream::from_child(child))
    }

    async fn logs(&self, id: &ContainerId) -> EngineResult<String> {
        let output = self.output(&["logs", id.as_str()]).await?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    async fn stop(&self, id: &ContainerId) -> EngineResult<()> {
        self.checked(&["stop", id.as_str()]).await.map(drop)
    }

    async fn remove(&self, id: &ContainerId) -> EngineResult<()> {
        self.checked(&["rm", "--force", id.as_str()]).await.map(drop)
    }
}
