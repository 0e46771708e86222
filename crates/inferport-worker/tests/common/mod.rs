//! Test doubles shared by the worker integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use inferport_backends::{BuildBatch, BuildJob, ProjectInfo};
use inferport_targets::Catalog;
use inferport_worker::{
    ContainerEngine, ContainerId, ContainerSpec, EngineResult, LogStream, OrchestratorConfig,
    RegistryCredentials, WorkerFailure,
};

/// A container engine that records calls instead of running containers.
#[derive(Default)]
pub struct FakeEngine {
    present: bool,
    reject_login: bool,
    port: Option<u16>,
    output: Vec<u8>,
    calls: Mutex<Vec<String>>,
    specs: Mutex<Vec<ContainerSpec>>,
}

impl FakeEngine {
    /// An engine with the image already cached.
    pub fn new() -> Self {
        Self {
            present: true,
            ..Self::default()
        }
    }

    pub fn without_image(mut self) -> Self {
        self.present = false;
        self
    }

    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Report `port` as the published service port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Lines the container writes to its output.
    pub fn with_output(mut self, lines: &[&str]) -> Self {
        self.output = lines.iter().flat_map(|l| format!("{l}\n").into_bytes()).collect();
        self
    }

    /// Output bytes written as is, whether or not they are UTF-8.
    pub fn with_raw_output(mut self, bytes: &[u8]) -> Self {
        self.output = bytes.to_vec();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, name: &str) -> bool {
        self.calls().iter().any(|c| c == name)
    }

    pub fn spawned(&self) -> Vec<ContainerSpec> {
        self.specs.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn image_present(&self, _image: &str) -> EngineResult<bool> {
        self.record("image_present");
        Ok(self.present)
    }

    async fn login(&self, credentials: &RegistryCredentials) -> EngineResult<()> {
        self.record("login");
        if self.reject_login {
            return Err(WorkerFailure::AuthenticationFailed {
                registry: credentials.registry.clone(),
                detail: "unauthorized".into(),
            });
        }
        Ok(())
    }

    async fn pull(&self, _image: &str) -> EngineResult<()> {
        self.record("pull");
        Ok(())
    }

    async fn spawn(&self, spec: &ContainerSpec) -> EngineResult<ContainerId> {
        self.record("spawn");
        self.specs.lock().unwrap().push(spec.clone());
        Ok(ContainerId::new(spec.name.clone()))
    }

    async fn host_port(
        &self,
        _id: &ContainerId,
        _container_port: u16,
    ) -> EngineResult<Option<u16>> {
        Ok(self.port)
    }

    async fn log_stream(&self, _id: &ContainerId) -> EngineResult<LogStream> {
        self.record("log_stream");
        Ok(LogStream::from_reader(std::io::Cursor::new(self.output.clone())))
    }

    async fn logs(&self, _id: &ContainerId) -> EngineResult<String> {
        self.record("logs");
        Ok(String::from_utf8_lossy(&self.output).into_owned())
    }

    async fn stop(&self, _id: &ContainerId) -> EngineResult<()> {
        self.record("stop");
        Ok(())
    }

    async fn remove(&self, _id: &ContainerId) -> EngineResult<()> {
        self.record("remove");
        Ok(())
    }
}

/// Settings with short timeouts so failing tests fail fast.
pub fn quick_config() -> OrchestratorConfig {
    OrchestratorConfig {
        readiness_timeout: std::time::Duration::from_secs(5),
        readiness_interval: std::time::Duration::from_millis(50),
        probe_timeout: std::time::Duration::from_millis(500),
        drain_join_timeout: std::time::Duration::from_secs(1),
        ..OrchestratorConfig::default()
    }
}

/// A one-job izer batch writing into `workspace`.
pub fn izer_batch(workspace: &Path, model: PathBuf) -> BuildBatch {
    let target = Catalog::builtin()
        .resolve_explicit_target("MAX78000", "CM4", Some("CNN"), Some("MSDK"), None)
        .unwrap();
    let job = BuildJob::new(
        "cnn-model",
        ProjectInfo::new("cnn", workspace, "."),
        model,
        target,
        "izer",
    );
    BuildBatch::new(vec![job]).unwrap()
}
