//! Worker orchestration against a fake container engine and in-process
//! HTTP services.

mod common;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use inferport_backends::{
    register_builtin, ApiError, BackendApi, BackendRegistry, BuildBatch, BuildJob, ErrorKind,
    Operation, ProjectInfo, WorkerImage,
};
use inferport_targets::Catalog;
use inferport_worker::runtime::serve;
use inferport_worker::{
    dispatch_batches, DirectWorkerExecutor, HttpWorkerClient, Orchestrator, OrchestratorConfig,
    ReadinessProbe, RegistryCredentials, WorkerFailure, CONFIG_PATH,
};

use common::{izer_batch, quick_config, FakeEngine};

/// A health endpoint answering 503 for the first `unhealthy` requests.
async fn health_server(unhealthy: usize) -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let seen = counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response: &[u8] = if seen < unhealthy {
                    b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                } else {
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 15\r\nconnection: close\r\n\r\n{\"status\":\"ok\"}"
                };
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (port, hits)
}

#[tokio::test]
async fn readiness_times_out_against_unhealthy_service() {
    let (port, hits) = health_server(usize::MAX).await;
    let probe = ReadinessProbe::new("127.0.0.1", Duration::from_secs(2), Duration::from_millis(500));

    let started = Instant::now();
    let err = probe.wait(|| async move { Some(port) }).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, WorkerFailure::ReadinessTimeout { .. }));
    assert!(elapsed >= Duration::from_millis(1900), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "hung past the deadline: {elapsed:?}");
    let attempts = hits.load(Ordering::SeqCst);
    assert!((3..=5).contains(&attempts), "{attempts} probes");
}

#[tokio::test]
async fn readiness_returns_port_once_healthy() {
    let (port, hits) = health_server(2).await;
    let probe = ReadinessProbe::new("127.0.0.1", Duration::from_secs(5), Duration::from_millis(50));
    assert_eq!(probe.wait(|| async move { Some(port) }).await.unwrap(), port);
    assert!(hits.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn readiness_waits_for_published_port() {
    let (port, _) = health_server(0).await;
    let probe = ReadinessProbe::new("127.0.0.1", Duration::from_secs(5), Duration::from_millis(50));
    let lookups = AtomicUsize::new(0);
    let found = probe
        .wait(|| {
            let n = lookups.fetch_add(1, Ordering::SeqCst);
            async move { (n >= 2).then_some(port) }
        })
        .await
        .unwrap();
    assert_eq!(found, port);
    assert_eq!(lookups.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn direct_error_record_escalates_and_removes_config() {
    let workspace = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new().with_output(&[r#"{"level":"ERROR","msg":"boom"}"#]));
    let orchestrator = Orchestrator::new(engine.clone(), quick_config());
    let executor = DirectWorkerExecutor::new(orchestrator, WorkerImage::public("workers/izer:test"));

    let batch = izer_batch(workspace.path(), workspace.path().join("net.tflite"));
    let err = executor.run(Operation::Build, &batch).await.unwrap_err();

    assert!(matches!(err.failure(), WorkerFailure::Escalated { message } if message == "boom"));
    assert_eq!(err.image(), "workers/izer:test");
    assert_eq!(err.to_string(), "[fake@workers/izer:test] boom");

    let spec = &engine.spawned()[0];
    let config = spec
        .mounts
        .iter()
        .find(|m| m.target == Path::new(CONFIG_PATH))
        .expect("config file is mounted");
    assert!(config.read_only);
    assert!(!config.source.exists(), "config file left behind");
    assert!(engine.called("stop"));
    assert!(engine.called("remove"));
}

#[tokio::test]
async fn direct_error_after_undecodable_line_still_escalates() {
    let workspace = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new().with_raw_output(
        b"third-party chatter \xff\xfe\n{\"level\":\"ERROR\",\"msg\":\"boom\"}\n",
    ));
    let orchestrator = Orchestrator::new(engine.clone(), quick_config());
    let executor = DirectWorkerExecutor::new(orchestrator, WorkerImage::public("workers/izer:test"));

    let batch = izer_batch(workspace.path(), workspace.path().join("net.tflite"));
    let err = executor.run(Operation::Build, &batch).await.unwrap_err();

    assert!(matches!(err.failure(), WorkerFailure::Escalated { message } if message == "boom"));
    assert!(engine.called("remove"));
}

#[tokio::test]
async fn direct_success_ignores_chatter() {
    let workspace = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new().with_output(&[
        "Loading model...",
        r#"{"level":"INFO","msg":"wrote cnn.c","file_event":{"status":"created","path":"cnn/src/inferport_cnn/cnn.c"}}"#,
        r#"{"level":"WARNING","msg":"slow layer"}"#,
    ]));
    let orchestrator = Orchestrator::new(engine.clone(), quick_config());
    let executor = DirectWorkerExecutor::new(orchestrator, WorkerImage::public("workers/izer:test"));

    let batch = izer_batch(workspace.path(), workspace.path().join("net.tflite"));
    executor.check(&batch).await.unwrap();

    let spec = &engine.spawned()[0];
    assert_eq!(spec.command, vec!["check"]);
    assert!(spec.publish.is_none());
    assert!(spec.env.iter().any(|(k, _)| k == "HOST_UID"));
    // Output directories exist before the worker starts.
    assert!(workspace.path().join("cnn/src/inferport_cnn").is_dir());
    assert_eq!(engine.calls().last().map(String::as_str), Some("remove"));
}

#[tokio::test]
async fn private_image_without_credentials_never_spawns() {
    let workspace = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new().without_image());
    let orchestrator = Orchestrator::new(engine.clone(), quick_config());
    let executor = DirectWorkerExecutor::new(orchestrator, WorkerImage::private("workers/izer:test"));

    let batch = izer_batch(workspace.path(), workspace.path().join("net.tflite"));
    let err: ApiError = executor.build(&batch).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WorkerLifecycle);
    assert!(err.message().contains("Credentials are required"));
    assert!(!engine.called("pull"));
    assert!(!engine.called("spawn"));
}

#[tokio::test]
async fn rejected_login_is_reported() {
    let workspace = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new().without_image().rejecting_login());
    let credentials = RegistryCredentials {
        username: "me".into(),
        password: "secret".into(),
        registry: "registry.example/workers/".into(),
    };
    let orchestrator =
        Orchestrator::new(engine.clone(), quick_config()).with_credentials(Some(credentials));
    let executor = DirectWorkerExecutor::new(orchestrator, WorkerImage::private("workers/izer:test"));

    let batch = izer_batch(workspace.path(), workspace.path().join("net.tflite"));
    let err = executor.run(Operation::Build, &batch).await.unwrap_err();
    assert!(matches!(
        err.failure(),
        WorkerFailure::AuthenticationFailed { registry, .. } if registry == "registry.example/workers/"
    ));
    assert!(!engine.called("pull"));
}

#[tokio::test]
async fn missing_public_image_is_pulled_without_login() {
    let workspace = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new().without_image());
    let orchestrator = Orchestrator::new(engine.clone(), quick_config());
    let executor = DirectWorkerExecutor::new(orchestrator, WorkerImage::public("workers/izer:test"));

    let batch = izer_batch(workspace.path(), workspace.path().join("net.tflite"));
    executor.build(&batch).await.unwrap();
    let calls = engine.calls();
    assert_eq!(&calls[..3], ["image_present", "pull", "spawn"]);
    assert!(!engine.called("login"));
}

/// Backend behind the worker HTTP service in these tests.
#[derive(Default)]
struct RecordingApi {
    seen: Mutex<Vec<BuildBatch>>,
}

#[async_trait]
impl BackendApi for RecordingApi {
    async fn build(&self, batch: &BuildBatch) -> Result<(), ApiError> {
        self.seen.lock().unwrap().push(batch.clone());
        Ok(())
    }

    async fn check(&self, _batch: &BuildBatch) -> Result<(), ApiError> {
        Err(ApiError::backend("layer 3 is not supported by the accelerator"))
    }
}

async fn worker_service(api: Arc<RecordingApi>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let api: Arc<dyn BackendApi> = api;
    tokio::spawn(serve(api, listener));
    port
}

#[tokio::test]
async fn http_worker_receives_rewritten_batch() {
    let workspace = tempfile::tempdir().unwrap();
    let api = Arc::new(RecordingApi::default());
    let port = worker_service(api.clone()).await;
    let engine = Arc::new(FakeEngine::new().with_port(port));
    let orchestrator = Orchestrator::new(engine.clone(), quick_config());
    let client = HttpWorkerClient::new(orchestrator, WorkerImage::public("workers/cnn:test"));

    let batch = izer_batch(workspace.path(), PathBuf::from("/data/models/net.tflite"));
    client.build(&batch).await.unwrap();

    let seen = api.seen.lock().unwrap().clone();
    let job = &seen[0].jobs()[0];
    assert_eq!(job.model_file(), Path::new("/mnt/models/net.tflite"));
    assert_eq!(job.project().workspace, PathBuf::from("/mnt/out"));
    assert_eq!(job.project().name, "cnn");

    let spec = &engine.spawned()[0];
    assert_eq!(spec.publish, Some(("127.0.0.1".to_string(), 5000)));
    assert!(spec.command.is_empty());
    assert!(engine.called("log_stream"));
    assert!(engine.called("stop"));
    assert!(engine.called("remove"));
}

#[tokio::test]
async fn http_worker_error_detail_propagates() {
    let workspace = tempfile::tempdir().unwrap();
    let port = worker_service(Arc::new(RecordingApi::default())).await;
    let engine = Arc::new(FakeEngine::new().with_port(port));
    let orchestrator = Orchestrator::new(engine.clone(), quick_config());
    let client = HttpWorkerClient::new(orchestrator, WorkerImage::public("workers/cnn:test"));

    let batch = izer_batch(workspace.path(), PathBuf::from("/data/models/net.tflite"));
    let err = client.run(Operation::Check, &batch).await.unwrap_err();

    assert!(matches!(
        err.failure(),
        WorkerFailure::Remote { status: 500, detail } if detail == "layer 3 is not supported by the accelerator"
    ));
    assert_eq!(err.kind(), ErrorKind::Backend);
    // Captured output is dumped and the worker is still torn down.
    assert!(engine.called("logs"));
    assert!(engine.called("remove"));
}

#[tokio::test]
async fn http_readiness_timeout_still_tears_down() {
    let workspace = tempfile::tempdir().unwrap();
    // No published port, so the service never becomes reachable.
    let engine = Arc::new(FakeEngine::new());
    let config = OrchestratorConfig {
        readiness_timeout: Duration::from_millis(300),
        ..quick_config()
    };
    let orchestrator = Orchestrator::new(engine.clone(), config);
    let client = HttpWorkerClient::new(orchestrator, WorkerImage::public("workers/cnn:test"));

    let batch = izer_batch(workspace.path(), PathBuf::from("/data/models/net.tflite"));
    let err = client.run(Operation::Build, &batch).await.unwrap_err();

    assert!(matches!(err.failure(), WorkerFailure::ReadinessTimeout { .. }));
    assert_eq!(err.kind(), ErrorKind::WorkerLifecycle);
    assert!(engine.called("spawn"));
    assert!(engine.called("stop"));
    assert!(engine.called("remove"));
    assert!(!engine.called("log_stream"));
}

/// A worker that is healthy but answers every operation with a plain-text
/// 502.
async fn plain_error_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                let response: &[u8] = if request.starts_with(b"GET /health") {
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 15\r\nconnection: close\r\n\r\n{\"status\":\"ok\"}"
                } else {
                    b"HTTP/1.1 502 Bad Gateway\r\ncontent-type: text/plain\r\ncontent-length: 17\r\nconnection: close\r\n\r\nupstream exploded"
                };
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    port
}

/// Read one request, body included, so closing the socket does not reset it.
async fn read_request(socket: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let Ok(n) = socket.read(&mut buf).await else {
            return request;
        };
        if n == 0 {
            return request;
        }
        request.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&request);
        let Some(end) = text.find("\r\n\r\n") else {
            continue;
        };
        let length = text[..end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if request.len() >= end + 4 + length {
            return request;
        }
    }
}

#[tokio::test]
async fn http_error_without_json_body_is_transport_failure() {
    let workspace = tempfile::tempdir().unwrap();
    let port = plain_error_server().await;
    let engine = Arc::new(FakeEngine::new().with_port(port));
    let orchestrator = Orchestrator::new(engine.clone(), quick_config());
    let client = HttpWorkerClient::new(orchestrator, WorkerImage::public("workers/cnn:test"));

    let batch = izer_batch(workspace.path(), PathBuf::from("/data/models/net.tflite"));
    let err = client.run(Operation::Build, &batch).await.unwrap_err();

    assert!(matches!(
        err.failure(),
        WorkerFailure::Transport { detail } if detail == "HTTP 502 Bad Gateway"
    ));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(engine.called("remove"));
}

#[tokio::test]
async fn worker_service_rejects_malformed_batch() {
    let port = worker_service(Arc::new(RecordingApi::default())).await;
    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/build"))
        .body("{\"jobs\": 3}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 422);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid build batch"));

    let health: serde_json::Value = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn dispatch_routes_local_and_isolated_backends() {
    let workspace = tempfile::tempdir().unwrap();
    let model = workspace.path().join("kws.tflite");
    std::fs::write(&model, [0x1c, 0x00, 0x00, 0x00, b'T', b'F', b'L', b'3']).unwrap();

    let mut registry = BackendRegistry::new();
    register_builtin(&mut registry).unwrap();
    let engine = Arc::new(FakeEngine::new());
    let orchestrator = Orchestrator::new(engine.clone(), quick_config());

    let target = Catalog::builtin()
        .resolve_explicit_target("MAX78002", "CM4", None, Some("MSDK"), Some("TFLM"))
        .unwrap();
    let tflm = BuildBatch::new(vec![BuildJob::new(
        "kws",
        ProjectInfo::new("m4", workspace.path(), "."),
        &model,
        target,
        "tflm",
    )])
    .unwrap();
    let izer = izer_batch(workspace.path(), model.clone());

    dispatch_batches(&registry, &orchestrator, &[tflm, izer], Operation::Build)
        .await
        .unwrap();

    assert!(workspace.path().join("m4/src/inferport_tflm/kws.cpp").is_file());
    let spawned = engine.spawned();
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].command, vec!["build"]);
}

#[tokio::test]
async fn dispatch_stops_at_unknown_backend() {
    let registry = BackendRegistry::new();
    let orchestrator = Orchestrator::new(Arc::new(FakeEngine::new()), quick_config());
    let workspace = tempfile::tempdir().unwrap();
    let batch = izer_batch(workspace.path(), workspace.path().join("net.tflite"));

    let err = dispatch_batches(&registry, &orchestrator, &[batch], Operation::Check)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Selection);
    assert!(err.message().starts_with("Could not find the backend \"izer\""));
}
