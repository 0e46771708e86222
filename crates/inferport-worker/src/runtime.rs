//! The worker side of the protocol.
//!
//! A backend packaged as a worker image links this module: [`serve`] for the
//! HTTP protocol, [`run_direct`] for the Direct protocol, and
//! [`WorkerLogLayer`] so that every `tracing` event leaves the worker as a
//! [`LogRecord`] line.

use std::convert::Infallible;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::field::{Field, Visit};
use tracing::{debug, error, Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use inferport_backends::events::{FILE_PATH_FIELD, FILE_STATUS_FIELD};
use inferport_backends::{ApiError, BackendApi, BuildBatch, ErrorKind, Operation};

use crate::relay::{FileEvent, LogRecord, Severity};

/// Writes every event as one JSON [`LogRecord`] line.
///
/// The first failed write is reported on stderr; later failures are dropped.
pub struct WorkerLogLayer<W> {
    make_writer: W,
    write_failed: AtomicBool,
}

impl WorkerLogLayer<fn() -> std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout as fn() -> std::io::Stdout)
    }
}

impl<W> WorkerLogLayer<W>
where
    W: for<'a> MakeWriter<'a> + 'static,
{
    pub fn new(make_writer: W) -> Self {
        Self {
            make_writer,
            write_failed: AtomicBool::new(false),
        }
    }

    fn write_record(&self, record: &LogRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.make_writer.make_writer().write_all(&line)
    }
}

impl<S, W> Layer<S> for WorkerLogLayer<W>
where
    S: Subscriber,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        let severity = Severity::from(*event.metadata().level());
        let mut record = LogRecord::new(severity.level_name(), visitor.message);
        if let (Some(status), Some(path)) = (visitor.file_status, visitor.file_path) {
            record.file_event = Some(FileEvent { status, path });
        }
        if let Err(e) = self.write_record(&record) {
            if !self.write_failed.swap(true, Ordering::Relaxed) {
                eprintln!("worker log output failed: {e}");
            }
        }
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    file_status: Option<String>,
    file_path: Option<String>,
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            FILE_STATUS_FIELD => self.file_status = Some(value.to_string()),
            FILE_PATH_FIELD => self.file_path = Some(value.to_string()),
            "message" => self.message = value.to_string(),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            FILE_STATUS_FIELD => self.file_status = Some(format!("{value:?}")),
            FILE_PATH_FIELD => self.file_path = Some(format!("{value:?}")),
            "message" => self.message = format!("{value:?}"),
            _ => {}
        }
    }
}

/// Route the worker's `tracing` output to stdout as log records.
///
/// The level comes from `RUST_LOG`, defaulting to `info`.
pub fn init_worker_logging() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(WorkerLogLayer::stdout())
        .try_init()
}

/// HTTP status answering an error of `kind`.
pub fn error_status(kind: ErrorKind) -> StatusCode {
    if kind.is_request_error() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Serve `/health`, `/build` and `/check` for `api` on `listener`.
pub async fn serve(api: Arc<dyn BackendApi>, listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let api = Arc::clone(&api);
        tokio::spawn(async move {
            let service = service_fn(move |req| handle(Arc::clone(&api), req));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(%peer, "connection closed: {e}");
            }
        });
    }
}

async fn handle(
    api: Arc<dyn BackendApi>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let op = match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => {
            return Ok(json_response(StatusCode::OK, &json!({ "status": "ok" })));
        }
        (&Method::POST, "/build") => Operation::Build,
        (&Method::POST, "/check") => Operation::Check,
        _ => {
            return Ok(json_response(
                StatusCode::NOT_FOUND,
                &json!({ "detail": "Not Found" }),
            ));
        }
    };
    let batch = match read_batch(req).await {
        Ok(batch) => batch,
        Err(err) => return Ok(error_response(&err)),
    };
    Ok(match api.invoke(op, &batch).await {
        Ok(()) => Response::new(Full::new(Bytes::new())),
        Err(err) => {
            error!("{err}");
            error_response(&err)
        }
    })
}

async fn read_batch(req: Request<Incoming>) -> Result<BuildBatch, ApiError> {
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| ApiError::new(ErrorKind::Transport, e.to_string()))?
        .to_bytes();
    serde_json::from_slice(&body)
        .map_err(|e| ApiError::new(ErrorKind::Validation, format!("Invalid build batch: {e}")))
}

fn error_response(err: &ApiError) -> Response<Full<Bytes>> {
    json_response(error_status(err.kind()), &json!({ "detail": err.message() }))
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Run `op` on the batch stored at `config_path`.
///
/// Failures are also logged at error level, which is what the host watches
/// for.
pub async fn run_direct(
    api: &dyn BackendApi,
    op: Operation,
    config_path: &Path,
) -> Result<(), ApiError> {
    let outcome = async {
        let text = tokio::fs::read_to_string(config_path).await?;
        let batch: BuildBatch = serde_json::from_str(&text).map_err(|e| {
            ApiError::new(ErrorKind::Validation, format!("Invalid build batch: {e}"))
        })?;
        api.invoke(op, &batch).await
    }
    .await;
    if let Err(err) = &outcome {
        error!("{err}");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::relay::{parse_line, Relayed};

    #[test]
    fn status_mapping() {
        assert_eq!(error_status(ErrorKind::Validation), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_status(ErrorKind::Resolution), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_status(ErrorKind::Backend), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_status(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_do_not_break_logging() {
        let layer = WorkerLogLayer::new(|| BrokenPipe);
        let err = layer
            .write_record(&LogRecord::new("INFO", "lost"))
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);

        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("first");
            tracing::info!("second");
        });
    }

    #[test]
    fn layer_writes_records() {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber =
            tracing_subscriber::registry().with(WorkerLogLayer::new(move || writer.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("low memory");
            inferport_backends::events::file_created(Path::new("/mnt/out/cnn/model.cpp"));
        });

        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let records: Vec<Relayed> = text.lines().map(parse_line).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], Relayed::Record(LogRecord::new("WARNING", "low memory")));
        let Relayed::Record(created) = &records[1] else {
            panic!("expected a record");
        };
        assert_eq!(created.level, "INFO");
        assert_eq!(
            created.file_event,
            Some(FileEvent {
                status: "created".into(),
                path: "/mnt/out/cnn/model.cpp".into(),
            })
        );
    }
}
