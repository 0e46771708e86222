//! Readiness probing of a worker's HTTP service.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::config::OrchestratorConfig;
use crate::error::{EngineResult, WorkerFailure};

#[derive(Debug, Deserialize)]
struct Health {
    status: String,
}

/// Polls `GET /health` until the service answers or a deadline passes.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    client: reqwest::Client,
    host: String,
    timeout: Duration,
    interval: Duration,
    probe_timeout: Duration,
}

impl ReadinessProbe {
    pub fn new(host: impl Into<String>, timeout: Duration, interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into(),
            timeout,
            interval,
            probe_timeout: interval,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(
            config.host.clone(),
            config.readiness_timeout,
            config.readiness_interval,
        )
        .with_probe_timeout(config.probe_timeout)
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Wait until the service is healthy and return its host port.
    ///
    /// `port` is asked for the mapped host port before every probe, since
    /// the engine may publish it only after the container has started.
    pub async fn wait<F, Fut>(&self, mut port: F) -> EngineResult<u16>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<u16>>,
    {
        let poll = async {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut attempts = 0u32;
            loop {
                ticker.tick().await;
                attempts += 1;
                let Some(port) = port().await else {
                    trace!(attempts, "service port not published yet");
                    continue;
                };
                if self.healthy(port).await {
                    return (port, attempts);
                }
            }
        };
        match tokio::time::timeout(self.timeout, poll).await {
            Ok((port, attempts)) => {
                debug!(port, attempts, "worker service ready");
                Ok(port)
            }
            Err(_) => Err(WorkerFailure::ReadinessTimeout {
                timeout: self.timeout,
            }),
        }
    }

    /// One probe. A 200 answer reporting `bad` is not ready.
    async fn healthy(&self, port: u16) -> bool {
        let url = format!("http://{}:{port}/health", self.host);
        let response = match self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                trace!("health probe failed: {e}");
                return false;
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            trace!(status = %response.status(), "service not ready");
            return false;
        }
        match response.json::<Health>().await {
            Ok(health) => health.status != "bad",
            Err(_) => true,
        }
    }
}
