//! Orchestrator tunables and registry credentials.

use std::time::Duration;

use tracing::warn;

/// Registry used for private worker images.
pub const PRODUCTION_REGISTRY: &str = "registry.inferport.dev/workers/";
/// Registry used when `APP_ENV=development`.
pub const DEVELOPMENT_REGISTRY: &str = "registry.inferport.dev/workers-dev/";

/// Settings shared by every worker session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Container engine executable.
    pub engine: String,
    /// Address the published service port is bound to on the host.
    pub host: String,
    /// Port the worker's HTTP service listens on inside the container.
    pub service_port: u16,
    /// Overall deadline for the worker to answer `/health`.
    pub readiness_timeout: Duration,
    /// Delay between health probes.
    pub readiness_interval: Duration,
    /// Deadline of a single health probe.
    pub probe_timeout: Duration,
    /// How long teardown waits for the log drain task.
    pub drain_join_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let interval = Duration::from_millis(500);
        Self {
            engine: "docker".into(),
            host: "127.0.0.1".into(),
            service_port: 5000,
            readiness_timeout: Duration::from_secs(30),
            readiness_interval: interval,
            probe_timeout: interval,
            drain_join_timeout: Duration::from_secs(5),
        }
    }
}

impl OrchestratorConfig {
    /// Defaults overridden by `INFERPORT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// Unparseable values are reported and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(engine) = lookup("INFERPORT_ENGINE").filter(|v| !v.trim().is_empty()) {
            config.engine = engine.trim().to_string();
        }
        if let Some(port) = parse_var(&lookup, "INFERPORT_SERVICE_PORT") {
            config.service_port = port;
        }
        let millis = |key: &str| parse_var::<u64>(&lookup, key).map(Duration::from_millis);
        if let Some(timeout) = millis("INFERPORT_READINESS_TIMEOUT_MS") {
            config.readiness_timeout = timeout;
        }
        if let Some(interval) = millis("INFERPORT_READINESS_INTERVAL_MS") {
            config.readiness_interval = interval;
            config.probe_timeout = interval;
        }
        if let Some(timeout) = millis("INFERPORT_PROBE_TIMEOUT_MS") {
            config.probe_timeout = timeout;
        }
        if let Some(timeout) = millis("INFERPORT_DRAIN_JOIN_MS") {
            config.drain_join_timeout = timeout;
        }
        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

/// Login for the private worker registry.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
    pub registry: String,
}

impl RegistryCredentials {
    /// Read `INFERPORT_USERNAME` and `INFERPORT_API_KEY`. Returns `None`
    /// unless both are set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let username = lookup("INFERPORT_USERNAME").filter(|v| !v.is_empty())?;
        let password = lookup("INFERPORT_API_KEY").filter(|v| !v.is_empty())?;
        let registry = match lookup("INFERPORT_REGISTRY").filter(|v| !v.is_empty()) {
            Some(registry) => registry,
            None if lookup("APP_ENV").as_deref() == Some("development") => {
                DEVELOPMENT_REGISTRY.to_string()
            }
            None => PRODUCTION_REGISTRY.to_string(),
        };
        Some(Self {
            username,
            password,
            registry,
        })
    }
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.engine, "docker");
        assert_eq!(config.service_port, 5000);
        assert_eq!(config.readiness_timeout, Duration::from_secs(30));
        assert_eq!(config.probe_timeout, config.readiness_interval);
        assert_eq!(config.drain_join_timeout, Duration::from_secs(5));
    }

    #[test]
    fn interval_override_moves_probe_timeout() {
        let config = OrchestratorConfig::from_lookup(env(&[
            ("INFERPORT_READINESS_INTERVAL_MS", "250"),
            ("INFERPORT_ENGINE", "podman"),
        ]));
        assert_eq!(config.readiness_interval, Duration::from_millis(250));
        assert_eq!(config.probe_timeout, Duration::from_millis(250));
        assert_eq!(config.engine, "podman");
    }

    #[test]
    fn bad_values_keep_defaults() {
        let config =
            OrchestratorConfig::from_lookup(env(&[("INFERPORT_READINESS_TIMEOUT_MS", "soon")]));
        assert_eq!(config.readiness_timeout, Duration::from_secs(30));
    }

    #[test]
    fn credentials_need_both_values() {
        assert!(RegistryCredentials::from_lookup(env(&[("INFERPORT_USERNAME", "me")])).is_none());
        let creds = RegistryCredentials::from_lookup(env(&[
            ("INFERPORT_USERNAME", "me"),
            ("INFERPORT_API_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(creds.registry, PRODUCTION_REGISTRY);
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn development_registry() {
        let creds = RegistryCredentials::from_lookup(env(&[
            ("INFERPORT_USERNAME", "me"),
            ("INFERPORT_API_KEY", "secret"),
            ("APP_ENV", "development"),
        ]))
        .unwrap();
        assert_eq!(creds.registry, DEVELOPMENT_REGISTRY);
    }
}
