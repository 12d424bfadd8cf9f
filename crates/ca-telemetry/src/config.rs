//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup record
    pub service_name: String,

    /// Log filter directive (trace, debug, info, warn, error or an
    /// `EnvFilter` expression such as `ca_connectivity=debug`)
    pub log_level: String,

    /// Whether to write logs to the console at all
    pub console_output: bool,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ca-node".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CA_SERVICE_NAME`: Service name (default: ca-node)
    /// - `CA_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `CA_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `CA_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let is_container = var("KUBERNETES_SERVICE_HOST").is_some() || var("DOCKER_CONTAINER").is_some();

        Self {
            service_name: var("CA_SERVICE_NAME").unwrap_or_else(|| "ca-node".to_string()),

            log_level: var("CA_LOG_LEVEL")
                .or_else(|| var("RUST_LOG"))
                .unwrap_or_else(|| "info".to_string()),

            console_output: var("CA_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: var("CA_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),
        }
    }

    /// Override the log filter.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}
