//! # Connectivity Telemetry
//!
//! Structured logging setup for connectivity nodes. Library crates only
//! emit `tracing` events; binaries call [`init_telemetry`] once at startup.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ca_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // Application code here
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CA_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `CA_JSON_LOGS` | `false` | JSON output (defaults on in containers) |
//! | `CA_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `CA_SERVICE_NAME` | `ca-node` | Service name in the startup record |

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// Install the global tracing subscriber.
///
/// Returns a guard to hold for the lifetime of the application; dropping it
/// logs the shutdown.
///
/// # Errors
///
/// `Filter` for an unparsable log filter, `Init` if a global subscriber is
/// already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    tracing_setup::init_tracing(&config)?;
    tracing::info!(
        service = %config.service_name,
        filter = %config.log_level,
        json = config.json_logs,
        "telemetry initialized"
    );
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active.
#[derive(Debug)]
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "shutting down telemetry");
    }
}
