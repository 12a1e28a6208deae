//! # GSS Telemetry
//!
//! Logging and metrics bootstrap for applications embedding the negotiation
//! core.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an `EnvFilter`, plain or JSON
//! - **Metrics**: Prometheus counters for contexts, tokens, mechanism
//!   resolution and credential acquisition
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gss_telemetry::{TelemetryConfig, init_telemetry};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(config).expect("Failed to init telemetry");
//!
//!     // Contexts created from here on are logged and counted
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GSS_SERVICE_NAME` | `gss` | Service name on log lines |
//! | `GSS_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `GSS_JSON_LOGS` | `false` | Emit JSON formatted logs |
//! | `GSS_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, LoggingHandle};
pub use metrics::{
    gather_metrics, register_metrics, MetricsHandle, CONTEXTS_CREATED, CONTEXTS_ESTABLISHED,
    CREDENTIALS_ACQUIRED, HANDSHAKE_STEP_DURATION, MECHANISM_RESOLUTIONS, REGISTRY,
    SEQUENCE_ANOMALIES, TOKENS_REJECTED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first so counters exist before the first log line
    let metrics_handle = register_metrics()?;
    let logging_handle = logging::init_logging(&config)?;

    Ok(TelemetryGuard {
        _logging: logging_handle,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logging: LoggingHandle,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

/// Convenience macro for recording a metric with a value.
#[macro_export]
macro_rules! metric_observe {
    ($metric:expr, $value:expr) => {
        $metric.observe($value)
    };
    ($metric:expr, $labels:expr, $value:expr) => {
        $metric.with_label_values($labels).observe($value)
    };
}
