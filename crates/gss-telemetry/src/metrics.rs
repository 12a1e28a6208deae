//! Prometheus metrics for security-context negotiation.
//!
//! All metrics follow the naming convention: `gss_<object>_<event>_total`
//! for counters and `gss_<object>_<event>_seconds` for histograms.

use lazy_static::lazy_static;
use prometheus::{
    core::Collector, exponential_buckets, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CONTEXT METRICS
    // =========================================================================

    /// Contexts created, by role
    pub static ref CONTEXTS_CREATED: CounterVec = CounterVec::new(
        Opts::new("gss_contexts_created_total", "Total security contexts created"),
        &["role"]  // role: initiator/acceptor
    ).expect("metric creation failed");

    /// Contexts that reached the established state, by role
    pub static ref CONTEXTS_ESTABLISHED: CounterVec = CounterVec::new(
        Opts::new("gss_contexts_established_total", "Total security contexts fully established"),
        &["role"]
    ).expect("metric creation failed");

    /// Time spent inside one negotiation step
    pub static ref HANDSHAKE_STEP_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "gss_handshake_step_duration_seconds",
            "Time spent processing one context-establishment token"
        ).buckets(exponential_buckets(0.00001, 4.0, 10).expect("valid bucket layout")),
        &["role"]
    ).expect("metric creation failed");

    // =========================================================================
    // TOKEN METRICS
    // =========================================================================

    /// Tokens rejected before reaching a mechanism
    pub static ref TOKENS_REJECTED: CounterVec = CounterVec::new(
        Opts::new("gss_tokens_rejected_total", "Total context tokens rejected"),
        &["reason"]  // reason: malformed/mechanism_mismatch
    ).expect("metric creation failed");

    /// Per-message ordering anomalies observed by sequence tracking
    pub static ref SEQUENCE_ANOMALIES: CounterVec = CounterVec::new(
        Opts::new("gss_sequence_anomalies_total", "Total out-of-order per-message tokens"),
        &["status"]  // status: duplicate/old/unsequenced/gap
    ).expect("metric creation failed");

    // =========================================================================
    // REGISTRY AND CREDENTIAL METRICS
    // =========================================================================

    /// Mechanism factory resolutions
    pub static ref MECHANISM_RESOLUTIONS: CounterVec = CounterVec::new(
        Opts::new("gss_mechanism_resolutions_total", "Total mechanism factory lookups"),
        &["outcome"]  // outcome: cached/created/unsupported/failed
    ).expect("metric creation failed");

    /// Credential element acquisitions
    pub static ref CREDENTIALS_ACQUIRED: CounterVec = CounterVec::new(
        Opts::new("gss_credentials_acquired_total", "Total credential element acquisitions"),
        &["outcome"]  // outcome: success/failure
    ).expect("metric creation failed");
}

/// Handle proving the metrics were registered.
pub struct MetricsHandle {
    _registered: bool,
}

/// Register all metrics with the global registry.
///
/// Calling this more than once is harmless; metrics already present are
/// left in place.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(CONTEXTS_CREATED.clone()),
        Box::new(CONTEXTS_ESTABLISHED.clone()),
        Box::new(HANDSHAKE_STEP_DURATION.clone()),
        Box::new(TOKENS_REJECTED.clone()),
        Box::new(SEQUENCE_ANOMALIES.clone()),
        Box::new(MECHANISM_RESOLUTIONS.clone()),
        Box::new(CREDENTIALS_ACQUIRED.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { _registered: true })
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
