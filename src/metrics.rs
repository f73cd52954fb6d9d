//! Prometheus metrics collection for salond.
//!
//! Tracks connection counts, request throughput and latency, request
//! failures by error code, delivery fan-out, and the coin pipeline.
//! Exposed in text format on the HTTP endpoint when one is configured.

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Currently connected, authenticated clients.
pub static CONNECTED_CLIENTS: OnceLock<IntGauge> = OnceLock::new();

/// Requests processed, by op.
pub static REQUEST_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Request processing latency, by op.
pub static REQUEST_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Request failures, by op and error code.
pub static REQUEST_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Messages persisted, by scope (`direct` / `group`).
pub static MESSAGES_STORED: OnceLock<IntCounterVec> = OnceLock::new();

/// Coins deducted by the monetization gate.
pub static COINS_CHARGED: OnceLock<IntCounter> = OnceLock::new();

/// Recipients per room broadcast.
pub static BROADCAST_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Flood-control violations.
pub static FLOOD_VIOLATIONS: OnceLock<IntCounter> = OnceLock::new();

/// Failed authentication handshakes.
pub static AUTH_FAILURES: OnceLock<IntCounter> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are
/// recorded.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(
        CONNECTED_CLIENTS,
        IntGauge::new("salon_connected_clients", "Currently connected authenticated clients")
    );
    register!(
        REQUEST_COUNTER,
        IntCounterVec::new(Opts::new("salon_request_total", "Requests processed by op"), &["op"])
    );
    register!(
        REQUEST_LATENCY,
        HistogramVec::new(
            HistogramOpts::new("salon_request_duration_seconds", "Request latency by op")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["op"]
        )
    );
    register!(
        REQUEST_ERRORS,
        IntCounterVec::new(
            Opts::new("salon_request_errors_total", "Request failures by op and code"),
            &["op", "code"]
        )
    );
    register!(
        MESSAGES_STORED,
        IntCounterVec::new(
            Opts::new("salon_messages_stored_total", "Messages persisted by scope"),
            &["scope"]
        )
    );
    register!(
        COINS_CHARGED,
        IntCounter::new("salon_coins_charged_total", "Coins deducted by the monetization gate")
    );
    register!(
        BROADCAST_FANOUT,
        Histogram::with_opts(
            HistogramOpts::new("salon_broadcast_fanout", "Recipients per room broadcast")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0])
        )
    );
    register!(
        FLOOD_VIOLATIONS,
        IntCounter::new("salon_flood_violations_total", "Flood-control violations")
    );
    register!(
        AUTH_FAILURES,
        IntCounter::new("salon_auth_failures_total", "Failed authentication handshakes")
    );
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record a request execution with latency.
#[inline]
pub fn record_request(op: &str, duration_secs: f64) {
    if let Some(c) = REQUEST_COUNTER.get() {
        c.with_label_values(&[op]).inc();
    }
    if let Some(h) = REQUEST_LATENCY.get() {
        h.with_label_values(&[op]).observe(duration_secs);
    }
}

/// Record a request failure.
#[inline]
pub fn record_request_error(op: &str, code: &str) {
    if let Some(c) = REQUEST_ERRORS.get() {
        c.with_label_values(&[op, code]).inc();
    }
}

/// Record a persisted message.
#[inline]
pub fn record_message_stored(scope: &str, tariff: i64) {
    if let Some(c) = MESSAGES_STORED.get() {
        c.with_label_values(&[scope]).inc();
    }
    if let Some(c) = COINS_CHARGED.get()
        && tariff > 0
    {
        c.inc_by(tariff as u64);
    }
}

/// Record broadcast fan-out (how many connections received an event).
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = BROADCAST_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

/// Record a flood violation.
#[inline]
pub fn record_flood_violation() {
    if let Some(c) = FLOOD_VIOLATIONS.get() {
        c.inc();
    }
}

/// Record a failed handshake.
#[inline]
pub fn record_auth_failure() {
    if let Some(c) = AUTH_FAILURES.get() {
        c.inc();
    }
}
