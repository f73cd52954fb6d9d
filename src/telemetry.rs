//! Telemetry utilities for request timing and tracing spans.

use std::time::Instant;

/// Guard for timing request execution and recording metrics.
///
/// Records request latency when dropped.
pub struct RequestTimer {
    op: &'static str,
    start: Instant,
}

impl RequestTimer {
    /// Start timing a request.
    pub fn new(op: &'static str) -> Self {
        Self { op, start: Instant::now() }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_request(self.op, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Create a span for a client connection.
    pub fn connection(conn: &str, ip: &str) -> Span {
        info_span!("connection", conn = %conn, ip = %ip)
    }

    /// Create a span for a request execution.
    pub fn request(op: &str, user: &str) -> Span {
        info_span!("request", op = %op, user = %user)
    }
}
