//! Metrics collection and exposition.
//!
//! # Metrics
//! - `handler_requests_total` (counter): dispatched requests by method, status, route;
//!   `status` is the HTTP code, or `deferred` when the handler answers later
//! - `handler_outbox_frames_total` (counter): out-of-band reply frames pushed
//! - `handler_request_duration_seconds` (histogram): parse-to-reply latency
//! - `handler_framing_errors_total` (counter): undecodable frames by transport
//! - `handler_disconnects_total` (counter): client disconnect notifications
//! - `handler_route_reloads_total` (counter): route table generations by outcome
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; a no-op until an exporter is installed
//! - Prometheus exporter is optional and owns its own HTTP listener

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use super::ObservabilityError;
use crate::http::Reply;

/// Install the Prometheus exporter on `addr`. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), ObservabilityError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ObservabilityError::Metrics(e.to_string()))?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// `status` label for a dispatched request.
pub fn status_label(reply: &Reply) -> String {
    match reply {
        Reply::Respond(response) => response.status.as_u16().to_string(),
        Reply::Deferred => "deferred".to_string(),
    }
}

pub fn record_request(method: &str, status: &str, route: &str, elapsed: Duration) {
    metrics::counter!(
        "handler_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    metrics::histogram!("handler_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_framing_error(transport: &str) {
    metrics::counter!("handler_framing_errors_total", "transport" => transport.to_string()).increment(1);
}

pub fn record_outbox_frames(frames: usize) {
    metrics::counter!("handler_outbox_frames_total").increment(frames as u64);
}

pub fn record_disconnect() {
    metrics::counter!("handler_disconnects_total").increment(1);
}

pub fn record_reload(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("handler_route_reloads_total", "outcome" => outcome).increment(1);
}
