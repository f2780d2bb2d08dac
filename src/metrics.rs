use tracing::trace;

// Recorded through the `metrics` facade; the Prometheus recorder installed at
// startup renders them on `/metrics`. Without a recorder these are no-ops.

pub fn inc_requests(route: &'static str) {
    ::metrics::counter!("studio_requests_total", "route" => route).increment(1);
    trace!(
        target = "studio.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn ai_elapsed(operation: &'static str, elapsed_ms: u128) {
    ::metrics::histogram!("studio_ai_request_ms", "operation" => operation)
        .record(elapsed_ms as f64);
    trace!(
        target = "studio.metrics",
        operation = operation,
        elapsed_ms = elapsed_ms as u64,
        "ai_elapsed"
    );
}
