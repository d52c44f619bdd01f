//! Prometheus metrics for the FaultLine proxy.

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder};

lazy_static! {
    /// HTTP requests handled by the L7 proxy.
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "faultline_http_requests_total",
        "Total number of HTTP requests handled",
        &["method", "status"]
    )
    .unwrap();

    /// Faults actually applied to a request or connection.
    pub static ref FAULTS_INJECTED_TOTAL: CounterVec = register_counter_vec!(
        "faultline_faults_injected_total",
        "Total number of faults injected",
        &["protocol", "failure_type", "rule_id"]
    )
    .unwrap();

    /// Injected latency, in milliseconds.
    pub static ref LATENCY_INJECTED_MS: HistogramVec = register_histogram_vec!(
        "faultline_latency_injected_ms",
        "Histogram of injected latency in milliseconds",
        &["rule_id"],
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]
    )
    .unwrap();

    /// TCP connections accepted by the L4 proxy.
    pub static ref TCP_CONNECTIONS_TOTAL: CounterVec = register_counter_vec!(
        "faultline_tcp_connections_total",
        "Total number of TCP connections accepted",
        &["listen", "outcome"]
    )
    .unwrap();

    /// Bytes copied through the TCP proxy.
    pub static ref TCP_BYTES_TOTAL: CounterVec = register_counter_vec!(
        "faultline_tcp_bytes_total",
        "Total bytes copied through the TCP proxy",
        &["listen", "direction"]
    )
    .unwrap();

    /// Chunks dropped by the TCP proxy's drop fault.
    pub static ref TCP_CHUNKS_DROPPED_TOTAL: CounterVec = register_counter_vec!(
        "faultline_tcp_chunks_dropped_total",
        "Total number of TCP chunks silently dropped",
        &["listen"]
    )
    .unwrap();
}

pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

pub fn record_http_request(method: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

pub fn record_fault(protocol: &str, failure_type: &str, rule_id: &str) {
    FAULTS_INJECTED_TOTAL
        .with_label_values(&[protocol, failure_type, rule_id])
        .inc();
}

pub fn record_latency_injected(rule_id: &str, ms: u64) {
    LATENCY_INJECTED_MS
        .with_label_values(&[rule_id])
        .observe(ms as f64);
}

pub fn record_tcp_connection(listen: &str, outcome: &str) {
    TCP_CONNECTIONS_TOTAL
        .with_label_values(&[listen, outcome])
        .inc();
}

pub fn record_tcp_bytes(listen: &str, direction: &str, bytes: u64) {
    TCP_BYTES_TOTAL
        .with_label_values(&[listen, direction])
        .inc_by(bytes as f64);
}

pub fn record_tcp_chunk_dropped(listen: &str) {
    TCP_CHUNKS_DROPPED_TOTAL.with_label_values(&[listen]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_metrics_contains_registered_family() {
        record_http_request("GET", 200);
        let text = collect_metrics();
        assert!(text.contains("faultline_http_requests_total"));
    }

    #[test]
    fn record_fault_increments_counter() {
        record_fault("http", "latency", "rule-1");
        let before = FAULTS_INJECTED_TOTAL
            .with_label_values(&["http", "latency", "rule-1"])
            .get();
        record_fault("http", "latency", "rule-1");
        let after = FAULTS_INJECTED_TOTAL
            .with_label_values(&["http", "latency", "rule-1"])
            .get();
        assert_eq!(after, before + 1.0);
    }
}
