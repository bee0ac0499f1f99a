//! Prometheus metrics
//!
//! Exposes the operational metrics scraped from `/metrics`:
//! - Request rates and latencies
//! - Graph mutations by operation
//! - Failures by error code
//! - Graph size
//!
//! NOTE: No user or entity ids in labels; they would explode cardinality.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

use crate::graph::GraphStats;

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Request Metrics
    // ============================================================================

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "graphjs_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method", "endpoint", "status"]
    ).unwrap();

    /// Total HTTP requests
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("graphjs_http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    // ============================================================================
    // Graph Metrics
    // ============================================================================

    /// Graph mutations by gateway operation (start_thread, join, destroy, ...)
    pub static ref GRAPH_MUTATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("graphjs_graph_mutations_total", "Total graph mutations by operation"),
        &["operation"]
    ).unwrap();

    pub static ref GRAPH_NODES: IntGauge = IntGauge::new(
        "graphjs_graph_nodes",
        "Number of nodes in the graph"
    ).unwrap();

    pub static ref GRAPH_EDGES: IntGauge = IntGauge::new(
        "graphjs_graph_edges",
        "Number of edges in the graph"
    ).unwrap();

    // ============================================================================
    // Error Metrics
    // ============================================================================

    /// Failure envelopes sent, by machine code
    pub static ref FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("graphjs_failures_total", "Failure responses by error code"),
        &["code"]
    ).unwrap();

    /// Login attempts by outcome
    pub static ref LOGIN_ATTEMPTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("graphjs_login_attempts_total", "Login attempts by result"),
        &["result"]
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    METRICS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;

    METRICS_REGISTRY.register(Box::new(GRAPH_MUTATIONS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(GRAPH_NODES.clone()))?;
    METRICS_REGISTRY.register(Box::new(GRAPH_EDGES.clone()))?;

    METRICS_REGISTRY.register(Box::new(FAILURES_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(LOGIN_ATTEMPTS_TOTAL.clone()))?;

    Ok(())
}

/// Refresh the graph size gauges, called before every scrape
pub fn update_graph_gauges(stats: GraphStats) {
    GRAPH_NODES.set(stats.node_count as i64);
    GRAPH_EDGES.set(stats.edge_count as i64);
}
