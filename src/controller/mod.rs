// HTTP controllers: admin endpoints and the forwarding handler.

pub mod controller;
pub mod metrics;
pub mod probe;
pub mod proxy;
pub mod status;

// Re-export controller types for convenience
pub use metrics::PrometheusMetricsController;
pub use probe::LivenessProbeController;
pub use proxy::ProxyController;
pub use status::StatusController;
