//! Prometheus metrics of the gates and workers.
//
//! Recorded through the `metrics` facade; rendered by the `/metrics`
//! controller once the Prometheus recorder is installed. Without a recorder
//! every call is a no-op, which is what unit tests rely on.

pub const ADMITTED: &str = "scalegate_admitted_total";
pub const SCALE_UPS: &str = "scalegate_scale_ups_total";
pub const SCALE_UP_FAILURES: &str = "scalegate_scale_up_failures_total";
pub const SCALE_DOWNS: &str = "scalegate_scale_downs_total";
pub const SCALE_DOWN_FAILURES: &str = "scalegate_scale_down_failures_total";
pub const REJECTED: &str = "scalegate_rejected_total";
pub const UPSTREAM_ERRORS: &str = "scalegate_upstream_errors_total";
pub const GATE_ACTIVE: &str = "scalegate_gate_active";
pub const PANICS: &str = "scalegate_panics_total";

const SERVICE: &str = "service";
const KIND: &str = "kind";

/// Counts a request let through the gate.
pub fn inc_admitted(service: &str) {
    metrics::counter!(ADMITTED, SERVICE => service.to_string()).increment(1);
}

/// Counts a completed scale-up.
pub fn inc_scale_ups(service: &str) {
    metrics::counter!(SCALE_UPS, SERVICE => service.to_string()).increment(1);
}

/// Counts a failed scale-up by error kind.
pub fn inc_scale_up_failures(service: &str, kind: &'static str) {
    metrics::counter!(SCALE_UP_FAILURES, SERVICE => service.to_string(), KIND => kind).increment(1);
}

/// Counts an accepted scale-down.
pub fn inc_scale_downs(service: &str) {
    metrics::counter!(SCALE_DOWNS, SERVICE => service.to_string()).increment(1);
}

/// Counts a failed scale-down by error kind.
pub fn inc_scale_down_failures(service: &str, kind: &'static str) {
    metrics::counter!(SCALE_DOWN_FAILURES, SERVICE => service.to_string(), KIND => kind)
        .increment(1);
}

/// Counts a request rejected by the gate.
pub fn inc_rejected(service: &str, kind: &'static str) {
    metrics::counter!(REJECTED, SERVICE => service.to_string(), KIND => kind).increment(1);
}

/// Counts a failed forward to the backend.
pub fn inc_upstream_errors(service: &str) {
    metrics::counter!(UPSTREAM_ERRORS, SERVICE => service.to_string()).increment(1);
}

/// Exposes whether the gate currently lets requests through.
pub fn set_gate_active(service: &str, active: bool) {
    metrics::gauge!(GATE_ACTIVE, SERVICE => service.to_string()).set(if active { 1.0 } else { 0.0 });
}

/// Counts a handler panic turned into a 500.
pub fn inc_panics() {
    metrics::counter!(PANICS).increment(1);
}
