// Gate status endpoint.

use axum::{http::StatusCode, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;

use crate::gate::{GateState, Registry};
use crate::http::render::write_json;
use crate::http::Controller;

pub const STATUS_PATH: &str = "/scalegate/status";

#[derive(Debug, Serialize)]
pub struct GateStatus {
    pub service: String,
    pub state: GateState,
    /// Seconds since the last admitted request, only while active.
    pub idle_secs: Option<u64>,
    pub keep_alive_secs: u64,
    pub scale_timeout_secs: u64,
    pub backend: String,
}

/// StatusController reports the state of every gate.
pub struct StatusController {
    registry: Arc<Registry>,
}

impl StatusController {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

/// Collects a point-in-time view of all gates.
pub fn collect(registry: &Registry, now: Instant) -> Vec<GateStatus> {
    registry
        .services()
        .iter()
        .map(|s| {
            let snap = s.gate.snapshot();
            GateStatus {
                service: s.name().to_string(),
                state: snap.state,
                idle_secs: snap
                    .is_active()
                    .then(|| now.saturating_duration_since(snap.last_active).as_secs()),
                keep_alive_secs: s.keep_alive.as_secs(),
                scale_timeout_secs: s.gate.scale_timeout().as_secs(),
                backend: s.upstream.target().to_string(),
            }
        })
        .collect()
}

impl Controller for StatusController {
    fn add_route(&self, router: Router) -> Router {
        let registry = self.registry.clone();
        router.route(
            STATUS_PATH,
            get(move || {
                let registry = registry.clone();
                async move {
                    let statuses = collect(&registry, Instant::now());
                    write_json(StatusCode::OK, &statuses)
                }
            }),
        )
    }
}
