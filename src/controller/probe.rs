// Liveness probe controller.

use axum::{http::StatusCode, response::Response, routing::get, Router};
use std::sync::Arc;

use crate::http::render::write_status;
use crate::http::Controller;
use crate::liveness;

pub const PROBE_PATH: &str = "/k8s/probe";

/// LivenessProbeController answers the orchestrator's liveness checks.
#[derive(Clone)]
pub struct LivenessProbeController {
    probe: Arc<liveness::Probe>,
}

impl LivenessProbeController {
    pub fn new(probe: Arc<liveness::Probe>) -> Self {
        Self { probe }
    }

    async fn probe(&self) -> Response {
        if self.probe.is_alive().await {
            write_status(StatusCode::OK, "gate is serving")
        } else {
            write_status(StatusCode::SERVICE_UNAVAILABLE, "gate is not serving")
        }
    }
}

impl Controller for LivenessProbeController {
    fn add_route(&self, router: Router) -> Router {
        let controller = self.clone();
        router.route(
            PROBE_PATH,
            get(move || {
                let controller = controller.clone();
                async move { controller.probe().await }
            }),
        )
    }
}
