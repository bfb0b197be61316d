// Forwarding handler for admitted managed-service traffic.

use axum::{
    extract::Request,
    http::StatusCode,
    response::Response,
    Router,
};
use std::sync::Arc;
use tracing::warn;

use crate::gate::ManagedService;
use crate::http::render::write_status;
use crate::http::Controller;
use crate::metrics;

/// ProxyController forwards every request that reached the fallback route to
/// the backend of the service chosen by the activation middleware.
pub struct ProxyController;

impl ProxyController {
    pub fn new() -> Self {
        Self
    }

    async fn forward(request: Request) -> Response {
        let Some(service) = request.extensions().get::<Arc<ManagedService>>().cloned() else {
            return write_status(StatusCode::NOT_FOUND, "no managed service matches this request");
        };

        match service.upstream.forward(request).await {
            Ok(response) => response,
            Err(err) => {
                metrics::inc_upstream_errors(service.name());
                warn!(
                    component = "proxy",
                    event = "upstream_failed",
                    service = %service.name(),
                    target = %service.upstream.target(),
                    error = %format!("{err:#}"),
                    "forwarding to backend failed"
                );
                write_status(StatusCode::BAD_GATEWAY, "backend is unavailable")
            }
        }
    }
}

impl Default for ProxyController {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller for ProxyController {
    fn add_route(&self, router: Router) -> Router {
        router.fallback(Self::forward)
    }
}
