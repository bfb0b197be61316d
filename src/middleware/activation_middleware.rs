//! Activation middleware: routes a request to its managed service and holds
//! it at the service's gate until the service is up.

use axum::{
    extract::{Request, State},
    http::{header::HOST, StatusCode},
    middleware::Next,
    response::Response,
    Router,
};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::gate::Registry;
use crate::http::render::write_status;
use crate::metrics;
use crate::orchestrator::ScaleError;

/// Maps a gate failure onto the response status the client sees.
pub fn status_for(err: &ScaleError) -> StatusCode {
    match err {
        ScaleError::WakeTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ScaleError::Conflict(_) | ScaleError::Canceled => StatusCode::SERVICE_UNAVAILABLE,
        ScaleError::NotFound(_) | ScaleError::Orchestrator(_) => StatusCode::BAD_GATEWAY,
        ScaleError::InvalidMode(_) | ScaleError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

struct ActivationState {
    registry: Arc<Registry>,
    shutdown_token: CancellationToken,
}

/// ActivationMiddleware admits requests through the gate of the service they
/// are routed to and stores that service in the request extensions.
pub struct ActivationMiddleware {
    state: Arc<ActivationState>,
}

impl ActivationMiddleware {
    pub fn new(shutdown_token: CancellationToken, registry: Arc<Registry>) -> Self {
        Self {
            state: Arc::new(ActivationState {
                registry,
                shutdown_token,
            }),
        }
    }
}

async fn activation_middleware(
    State(state): State<Arc<ActivationState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host());
    let path = request.uri().path();

    let Some(service) = state.registry.route(host, path) else {
        debug!(
            component = "activation",
            event = "unrouted",
            host = ?host,
            path = %path,
            "no managed service matches request"
        );
        return write_status(StatusCode::NOT_FOUND, "no managed service matches this request");
    };

    if let Err(err) = service
        .gate
        .admit(Instant::now(), &state.shutdown_token)
        .await
    {
        metrics::inc_rejected(service.name(), err.kind());
        return write_status(status_for(&err), &err.to_string());
    }

    request.extensions_mut().insert(service);
    next.run(request).await
}

impl crate::middleware::middleware::Middleware for ActivationMiddleware {
    fn apply(&self, router: Router) -> Router {
        router.layer(axum::middleware::from_fn_with_state(
            self.state.clone(),
            activation_middleware,
        ))
    }
}
