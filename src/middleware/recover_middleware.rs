//! Panic recovery middleware.
//

use axum::{http::StatusCode, response::Response};
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::error;

use crate::http::render::write_status;
use crate::metrics;

/// PanicRecoverMiddleware turns a panicking handler into a 500 response.
pub struct PanicRecoverMiddleware;

impl PanicRecoverMiddleware {
    /// Creates a new panic recovery middleware.
    pub fn new() -> Self {
        Self
    }
}

impl Default for PanicRecoverMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

fn recover(panic: Box<dyn Any + Send + 'static>) -> Response {
    let reason = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    metrics::inc_panics();
    error!(
        component = "server",
        event = "panic_recovered",
        reason = %reason,
        "handler panicked"
    );
    write_status(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

// Implementation of Middleware trait
impl crate::middleware::middleware::Middleware for PanicRecoverMiddleware {
    fn apply(&self, router: axum::Router) -> axum::Router {
        router.layer(CatchPanicLayer::custom(recover))
    }
}
