// Package upstream forwards admitted requests to managed services.

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, Response};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
    #[error("invalid upstream uri {0}")]
    InvalidUri(String),
}

/// Upstream defines the interface for a managed service's backend.
#[async_trait::async_trait]
pub trait Upstream: Send + Sync {
    /// Forwards one request and returns the backend's response as is,
    /// minus hop-by-hop headers.
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>>;

    /// Base URL requests are forwarded to.
    fn target(&self) -> &str;
}
