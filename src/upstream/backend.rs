use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, Response, Uri, Version};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::proxy;
use super::{Upstream, UpstreamError};
use crate::config::{Backend, DEFAULT_BACKEND_TIMEOUT};
use crate::http::client::{create_client, HyperClient};

/// Backend forwards requests to one managed service over a pooled client.
pub struct BackendImpl {
    name: String,
    base_url: String,
    timeout: Duration,
    client: HyperClient,
}

impl BackendImpl {
    /// Creates a new instance of Backend.
    pub fn new(name: &str, cfg: Option<&Backend>) -> Result<Arc<Self>> {
        let cfg = cfg.context("backend configuration is required")?;
        let host = cfg
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .context("backend host is required")?;
        let scheme = cfg.scheme.as_deref().unwrap_or("http");

        Ok(Arc::new(Self {
            name: name.to_string(),
            base_url: format!("{scheme}://{}", host.trim_end_matches('/')),
            timeout: cfg.timeout.unwrap_or(DEFAULT_BACKEND_TIMEOUT),
            client: create_client()?,
        }))
    }

    fn target_uri(&self, uri: &Uri) -> Result<Uri> {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let target = format!("{}{}", self.base_url, path_and_query);
        target
            .parse::<Uri>()
            .map_err(|_| UpstreamError::InvalidUri(target).into())
    }
}

#[async_trait::async_trait]
impl Upstream for BackendImpl {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>> {
        let (mut parts, body) = request.into_parts();
        parts.uri = self.target_uri(&parts.uri)?;
        // The pool speaks HTTP/1.1 only.
        parts.version = Version::HTTP_11;
        proxy::prepare_request_headers(&mut parts.headers);

        debug!(
            component = "upstream",
            service = %self.name,
            method = %parts.method,
            uri = %parts.uri,
            "forwarding request"
        );

        let response = tokio::time::timeout(
            self.timeout,
            self.client.request(Request::from_parts(parts, body)),
        )
        .await
        .map_err(|_| UpstreamError::Timeout(self.timeout))?
        .with_context(|| format!("forward to {}", self.base_url))?;

        let (mut parts, body) = response.into_parts();
        proxy::strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    fn target(&self) -> &str {
        &self.base_url
    }
}
