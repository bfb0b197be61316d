//! Hyper HTTP client used to forward requests to managed services.
//!
//! Connection pool settings:
//! - Max idle connections per host: 256
//! - Max idle connection duration: 30s
//! - Connection timeout: 3s
//! - TCP keep-alive: 30s
//! - TCP_NODELAY: enabled

use anyhow::{Context, Result};
use axum::body::Body;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::dns::GaiResolver;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

/// Connection pool configuration constants.
pub const CONNS_PER_HOST: usize = 256;
pub const MAX_IDLE_CONN_DURATION: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub type HyperClient = Client<HttpsConnector<HttpConnector<GaiResolver>>, Body>;

/// Creates a pooled client that streams axum bodies in both directions.
///
/// HTTP/1.1 only, so the client's Host header is sent as is instead of
/// being turned into `:authority`.
pub fn create_client() -> Result<HyperClient> {
    let mut http_connector = HttpConnector::new_with_resolver(GaiResolver::new());
    http_connector.set_nodelay(true);
    http_connector.set_keepalive(Some(Duration::from_secs(30)));
    http_connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
    http_connector.enforce_http(false);

    let tls = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .context("load native root certificates")?
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    Ok(Client::builder(TokioExecutor::new())
        .pool_idle_timeout(MAX_IDLE_CONN_DURATION)
        .pool_max_idle_per_host(CONNS_PER_HOST)
        .http1_title_case_headers(false)
        .build(tls))
}
