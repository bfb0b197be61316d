//! HTTP server: admin routes, the gated forwarding fallback and the
//! layers around them.

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{Config, ConfigTrait};
use crate::controller::controller::Controller;
use crate::middleware::middleware::Middleware;

/// Upper bound for admin endpoints. Proxied requests are bounded by the
/// gate's scale timeout and the backend timeout instead.
pub const ADMIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Server trait for HTTP server operations.
#[async_trait::async_trait]
pub trait Server: Send + Sync {
    /// Binds the configured port and serves until shutdown.
    async fn listen_and_serve(&self) -> Result<()>;

    /// Serves on an already bound listener until shutdown.
    async fn serve(&self, listener: TcpListener) -> Result<()>;
}

/// HTTP server implementation.
pub struct HttpServer {
    shutdown_token: CancellationToken,
    config: Config,
    router: Router,
}

impl HttpServer {
    /// Creates a new HTTP server.
    ///
    /// `controllers` are admin endpoints served as is. `proxy` controllers
    /// handle managed-service traffic and are wrapped by `proxy_middlewares`.
    /// `middlewares` wrap everything.
    pub fn new(
        shutdown_token: CancellationToken,
        config: Config,
        controllers: Vec<Box<dyn Controller>>,
        proxy: Vec<Box<dyn Controller>>,
        proxy_middlewares: Vec<Box<dyn Middleware>>,
        middlewares: Vec<Box<dyn Middleware>>,
    ) -> Result<Arc<Self>> {
        let admin = Self::build_router(controllers).layer(TimeoutLayer::new(ADMIN_TIMEOUT));
        let proxy = Self::merge_middlewares(Self::build_router(proxy), proxy_middlewares);
        let router = Self::merge_middlewares(admin.merge(proxy), middlewares)
            .layer(TraceLayer::new_for_http());

        Ok(Arc::new(Self {
            shutdown_token,
            config,
            router,
        }))
    }

    fn name(&self) -> &str {
        self.config
            .api()
            .and_then(|api| api.name.as_deref())
            .unwrap_or("scalegate")
    }

    /// Resolves the listen address from `api.port`.
    pub fn addr(&self) -> Result<SocketAddr> {
        let api_cfg = self.config.api().context("API configuration is required")?;
        let port = api_cfg.port.as_deref().unwrap_or("8080");

        let port = port.trim_start_matches(':');
        format!("0.0.0.0:{port}")
            .parse()
            .with_context(|| format!("invalid api.port {port:?}"))
    }

    /// Starts the HTTP server (async version).
    pub async fn listen_and_serve(&self) -> Result<()> {
        let addr = self.addr()?;
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;
        self.serve(listener).await
    }

    /// Serves requests on `listener` until the shutdown token is cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let name = self.name().to_string();
        let addr = listener
            .local_addr()
            .context("Failed to read listener address")?;

        info!(
            component = "server",
            event = "started",
            name = %name,
            addr = %addr,
            "server started"
        );

        let shutdown_token = self.shutdown_token.clone();
        let serving =
            axum::serve(listener, self.router.clone()).with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            });

        if let Err(e) = serving.await {
            error!(
                component = "server",
                event = "listen_and_serve_failed",
                name = %name,
                addr = %addr,
                error = %e,
                "server failed to listen and serve"
            );
            return Err(e.into());
        }

        info!(
            component = "server",
            event = "stopped",
            name = %name,
            addr = %addr,
            "server stopped"
        );

        Ok(())
    }

    fn build_router(controllers: Vec<Box<dyn Controller>>) -> Router {
        controllers
            .iter()
            .fold(Router::new(), |router, controller| controller.add_route(router))
    }

    /// Wraps `router` so that the first middleware in the list sees requests first.
    fn merge_middlewares(router: Router, middlewares: Vec<Box<dyn Middleware>>) -> Router {
        middlewares
            .iter()
            .rev()
            .fold(router, |router, middleware| middleware.apply(router))
    }
}

#[async_trait::async_trait]
impl Server for HttpServer {
    async fn listen_and_serve(&self) -> Result<()> {
        HttpServer::listen_and_serve(self).await
    }

    async fn serve(&self, listener: TcpListener) -> Result<()> {
        HttpServer::serve(self, listener).await
    }
}
