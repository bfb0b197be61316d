// HTTP server of the gate application.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::gate::Registry;
use crate::http::{Controller, Middleware, Server as HttpServerTrait};
use crate::liveness;

/// HTTP server implementation that wraps all dependencies.
pub struct HttpServer {
    server: Arc<dyn HttpServerTrait>,
    is_server_alive: AtomicBool,
}

impl HttpServer {
    /// Creates a new HttpServer with admin and proxy routes.
    pub fn new(
        ctx: CancellationToken,
        cfg: Config,
        registry: Arc<Registry>,
        probe: Arc<liveness::Probe>,
    ) -> Result<Self> {
        let server = crate::http::HttpServer::new(
            ctx.clone(),
            cfg,
            Self::controllers(registry.clone(), probe),
            Self::proxy_controllers(),
            Self::proxy_middlewares(ctx, registry),
            Self::middlewares(),
        )?;

        Ok(Self {
            server,
            is_server_alive: AtomicBool::new(false),
        })
    }

    /// Returns true if the server is marked as alive.
    pub fn is_alive(&self) -> bool {
        self.is_server_alive.load(Ordering::Relaxed)
    }

    /// Starts the HTTP server on the configured port (blocking call).
    pub async fn listen_and_serve(&self) -> Result<()> {
        self.is_server_alive.store(true, Ordering::Relaxed);
        let result = self.server.listen_and_serve().await;
        self.is_server_alive.store(false, Ordering::Relaxed);
        result
    }

    /// Starts the HTTP server on a bound listener (blocking call).
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.is_server_alive.store(true, Ordering::Relaxed);
        let result = self.server.serve(listener).await;
        self.is_server_alive.store(false, Ordering::Relaxed);
        result
    }

    /// Admin endpoints, never gated.
    fn controllers(registry: Arc<Registry>, probe: Arc<liveness::Probe>) -> Vec<Box<dyn Controller>> {
        use crate::controller;

        vec![
            // Healthcheck probe endpoint
            Box::new(controller::LivenessProbeController::new(probe)),
            // Metrics endpoint
            Box::new(controller::PrometheusMetricsController::new()),
            // Gate states
            Box::new(controller::StatusController::new(registry)),
        ]
    }

    /// Managed-service traffic.
    fn proxy_controllers() -> Vec<Box<dyn Controller>> {
        vec![Box::new(crate::controller::ProxyController::new())]
    }

    fn proxy_middlewares(ctx: CancellationToken, registry: Arc<Registry>) -> Vec<Box<dyn Middleware>> {
        vec![Box::new(crate::middleware::ActivationMiddleware::new(ctx, registry))]
    }

    /// Returns the middlewares wrapping every route, executed in order.
    fn middlewares() -> Vec<Box<dyn Middleware>> {
        vec![
            // Exec first - panic recovery
            Box::new(crate::middleware::PanicRecoverMiddleware::new()),
        ]
    }
}
