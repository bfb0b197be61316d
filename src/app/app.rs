// Main gate application implementation.

use anyhow::{Context, Result};
use std::sync::{Arc, Weak};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{self, Config, ConfigTrait};
use crate::gate::{Gate, ManagedService, Registry};
use crate::liveness;
use crate::orchestrator::docker::DEFAULT_CALL_TIMEOUT;
use crate::orchestrator::{Coordinator, DockerOrchestrator, Endpoint, Orchestrator, DEFAULT_POLL_INTERVAL};
use crate::shutdown::GracefulShutdown;
use crate::upstream::BackendImpl;
use crate::workers::IdleChecker;

use super::server::HttpServer;

/// Builds the orchestrator client for one configured service.
pub type OrchestratorFactory<'a> =
    dyn Fn(&config::Service) -> Result<Arc<dyn Orchestrator>> + Send + Sync + 'a;

/// Encapsulates the entire gate application state.
#[derive(Clone)]
pub struct App {
    shutdown_token: CancellationToken,
    registry: Arc<Registry>,
    checkers: Vec<Arc<IdleChecker>>,
    probe: Arc<liveness::Probe>,
    server: Arc<HttpServer>,
}

/// Docker Engine client for `service`, honoring the per-service endpoint override.
pub fn docker_orchestrator(
    global: &config::Orchestrator,
    service: &config::Service,
) -> Result<Arc<dyn Orchestrator>> {
    let raw = service
        .orchestrator_endpoint
        .as_deref()
        .or(global.endpoint.as_deref());
    let endpoint = Endpoint::resolve(raw)
        .with_context(|| format!("resolve orchestrator endpoint of {}", service.service_name))?;
    let timeout = global.timeout.unwrap_or(DEFAULT_CALL_TIMEOUT);

    info!(
        component = "app",
        event = "orchestrator_configured",
        service = %service.service_name,
        endpoint = ?endpoint,
        timeout = ?timeout,
        "orchestrator endpoint resolved"
    );
    Ok(Arc::new(DockerOrchestrator::new(endpoint, timeout)))
}

impl App {
    /// Creates a new gate application talking to the Docker Engine API.
    pub async fn new(
        shutdown_token: CancellationToken,
        cfg: Config,
        probe: Arc<liveness::Probe>,
    ) -> Result<Self> {
        let global = cfg.orchestrator().cloned().unwrap_or_default();
        Self::with_orchestrators(shutdown_token, cfg, probe, &|service| {
            docker_orchestrator(&global, service)
        })
        .await
    }

    /// Creates a new gate application with orchestrators built by `factory`.
    ///
    /// Every service is described once before anything is served: a missing
    /// or non-replicated service fails startup.
    pub async fn with_orchestrators(
        shutdown_token: CancellationToken,
        mut cfg: Config,
        probe: Arc<liveness::Probe>,
        factory: &OrchestratorFactory<'_>,
    ) -> Result<Self> {
        cfg.validate().context("invalid configuration")?;

        let poll_interval = cfg
            .orchestrator()
            .and_then(|o| o.poll_interval)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let mut services = Vec::with_capacity(cfg.services().len());
        let mut checkers = Vec::with_capacity(cfg.services().len());
        for service in cfg.services() {
            let name = service.service_name.as_str();
            let coordinator =
                Coordinator::new(name, factory(service)?).with_poll_interval(poll_interval);

            let ds = coordinator
                .describe()
                .await
                .with_context(|| format!("validate managed service {name}"))?;
            info!(
                component = "app",
                event = "service_validated",
                service = %name,
                service_id = %ds.id,
                desired = ds.desired_replicas,
                running = ds.running_count,
                keep_alive = ?service.keep_alive(),
                scale_timeout = ?service.scale_timeout(),
                "managed service found"
            );

            let gate = Arc::new(Gate::new(Arc::new(coordinator), service.scale_timeout()));
            let upstream = BackendImpl::new(name, service.backend.as_ref())
                .with_context(|| format!("create backend of {name}"))?;

            services.push(Arc::new(ManagedService::new(
                gate.clone(),
                upstream,
                service.keep_alive(),
                service.hosts.clone(),
                service.path_prefix.clone(),
            )));
            checkers.push(IdleChecker::new(
                shutdown_token.clone(),
                gate,
                service.keep_alive(),
            ));
        }

        let registry = Arc::new(Registry::new(services));
        let server = Arc::new(HttpServer::new(
            shutdown_token.clone(),
            cfg,
            registry.clone(),
            probe.clone(),
        )?);

        Ok(Self {
            shutdown_token,
            registry,
            checkers,
            probe,
            server,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn checkers(&self) -> &[Arc<IdleChecker>] {
        &self.checkers
    }

    pub fn probe(&self) -> &Arc<liveness::Probe> {
        &self.probe
    }

    /// Serves on the configured port; see [`App::serve_on`].
    pub async fn serve(&self, gsh: Arc<GracefulShutdown>) -> Result<()> {
        self.start(gsh, None)
    }

    /// Starts the idle checkers and the HTTP server in background tasks.
    ///
    /// `gsh.done()` is called once the server has stopped and the app is closed.
    pub async fn serve_on(&self, listener: TcpListener, gsh: Arc<GracefulShutdown>) -> Result<()> {
        self.start(gsh, Some(listener))
    }

    fn start(&self, gsh: Arc<GracefulShutdown>, listener: Option<TcpListener>) -> Result<()> {
        // Register liveness target before serving. The probe is owned by the
        // server's router, so it must not hold the server strongly.
        self.probe.watch(vec![
            Arc::new(ServerLiveness(Arc::downgrade(&self.server))) as Arc<dyn liveness::Service>
        ]);

        for checker in &self.checkers {
            checker.serve();
        }

        let server = self.server.clone();
        let app_for_close = self.clone();
        tokio::task::spawn(async move {
            let served = match listener {
                Some(listener) => server.serve(listener).await,
                None => server.listen_and_serve().await,
            };
            if let Err(e) = served {
                error!(
                    component = "app",
                    scope = "server",
                    event = "serve_failed",
                    error = %format!("{e:#}"),
                    "server failed to serve"
                );
            }

            app_for_close.close();

            // Signal graceful shutdown
            gsh.done();
        });

        info!(
            component = "app",
            event = "started",
            services = self.registry.services().len(),
            "application lifecycle"
        );

        Ok(())
    }

    /// Stops checkers and pending waiters. Services are left as they are.
    pub fn close(&self) {
        self.shutdown_token.cancel();

        info!(
            component = "app",
            event = "stopped",
            "application lifecycle"
        );
    }
}

/// Checks whether the HTTP server is still alive.
fn server_is_alive(server: &HttpServer) -> bool {
    if !server.is_alive() {
        warn!(
            component = "app",
            scope = "http_server",
            event = "gone_away",
            "http server has gone away"
        );
        return false;
    }
    true
}

/// Liveness target registered with the probe: the HTTP server, weakly held.
struct ServerLiveness(Weak<HttpServer>);

#[async_trait::async_trait]
impl liveness::Service for ServerLiveness {
    async fn is_alive(&self) -> bool {
        match self.0.upgrade() {
            Some(server) => server_is_alive(&server),
            None => false,
        }
    }
}
