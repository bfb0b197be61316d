// Gate server bootstrap for integration tests.

use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::orchestrator::FakeOrchestrator;
use super::upstream::wait_http_ready;
use crate::app::App;
use crate::config::{self, Config};
use crate::controller::probe::PROBE_PATH;
use crate::liveness;
use crate::orchestrator::Orchestrator;
use crate::shutdown::GracefulShutdown;

/// Points the backend of every configured service at `addr`.
pub fn point_backends(cfg: &mut Config, addr: &str) {
    for service in cfg.gate.services.iter_mut() {
        if let Some(backend) = service.backend.as_mut() {
            backend.host = Some(addr.to_string());
        }
    }
}

/// A running gate on an ephemeral port, backed by fake orchestrators.
pub struct GateServer {
    addr: String,
    app: App,
    shutdown_token: CancellationToken,
    gsh: Arc<GracefulShutdown>,
    fakes: HashMap<String, Arc<FakeOrchestrator>>,
}

impl GateServer {
    /// Builds the app from `cfg` and serves it. Every configured service
    /// needs a fake of the same name in `fakes`.
    pub async fn start(cfg: Config, fakes: Vec<FakeOrchestrator>) -> anyhow::Result<Self> {
        let fakes: HashMap<String, Arc<FakeOrchestrator>> = fakes
            .into_iter()
            .map(|fake| (fake.name(), Arc::new(fake)))
            .collect();

        let lookup = fakes.clone();
        let factory = move |service: &config::Service| -> anyhow::Result<Arc<dyn Orchestrator>> {
            lookup
                .get(&service.service_name)
                .cloned()
                .map(|fake| fake as Arc<dyn Orchestrator>)
                .with_context(|| format!("no fake orchestrator for {}", service.service_name))
        };

        let shutdown_token = CancellationToken::new();
        let probe = Arc::new(liveness::Probe::new(Duration::from_secs(1)));
        let app = App::with_orchestrators(shutdown_token.clone(), cfg, probe, &factory).await?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = format!("127.0.0.1:{}", listener.local_addr()?.port());

        let gsh = Arc::new(GracefulShutdown::new(shutdown_token.clone()));
        gsh.add(1);
        app.serve_on(listener, gsh.clone()).await?;

        wait_http_ready(&format!("http://{addr}{PROBE_PATH}")).await;

        Ok(Self {
            addr,
            app,
            shutdown_token,
            gsh,
            fakes,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// The fake orchestrator behind service `name`.
    pub fn fake(&self, name: &str) -> Arc<FakeOrchestrator> {
        self.fakes
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("no fake orchestrator for {name}"))
    }

    /// Cancels the app and waits until the server has stopped.
    pub async fn stop(self) {
        self.shutdown_token.cancel();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.gsh.pending() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
