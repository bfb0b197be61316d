// Liveness probe behind the `/k8s/probe` endpoint.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

pub mod error;
pub mod service;

pub use error::TimeoutIsTooShortError;
pub use service::Service;

const MIN_TIMEOUT: Duration = Duration::from_millis(1);
const FALLBACK_TIMEOUT: Duration = Duration::from_millis(10);

/// Probe is alive when every watched service answers alive in time.
pub struct Probe {
    services: RwLock<Vec<Arc<dyn Service>>>,
    timeout: Duration,
}

impl Probe {
    /// Creates a probe bounding each check by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let timeout = if timeout < MIN_TIMEOUT {
            let err = TimeoutIsTooShortError {
                requested: timeout,
                fallback: FALLBACK_TIMEOUT,
            };
            warn!(component = "liveness", error = %err, "probe timeout replaced");
            FALLBACK_TIMEOUT
        } else {
            timeout
        };

        Self {
            services: RwLock::new(Vec::new()),
            timeout,
        }
    }

    /// Registers services to check. Nothing is alive before the first call.
    pub fn watch(&self, services: Vec<Arc<dyn Service>>) {
        self.services.write().extend(services);
    }

    /// Checks that every watched service is alive within the probe timeout.
    pub async fn is_alive(&self) -> bool {
        let services = self.services.read().clone();
        if services.is_empty() {
            return false;
        }

        let check = async {
            for service in &services {
                if !service.is_alive().await {
                    return false;
                }
            }
            true
        };

        match timeout(self.timeout, check).await {
            Ok(alive) => alive,
            Err(_) => {
                warn!(
                    component = "liveness",
                    timeout = ?self.timeout,
                    "liveness probe deadline exceeded while checking service"
                );
                false
            }
        }
    }
}
