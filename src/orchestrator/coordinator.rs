//! Scale-up and scale-down coordination against the orchestrator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::api::{Orchestrator, ServiceDescriptor};
use super::error::ScaleError;

/// Default interval between two readiness polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Scaler is what the gate and the idle checker drive.
#[async_trait::async_trait]
pub trait Scaler: Send + Sync {
    /// Name of the managed service.
    fn service_name(&self) -> &str;

    /// Brings the service to at least one running replica before `deadline`.
    async fn scale_up(&self, cancel: &CancellationToken, deadline: Instant) -> Result<(), ScaleError>;

    /// Announces a scale-down that is about to be issued.
    ///
    /// Called under the gate lock when the gate expires, so it is ordered
    /// before any scale-up the next request starts. A scale-up that succeeds
    /// before the announced scale-down runs cancels it.
    fn reserve_scale_down(&self);

    /// Requests zero replicas. Does not wait for the tasks to drain.
    async fn scale_down(&self, cancel: &CancellationToken) -> Result<(), ScaleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingDown {
    None,
    Reserved,
    // A scale-up completed after the reservation; the scale-down is stale.
    Superseded,
}

/// Coordinator performs the orchestrator calls for a single service.
pub struct Coordinator {
    service_name: String,
    orchestrator: Arc<dyn Orchestrator>,
    poll_interval: Duration,
    // Serializes scale-up and scale-down of this service within the process.
    ops: Mutex<()>,
    pending_down: parking_lot::Mutex<PendingDown>,
}

impl Coordinator {
    pub fn new(service_name: impl Into<String>, orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self {
            service_name: service_name.into(),
            orchestrator,
            poll_interval: DEFAULT_POLL_INTERVAL,
            ops: Mutex::new(()),
            pending_down: parking_lot::Mutex::new(PendingDown::None),
        }
    }

    /// Overrides the readiness poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.poll_interval = interval;
        }
        self
    }

    /// Fetches a fresh descriptor and checks that the service can be scaled.
    ///
    /// Used both at startup validation and before every mutation.
    pub async fn describe(&self) -> Result<ServiceDescriptor, ScaleError> {
        let ds = self.orchestrator.describe_service(&self.service_name).await?;
        if !ds.is_replicated() {
            return Err(ScaleError::InvalidMode(self.service_name.clone()));
        }
        Ok(ds)
    }

    // Must run while `ops` is held, right before a successful scale-up returns.
    fn supersede_pending_down(&self) {
        let mut pending = self.pending_down.lock();
        if *pending == PendingDown::Reserved {
            *pending = PendingDown::Superseded;
        }
    }

    async fn do_scale_up(&self, deadline: Instant, timeout: Duration) -> Result<(), ScaleError> {
        let _ops = self.ops.lock().await;

        let ds = self.describe().await?;
        if ds.running_count > 0 {
            debug!(
                component = "coordinator",
                event = "scale_up_skipped",
                service = %self.service_name,
                running = ds.running_count,
                "service already running"
            );
            self.supersede_pending_down();
            return Ok(());
        }

        self.orchestrator.update_replicas(&ds.id, ds.version, 1).await?;
        info!(
            component = "coordinator",
            event = "scale_up_requested",
            service = %self.service_name,
            service_id = %ds.id,
            version = ds.version,
            "replicas set to 1"
        );

        loop {
            let running = self.orchestrator.list_running_tasks(&ds.id).await?;
            if running > 0 {
                info!(
                    component = "coordinator",
                    event = "scale_up_ready",
                    service = %self.service_name,
                    running,
                    "service is ready"
                );
                self.supersede_pending_down();
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ScaleError::WakeTimeout {
                    service: self.service_name.clone(),
                    timeout,
                });
            }
            debug!(
                component = "coordinator",
                event = "scale_up_polling",
                service = %self.service_name,
                "no running tasks yet"
            );
            sleep_until((now + self.poll_interval).min(deadline)).await;
        }
    }

    async fn do_scale_down(&self) -> Result<(), ScaleError> {
        let _ops = self.ops.lock().await;

        let pending = std::mem::replace(&mut *self.pending_down.lock(), PendingDown::None);
        if pending == PendingDown::Superseded {
            debug!(
                component = "coordinator",
                event = "scale_down_superseded",
                service = %self.service_name,
                "service was woken up again before the scale-down ran"
            );
            return Ok(());
        }

        let ds = self.describe().await?;
        if ds.desired_replicas == 0 {
            debug!(
                component = "coordinator",
                event = "scale_down_skipped",
                service = %self.service_name,
                "service already scaled to zero"
            );
            return Ok(());
        }

        self.orchestrator.update_replicas(&ds.id, ds.version, 0).await?;
        info!(
            component = "coordinator",
            event = "scale_down_requested",
            service = %self.service_name,
            service_id = %ds.id,
            was = ds.desired_replicas,
            "replicas set to 0"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl Scaler for Coordinator {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    async fn scale_up(&self, cancel: &CancellationToken, deadline: Instant) -> Result<(), ScaleError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let bounded = async {
            tokio::select! {
                res = self.do_scale_up(deadline, timeout) => res,
                _ = sleep_until(deadline) => Err(ScaleError::WakeTimeout {
                    service: self.service_name.clone(),
                    timeout,
                }),
            }
        };
        cancelable(cancel, bounded).await
    }

    fn reserve_scale_down(&self) {
        *self.pending_down.lock() = PendingDown::Reserved;
    }

    async fn scale_down(&self, cancel: &CancellationToken) -> Result<(), ScaleError> {
        cancelable(cancel, self.do_scale_down()).await
    }
}

/// Runs `fut` unless `cancel` fires first. Cancellation wins ties.
pub async fn cancelable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, ScaleError>
where
    F: Future<Output = Result<T, ScaleError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ScaleError::Canceled),
        res = fut => res,
    }
}
