// Package checker scales a managed service down once it has been idle for
// longer than its keep-alive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gate::Gate;
use crate::metrics;
use crate::orchestrator::ScaleError;

/// The checker never ticks more often than this.
pub const MIN_CHECK_PERIOD: Duration = Duration::from_secs(1);

/// Tick period for a keep-alive: a tenth of it, floored at [`MIN_CHECK_PERIOD`].
pub fn check_period(keep_alive: Duration) -> Duration {
    (keep_alive / 10).max(MIN_CHECK_PERIOD)
}

/// IdleChecker watches one gate.
pub struct IdleChecker {
    shutdown_token: CancellationToken,
    gate: Arc<Gate>,
    keep_alive: Duration,
    period: Duration,
    inited: AtomicBool,
}

impl IdleChecker {
    /// Creates a new checker for `gate`.
    pub fn new(shutdown_token: CancellationToken, gate: Arc<Gate>, keep_alive: Duration) -> Arc<Self> {
        Arc::new(Self {
            shutdown_token,
            gate,
            keep_alive,
            period: check_period(keep_alive),
            inited: AtomicBool::new(false),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Starts the checker loop. Returns `None` if it is already running.
    pub fn serve(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self
            .inited
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }

        let checker = self.clone();
        Some(tokio::spawn(async move { checker.loop_worker().await }))
    }

    async fn loop_worker(&self) {
        info!(
            component = "checker",
            event = "started",
            service = %self.gate.name(),
            keep_alive = ?self.keep_alive,
            period = ?self.period,
            "idle checker started"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    info!(
                        component = "checker",
                        event = "stopped",
                        service = %self.gate.name(),
                        "idle checker stopped"
                    );
                    return;
                }
                _ = ticker.tick() => {
                    self.check(Instant::now());
                }
            }
        }
    }

    /// Runs one tick at `now`. Returns true when a scale-down was started.
    pub fn check(&self, now: Instant) -> bool {
        let snap = self.gate.snapshot();
        if !snap.is_active() {
            return false;
        }

        let elapsed = now.saturating_duration_since(snap.last_active);
        if elapsed < self.keep_alive {
            return false;
        }

        if !self.gate.try_expire(snap.last_active, now, self.keep_alive) {
            debug!(
                component = "checker",
                event = "expiry_aborted",
                service = %self.gate.name(),
                "gate was touched after the snapshot"
            );
            return false;
        }

        info!(
            component = "checker",
            event = "idle",
            service = %self.gate.name(),
            idle_for = ?elapsed,
            "keep-alive elapsed, scaling service down"
        );
        self.spawn_scale_down();
        true
    }

    fn spawn_scale_down(&self) {
        let scaler = self.gate.scaler();
        let shutdown_token = self.shutdown_token.clone();
        let timeout = self.gate.scale_timeout();

        tokio::spawn(async move {
            let service = scaler.service_name().to_string();
            let result = match tokio::time::timeout(timeout, scaler.scale_down(&shutdown_token)).await {
                Ok(result) => result,
                Err(_) => Err(ScaleError::orchestrator(anyhow::anyhow!(
                    "scale-down did not complete within {timeout:?}"
                ))),
            };

            match result {
                Ok(()) => {
                    metrics::inc_scale_downs(&service);
                    info!(
                        component = "checker",
                        event = "scaled_down",
                        service = %service,
                        "service scaled down"
                    );
                }
                Err(err) => {
                    metrics::inc_scale_down_failures(&service, err.kind());
                    warn!(
                        component = "checker",
                        event = "scale_down_failed",
                        service = %service,
                        kind = err.kind(),
                        error = %err,
                        "scale-down failed"
                    );
                }
            }
        });
    }
}
