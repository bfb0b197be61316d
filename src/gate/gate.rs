//! Activation gate: the per-service admission state machine.
//!
//! Every request routed to a managed service calls [`Gate::admit`] before it
//! is forwarded. While the service is idle the first caller becomes the
//! activator and scales it up; everybody arriving meanwhile waits on the
//! gate's condition signal and re-evaluates once the activator is done.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{GateSnapshot, GateState};
use crate::metrics;
use crate::orchestrator::{ScaleError, Scaler};

struct Inner {
    state: GateState,
    last_active: Instant,
}

enum Decision {
    Proceed,
    Activate,
    Wait,
}

/// Gate owns the `(state, last_active)` pair of exactly one managed service.
pub struct Gate {
    inner: Mutex<Inner>,
    // Broadcast whenever the state leaves `Activating`.
    changed: Notify,
    scaler: Arc<dyn Scaler>,
    scale_timeout: Duration,
}

impl Gate {
    /// Creates a gate in the `Idle` state.
    pub fn new(scaler: Arc<dyn Scaler>, scale_timeout: Duration) -> Self {
        metrics::set_gate_active(scaler.service_name(), false);
        Self {
            inner: Mutex::new(Inner {
                state: GateState::Idle,
                last_active: Instant::now(),
            }),
            changed: Notify::new(),
            scaler,
            scale_timeout,
        }
    }

    /// Name of the managed service.
    pub fn name(&self) -> &str {
        self.scaler.service_name()
    }

    pub fn scaler(&self) -> Arc<dyn Scaler> {
        self.scaler.clone()
    }

    pub fn scale_timeout(&self) -> Duration {
        self.scale_timeout
    }

    pub fn state(&self) -> GateState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> GateSnapshot {
        let inner = self.inner.lock();
        GateSnapshot {
            state: inner.state,
            last_active: inner.last_active,
        }
    }

    /// Admits one request arriving at `now`.
    ///
    /// Returns once the service is active, or with the scale-up failure if
    /// this caller was the activator. Waiters return `Canceled` when `cancel`
    /// fires.
    pub async fn admit(&self, now: Instant, cancel: &CancellationToken) -> Result<(), ScaleError> {
        loop {
            // Register interest before looking at the state so that a
            // broadcast between the check and the await is not lost.
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let decision = {
                let mut inner = self.inner.lock();
                match inner.state {
                    GateState::Active => {
                        if now > inner.last_active {
                            inner.last_active = now;
                        }
                        Decision::Proceed
                    }
                    GateState::Idle => {
                        inner.state = GateState::Activating;
                        Decision::Activate
                    }
                    GateState::Activating => Decision::Wait,
                }
            };

            match decision {
                Decision::Proceed => {
                    metrics::inc_admitted(self.name());
                    return Ok(());
                }
                Decision::Activate => return self.activate(now, cancel).await,
                Decision::Wait => {
                    debug!(
                        component = "gate",
                        event = "waiting",
                        service = %self.name(),
                        "waiting for activation"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ScaleError::Canceled),
                        _ = &mut notified => continue,
                    }
                }
            }
        }
    }

    async fn activate(&self, now: Instant, cancel: &CancellationToken) -> Result<(), ScaleError> {
        let guard = ActivationGuard {
            gate: self,
            committed: false,
        };
        let started = Instant::now();
        info!(
            component = "gate",
            event = "activating",
            service = %self.name(),
            timeout = ?self.scale_timeout,
            "scaling service up"
        );

        match self.scaler.scale_up(cancel, now + self.scale_timeout).await {
            Ok(()) => {
                guard.commit(now);
                metrics::inc_scale_ups(self.name());
                metrics::inc_admitted(self.name());
                info!(
                    component = "gate",
                    event = "activated",
                    service = %self.name(),
                    took = ?started.elapsed(),
                    "service is active"
                );
                Ok(())
            }
            Err(err) => {
                drop(guard);
                metrics::inc_scale_up_failures(self.name(), err.kind());
                warn!(
                    component = "gate",
                    event = "activation_failed",
                    service = %self.name(),
                    kind = err.kind(),
                    error = %err,
                    "scale-up failed, gate is idle again"
                );
                Err(err)
            }
        }
    }

    /// Commits `Active -> Idle` if nothing touched the gate since `observed`.
    ///
    /// The state, the last-active marker and the elapsed time are all
    /// re-validated under the gate lock, so a request that refreshed the
    /// marker after the caller's snapshot aborts the transition. On commit
    /// the scaler is told a scale-down follows.
    pub fn try_expire(&self, observed: Instant, now: Instant, keep_alive: Duration) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != GateState::Active || inner.last_active != observed {
            return false;
        }
        if now.saturating_duration_since(inner.last_active) < keep_alive {
            return false;
        }
        inner.state = GateState::Idle;
        // Still under the lock: a request seeing `Idle` must find the
        // scale-down already reserved.
        self.scaler.reserve_scale_down();
        drop(inner);

        metrics::set_gate_active(self.name(), false);
        true
    }
}

/// Reverts the gate to `Idle` unless the activation was committed.
///
/// Dropping the activator future (client went away, shutdown) therefore
/// releases the waiters instead of leaving them parked on `Activating`.
struct ActivationGuard<'a> {
    gate: &'a Gate,
    committed: bool,
}

impl ActivationGuard<'_> {
    /// Marks the gate active as of the activator's arrival `now`, not the
    /// moment the scale-up finished: the first idle window deliberately
    /// includes the wake-up time.
    fn commit(mut self, now: Instant) {
        {
            let mut inner = self.gate.inner.lock();
            inner.state = GateState::Active;
            inner.last_active = now;
        }
        self.committed = true;
        metrics::set_gate_active(self.gate.name(), true);
        self.gate.changed.notify_waiters();
    }
}

impl Drop for ActivationGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.gate.inner.lock().state = GateState::Idle;
        self.gate.changed.notify_waiters();
    }
}
