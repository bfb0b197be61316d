// Scripted scaler for gate and checker tests.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{cancelable, ScaleError, Scaler};

/// What the next `scale_up` call does after its delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ready,
    Fail,
    /// Never completes on its own.
    Hang,
}

pub struct FakeScaler {
    name: String,
    delay: Duration,
    script: Mutex<VecDeque<Outcome>>,
    ups: AtomicUsize,
    downs: AtomicUsize,
    reservations: AtomicUsize,
    down_failure: Mutex<bool>,
}

impl FakeScaler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            ups: AtomicUsize::new(0),
            downs: AtomicUsize::new(0),
            reservations: AtomicUsize::new(0),
            down_failure: Mutex::new(false),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queues outcomes for upcoming scale-ups; once drained, scale-ups succeed.
    pub fn script(self, outcomes: &[Outcome]) -> Self {
        self.script.lock().extend(outcomes.iter().copied());
        self
    }

    pub fn fail_scale_down(&self, fail: bool) {
        *self.down_failure.lock() = fail;
    }

    pub fn ups(&self) -> usize {
        self.ups.load(Ordering::SeqCst)
    }

    pub fn downs(&self) -> usize {
        self.downs.load(Ordering::SeqCst)
    }

    pub fn reservations(&self) -> usize {
        self.reservations.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Scaler for FakeScaler {
    fn service_name(&self) -> &str {
        &self.name
    }

    async fn scale_up(&self, cancel: &CancellationToken, deadline: Instant) -> Result<(), ScaleError> {
        self.ups.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().pop_front().unwrap_or(Outcome::Ready);
        let delay = self.delay;
        let name = self.name.clone();

        cancelable(cancel, async move {
            if outcome == Outcome::Hang {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(delay).await;
            if Instant::now() > deadline {
                return Err(ScaleError::WakeTimeout {
                    service: name,
                    timeout: delay,
                });
            }
            match outcome {
                Outcome::Fail => Err(ScaleError::orchestrator(anyhow::anyhow!("scripted failure"))),
                _ => Ok(()),
            }
        })
        .await
    }

    fn reserve_scale_down(&self) {
        self.reservations.fetch_add(1, Ordering::SeqCst);
    }

    async fn scale_down(&self, cancel: &CancellationToken) -> Result<(), ScaleError> {
        self.downs.fetch_add(1, Ordering::SeqCst);
        if *self.down_failure.lock() {
            return Err(ScaleError::Conflict(self.name.clone()));
        }
        cancelable(cancel, async { Ok(()) }).await
    }
}
