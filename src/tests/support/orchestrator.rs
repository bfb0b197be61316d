// In-memory orchestrator with tunable readiness and failure behavior.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::orchestrator::{Orchestrator, ScaleError, ServiceDescriptor, ServiceMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateFailure {
    Conflict,
    Transport,
}

struct State {
    id: String,
    name: String,
    mode: ServiceMode,
    exists: bool,
    desired: u64,
    running: usize,
    version: u64,
    // None means tasks never start.
    ready_after: Option<Duration>,
    ready_at: Option<Instant>,
    update_failure: Option<UpdateFailure>,
    describe_failure: bool,
    updates: Vec<u64>,
}

impl State {
    fn settle(&mut self, now: Instant) {
        if let Some(at) = self.ready_at {
            if now >= at && self.desired > 0 {
                self.running = 1;
                self.ready_at = None;
            }
        }
    }
}

/// Single-service fake. Starts replicated, scaled to zero, version 1.
pub struct FakeOrchestrator {
    state: Mutex<State>,
    describes: AtomicUsize,
    lists: AtomicUsize,
}

impl FakeOrchestrator {
    pub fn new(name: &str) -> Self {
        Self {
            state: Mutex::new(State {
                id: format!("{name}-id"),
                name: name.to_string(),
                mode: ServiceMode::Replicated,
                exists: true,
                desired: 0,
                running: 0,
                version: 1,
                ready_after: Some(Duration::ZERO),
                ready_at: None,
                update_failure: None,
                describe_failure: false,
                updates: Vec::new(),
            }),
            describes: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
        }
    }

    /// Tasks report running `delay` after a scale-up is requested.
    pub fn ready_after(self, delay: Duration) -> Self {
        self.state.lock().ready_after = Some(delay);
        self
    }

    pub fn never_ready(self) -> Self {
        self.state.lock().ready_after = None;
        self
    }

    /// Changes readiness for scale-ups requested from now on; `None` means never.
    pub fn set_ready_after(&self, delay: Option<Duration>) {
        self.state.lock().ready_after = delay;
    }

    pub fn global(self) -> Self {
        self.state.lock().mode = ServiceMode::Global;
        self
    }

    pub fn missing(self) -> Self {
        self.state.lock().exists = false;
        self
    }

    /// Service is already up with `n` replicas.
    pub fn running(self, n: usize) -> Self {
        {
            let mut state = self.state.lock();
            state.running = n;
            state.desired = n as u64;
        }
        self
    }

    pub fn fail_updates(&self, failure: Option<UpdateFailure>) {
        self.state.lock().update_failure = failure;
    }

    pub fn fail_describes(&self, fail: bool) {
        self.state.lock().describe_failure = fail;
    }

    /// Simulates an operator touching the service behind our back.
    pub fn bump_version(&self) {
        self.state.lock().version += 1;
    }

    /// Simulates an out-of-band scale-down that drains all tasks.
    pub fn stop_tasks(&self) {
        let mut state = self.state.lock();
        state.desired = 0;
        state.running = 0;
        state.ready_at = None;
        state.version += 1;
    }

    pub fn name(&self) -> String {
        self.state.lock().name.clone()
    }

    /// Desired replica counts written so far, oldest first.
    pub fn updates(&self) -> Vec<u64> {
        self.state.lock().updates.clone()
    }

    pub fn describes(&self) -> usize {
        self.describes.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn desired(&self) -> u64 {
        self.state.lock().desired
    }
}

#[async_trait::async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn describe_service(&self, name: &str) -> Result<ServiceDescriptor, ScaleError> {
        self.describes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.describe_failure {
            return Err(ScaleError::orchestrator(anyhow::anyhow!("connection refused")));
        }
        if !state.exists || state.name != name {
            return Err(ScaleError::NotFound(name.to_string()));
        }
        state.settle(Instant::now());
        Ok(ServiceDescriptor {
            id: state.id.clone(),
            name: state.name.clone(),
            mode: state.mode,
            desired_replicas: state.desired,
            running_count: state.running,
            version: state.version,
        })
    }

    async fn list_running_tasks(&self, service_id: &str) -> Result<usize, ScaleError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.id != service_id {
            return Err(ScaleError::NotFound(service_id.to_string()));
        }
        state.settle(Instant::now());
        Ok(state.running)
    }

    async fn update_replicas(
        &self,
        service_id: &str,
        version: u64,
        desired: u64,
    ) -> Result<(), ScaleError> {
        let mut state = self.state.lock();
        if state.id != service_id {
            return Err(ScaleError::NotFound(service_id.to_string()));
        }
        match state.update_failure {
            Some(UpdateFailure::Conflict) => return Err(ScaleError::Conflict(state.name.clone())),
            Some(UpdateFailure::Transport) => {
                return Err(ScaleError::orchestrator(anyhow::anyhow!("broken pipe")))
            }
            None => {}
        }
        if state.version != version {
            return Err(ScaleError::Conflict(state.name.clone()));
        }

        state.version += 1;
        state.desired = desired;
        state.updates.push(desired);
        if desired == 0 {
            state.running = 0;
            state.ready_at = None;
            return Ok(());
        }
        match state.ready_after {
            Some(delay) if delay.is_zero() => state.running = 1,
            Some(delay) => state.ready_at = Some(Instant::now() + delay),
            None => {}
        }
        Ok(())
    }
}
