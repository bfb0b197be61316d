// Gate state types.

use serde::Serialize;
use std::fmt;
use tokio::time::Instant;

/// Activation state of a managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    /// Scaled down (or believed to be); the next request triggers a scale-up.
    Idle,
    /// A scale-up is in flight; requests wait for its outcome.
    Activating,
    /// Service is up; requests pass straight through.
    Active,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Idle => "idle",
            GateState::Activating => "activating",
            GateState::Active => "active",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consistent copy of the `(state, last_active)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSnapshot {
    pub state: GateState,
    /// Only meaningful while `state` is `Active`.
    pub last_active: Instant,
}

impl GateSnapshot {
    pub fn is_active(&self) -> bool {
        self.state == GateState::Active
    }
}
