// Error definitions for scaling operations.

use std::time::Duration;

/// Failure kinds surfaced by the gate, the checker and the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum ScaleError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("service {0} not found")]
    NotFound(String),
    #[error("service {0} is not in replicated mode, scaling is not supported")]
    InvalidMode(String),
    #[error("service {service} did not become ready within {timeout:?}")]
    WakeTimeout { service: String, timeout: Duration },
    #[error("service {0} was modified concurrently (stale version token)")]
    Conflict(String),
    #[error("orchestrator request failed: {0}")]
    Orchestrator(#[source] anyhow::Error),
    #[error("operation canceled")]
    Canceled,
}

impl ScaleError {
    /// Wraps a transport or API failure.
    pub fn orchestrator<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        ScaleError::Orchestrator(err.into())
    }

    /// Short machine-readable kind, used as a log and metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            ScaleError::Config(_) => "config",
            ScaleError::NotFound(_) => "not_found",
            ScaleError::InvalidMode(_) => "invalid_mode",
            ScaleError::WakeTimeout { .. } => "wake_timeout",
            ScaleError::Conflict(_) => "conflict",
            ScaleError::Orchestrator(_) => "orchestrator",
            ScaleError::Canceled => "canceled",
        }
    }
}
