// Liveness probe errors.

use std::time::Duration;

/// Reported when the configured probe timeout is replaced by the fallback.
#[derive(Debug, Clone, thiserror::Error)]
#[error("liveness probe timeout {requested:?} is too short, using {fallback:?}")]
pub struct TimeoutIsTooShortError {
    pub requested: Duration,
    pub fallback: Duration,
}
