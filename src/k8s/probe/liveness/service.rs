// Components reported by the liveness probe.

/// A component the probe asks on every check. The gate app registers itself
/// once its HTTP server is started.
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    async fn is_alive(&self) -> bool;
}
