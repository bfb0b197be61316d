// Orchestrator capability interface consumed by the coordinator.

use serde::Serialize;

use super::error::ScaleError;

/// How the orchestrator schedules a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    /// Fixed replica count, scalable.
    Replicated,
    /// One task per node, cannot be scaled.
    Global,
}

/// Snapshot of orchestrator-reported service state.
///
/// Never cached: the coordinator refetches it right before every mutation so
/// that `version` is as fresh as possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub id: String,
    pub name: String,
    pub mode: ServiceMode,
    pub desired_replicas: u64,
    pub running_count: usize,
    pub version: u64,
}

impl ServiceDescriptor {
    pub fn is_replicated(&self) -> bool {
        self.mode == ServiceMode::Replicated
    }
}

/// Orchestrator defines the narrow set of control-plane calls the gate needs.
#[async_trait::async_trait]
pub trait Orchestrator: Send + Sync {
    /// Fetches the current descriptor. Fails with `NotFound` when the service is absent.
    async fn describe_service(&self, name: &str) -> Result<ServiceDescriptor, ScaleError>;

    /// Counts tasks of the service that are running and meant to keep running.
    async fn list_running_tasks(&self, service_id: &str) -> Result<usize, ScaleError>;

    /// Sets the desired replica count. Fails with `Conflict` when `version` is stale.
    async fn update_replicas(
        &self,
        service_id: &str,
        version: u64,
        desired: u64,
    ) -> Result<(), ScaleError>;
}
