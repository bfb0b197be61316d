//! Orchestrator coordination: capability interface, Docker binding and the
//! scale-up/scale-down protocol.

pub mod api;
pub mod coordinator;
pub mod docker;
pub mod error;


pub use api::{Orchestrator, ServiceDescriptor, ServiceMode};
pub use coordinator::{cancelable, Coordinator, Scaler, DEFAULT_POLL_INTERVAL};
pub use docker::{DockerOrchestrator, Endpoint};
pub use error::ScaleError;
