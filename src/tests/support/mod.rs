// Shared test support code for unit and integration tests.

pub mod harness;
pub mod orchestrator;
pub mod scaler;
pub mod upstream;

pub use harness::{point_backends, GateServer};
pub use orchestrator::FakeOrchestrator;
pub use upstream::UpstreamServer;
