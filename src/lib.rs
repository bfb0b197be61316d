//! scalegate: a scale-to-zero activation proxy for Docker Swarm services.
//!
//! Requests for an idle service are held at its [`gate::Gate`] while the
//! service is scaled up, then forwarded; [`workers::IdleChecker`] scales it
//! back to zero after its keep-alive.

#[path = "k8s/probe/liveness/mod.rs"]
pub mod liveness;
#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub mod app;
pub mod config;
pub mod controller;
pub mod gate;
pub mod http;
pub mod metrics;
pub mod middleware;
pub mod orchestrator;
pub mod shutdown;
pub mod upstream;
pub mod workers;
