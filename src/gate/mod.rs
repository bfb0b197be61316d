//! Per-service activation gates and their routing registry.

pub mod gate;
pub mod registry;
pub mod state;

#[cfg(test)]
mod gate_test;

pub use gate::Gate;
pub use registry::{ManagedService, Registry};
pub use state::{GateSnapshot, GateState};
