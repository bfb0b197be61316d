// Background workers.

pub mod checker;

// Re-export main types
pub use checker::IdleChecker;
