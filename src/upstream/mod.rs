//! Upstream backend functionality for forwarding requests to managed services.

pub mod backend;
pub mod proxy;
pub mod upstream;


// Re-export main types
pub use backend::BackendImpl;
pub use upstream::{Upstream, UpstreamError};
