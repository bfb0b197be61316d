// Application wiring.

#[allow(clippy::module_inception)]
pub mod app;
pub mod server;

pub use app::App;
