// HTTP plumbing: server, pooled backend client, JSON responses.

#[path = "client/hyper_client.rs"]
pub mod client;
#[path = "render/renderer.rs"]
pub mod render;
#[path = "server/server.rs"]
pub mod server;

pub use crate::middleware::middleware::Middleware;

pub use server::{HttpServer, Server};

pub use crate::controller::controller::Controller;
