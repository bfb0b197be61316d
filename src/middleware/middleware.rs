// Middleware interface shared by the admin and proxy routers.

use axum::Router;

/// Middleware wraps a router with one layer.
///
/// Applied per router group: the server hands proxy middlewares only the
/// forwarding fallback and global middlewares the merged router.
pub trait Middleware: Send + Sync {
    fn apply(&self, router: Router) -> Router;
}
