// Route registration for admin endpoints and the forwarding handler.

use axum::Router;

/// Controller contributes its routes to the server router.
///
/// Admin controllers register concrete paths, for example:
/// ```rust
/// # use axum::{Router, routing::get};
/// # async fn status() -> &'static str { "[]" }
/// let router: Router<()> = Router::new().route("/scalegate/status", get(status));
/// # let _ = router;
/// ```
/// The forwarding controller registers the fallback instead, so that any
/// concrete admin path wins over it.
pub trait Controller: Send + Sync {
    fn add_route(&self, router: Router) -> Router;
}
