// HTTP middlewares.

pub mod activation_middleware;
pub mod middleware;
pub mod recover_middleware;


pub use activation_middleware::ActivationMiddleware;
pub use recover_middleware::PanicRecoverMiddleware;
