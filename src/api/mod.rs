//! Read API Module
//! REST surface over the pool registry, the strategy engine and the chain client

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod types;

pub use handlers::AppState;
pub use routes::create_router;
pub use types::*;
