//! API module
//!
//! HTTP boundary: forwards webhook calls into the relay.

pub mod middleware;
pub mod routes;

pub use routes::{create_router, AppState};
