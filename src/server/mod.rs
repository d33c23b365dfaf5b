//! HTTP surface for the application host.

mod routes;

pub use routes::{create_router, EngineState, ServerConfig, TOKEN_HEADER};
