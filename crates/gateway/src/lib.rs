//! Gateway: HTTP surface for the memory service.
//!
//! Lifecycle:
//! 1. Load + validate config
//! 2. Open the database, build the embedding provider and profile registry
//! 3. Resolve tenants from bearer API keys
//! 4. Serve `/health` and the `/memory/*` routes

pub mod api_keys;
pub mod auth;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use {
    server::{bind_listener, build_gateway_app, start_gateway},
    state::AppState,
};
