//! HTTP API Handlers
//!
//! One submodule per controller, plus routing, shared state and response
//! types.

// Core modules
pub mod router;
pub mod state;
pub mod types;
pub mod utils;

// Health and metrics
pub mod health;

// Controllers
pub mod account;
pub mod forum;
pub mod groups;
pub mod profile;

// Test utilities (compiled only in test builds)
#[cfg(test)]
pub mod test_helpers;

// Re-export commonly used items
pub use router::{
    build_api_routes, build_public_routes, build_rate_limited_router, build_router,
    build_router_with_api_layer, AppState,
};
pub use state::ServiceState;
pub use types::*;
