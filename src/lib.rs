//! GraphJS Library
//!
//! HTTP controller layer for a social graph: members, forum threads and
//! replies, groups, follows and profiles.
//!
//! # Layout
//! - [`graph`]: typed node/edge records behind a pluggable [`graph::GraphStore`]
//! - [`handlers`]: axum controllers, routing and shared state
//! - [`auth`]: cookie sessions and password hashing
//! - [`validation`]: declarative field rules for query parameters

pub mod auth;
pub mod config;
pub mod errors;
pub mod graph;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod tracing_setup;
pub mod validation;

// Re-export dependencies to ensure tests use the same version
pub use chrono;
pub use parking_lot;
pub use uuid;
