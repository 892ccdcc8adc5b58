//! HTTP service for the clinic: accounts, appointments, patients and medical
//! records behind the RBAC gate from `clinic-rbac`.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod seed;
pub mod server;
pub mod state;
pub mod store;

pub use error::{ApiError, Result};
pub use server::Server;
pub use state::AppState;

/// API version
pub const API_VERSION: &str = "v1";

/// Health check response
#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Store backend name
    pub store: String,
}
