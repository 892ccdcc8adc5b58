//! HTTP handlers, grouped by area
//!
//! Handlers run behind the path gate and their operation's role guard. They
//! resolve an ownership scope before touching patient-owned data and pass it
//! into every store lookup.

pub mod accounts;
pub mod admin;
pub mod api;
pub mod appointments;
pub mod dashboard;
pub mod medical_records;
pub mod patients;

use axum::{
    extract::State,
    http::{Method, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use clinic_rbac::PolicyChain;
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::middleware::{enforce, Session};
use crate::state::AppState;

/// Router fallback
///
/// Unknown paths still pass the path gate; past it they get the same body as
/// a scoped miss.
pub async fn not_found(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    method: Method,
    uri: Uri,
) -> Response {
    let chain = PolicyChain::new().with(Arc::new(state.gate.clone()));
    match enforce(&state, &chain, &session, method.as_str(), uri.path()) {
        Some(redirect) => redirect,
        None => ApiError::NotFound.into_response(),
    }
}

/// Confirmation body for mutations that return no entity
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
            redirect: None,
        })
    }

    pub fn redirecting(message: impl Into<String>, location: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
            redirect: Some(location.into()),
        })
    }
}
