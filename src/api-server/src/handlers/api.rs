//! REST endpoints under `/api/`
//!
//! The path is on the public allowlist, so these operations rely on their
//! role guard alone.

use axum::{
    extract::{Path, State},
    http::Uri,
    Extension, Json,
};
use clinic_rbac::{PatientId, ResourceClass};

use crate::error::{ApiError, Result};
use crate::middleware::Session;
use crate::models::{MedicalRecord, PatientProfile};
use crate::state::AppState;
use crate::HealthResponse;

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    state
        .store
        .health_check()
        .await
        .map_err(|e| ApiError::Internal(format!("store unavailable: {}", e)))?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: state.uptime_seconds(),
        store: state.store.backend_name().to_string(),
    }))
}

pub async fn patient_list(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
) -> Result<Json<Vec<PatientProfile>>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::PatientProfile, uri.path())?;
    Ok(Json(state.store.list_patients(scope).await?))
}

pub async fn patient_detail(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Path(id): Path<u64>,
) -> Result<Json<PatientProfile>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::PatientProfile, uri.path())?;
    Ok(Json(state.store.get_patient(scope, PatientId(id)).await?))
}

pub async fn record_list(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
) -> Result<Json<Vec<MedicalRecord>>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::MedicalRecord, uri.path())?;
    Ok(Json(state.store.list_records(scope).await?))
}

pub async fn record_detail(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Path(id): Path<u64>,
) -> Result<Json<MedicalRecord>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::MedicalRecord, uri.path())?;
    Ok(Json(state.store.get_record(scope, id).await?))
}
