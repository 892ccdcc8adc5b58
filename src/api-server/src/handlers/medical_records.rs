use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    Extension, Json,
};
use chrono::Utc;
use clinic_rbac::{default_assignee, PatientId, ResourceClass, Severity};
use tracing::info;

use super::Notice;
use crate::error::{ApiError, Result};
use crate::middleware::Session;
use crate::models::{
    ClinicalEntry, EntryDetails, EntryQuery, MedicalRecord, MedicalRecordDetail,
    MedicalRecordRequest, MedicalRecordUpdate,
};
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
) -> Result<Json<Vec<MedicalRecord>>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::MedicalRecord, uri.path())?;
    Ok(Json(state.store.list_records(scope).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Json(req): Json<MedicalRecordRequest>,
) -> Result<(StatusCode, Json<MedicalRecord>)> {
    let identity = state.identity(&session)?;
    // Resolved for the audit trail; creation itself is unscoped
    state.scope(identity, ResourceClass::MedicalRecord, uri.path())?;

    let record = state
        .store
        .create_record(MedicalRecord {
            id: 0,
            patient: PatientId(req.patient),
            record_date: Utc::now(),
            recorded_by: Some(identity.id),
            chief_complaint: req.chief_complaint,
            current_symptoms: req.current_symptoms,
            allergies: req.allergies,
        })
        .await?;

    info!(
        record = record.id,
        patient = %record.patient,
        username = %identity.username,
        "medical record created"
    );
    state.notify(&session, "Medical record created successfully!", Severity::Success);

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn detail(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Path(id): Path<u64>,
) -> Result<Json<MedicalRecordDetail>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::MedicalRecord, uri.path())?;

    let record = state.store.get_record(scope, id).await?;
    let entries = state.store.list_entries(scope, id, None).await?;
    Ok(Json(MedicalRecordDetail { record, entries }))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Path(id): Path<u64>,
    Json(req): Json<MedicalRecordUpdate>,
) -> Result<Json<MedicalRecord>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::MedicalRecord, uri.path())?;

    let mut record = state.store.get_record(scope, id).await?;
    if req.chief_complaint.is_some() {
        record.chief_complaint = req.chief_complaint;
    }
    if req.current_symptoms.is_some() {
        record.current_symptoms = req.current_symptoms;
    }
    if req.allergies.is_some() {
        record.allergies = req.allergies;
    }

    let record = state.store.update_record(scope, record).await?;
    state.notify(&session, "Medical record updated successfully!", Severity::Success);
    Ok(Json(record))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Path(id): Path<u64>,
) -> Result<Json<Notice>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::MedicalRecord, uri.path())?;

    state.store.delete_record(scope, id).await?;
    info!(record = id, username = %identity.username, "medical record deleted");
    state.notify(&session, "Medical record deleted successfully!", Severity::Success);

    Ok(Notice::new("Medical record deleted successfully!"))
}

/// Entries of one record, optionally narrowed with `?kind=`
pub async fn entry_list(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Path(id): Path<u64>,
    Query(query): Query<EntryQuery>,
) -> Result<Json<Vec<ClinicalEntry>>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::MedicalRecord, uri.path())?;
    Ok(Json(state.store.list_entries(scope, id, query.kind).await?))
}

pub async fn entry_create(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Path(id): Path<u64>,
    Json(mut details): Json<EntryDetails>,
) -> Result<(StatusCode, Json<ClinicalEntry>)> {
    details.check().map_err(ApiError::Validation)?;
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::MedicalRecord, uri.path())?;

    details.default_author(default_assignee(identity));
    let entry = state.store.create_entry(scope, id, details).await?;

    info!(
        record = id,
        entry = entry.id,
        kind = %entry.details.kind(),
        username = %identity.username,
        "clinical entry added"
    );
    state.notify(&session, "Clinical entry added successfully!", Severity::Success);

    Ok((StatusCode::CREATED, Json(entry)))
}
