use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    Extension, Json,
};
use clinic_rbac::{Identity, OwnershipScope, PatientId, ResourceClass, Role, Severity, UserId};
use serde::Serialize;
use tracing::info;
use validator::Validate;

use crate::error::{ApiError, Result};
use crate::middleware::Session;
use crate::models::{
    Account, ClinicalEntry, EntryKind, MedicalRecord, PatientProfile, PatientRecordsQuery,
    PatientRequest,
};
use crate::state::AppState;
use crate::store::StoreError;

/// Records view for a patient: whole records, or entries of one kind
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PatientRecords {
    Records(Vec<MedicalRecord>),
    Entries(Vec<ClinicalEntry>),
}

/// The caller's own profile id; only a patient scope names one
fn own_profile(scope: OwnershipScope) -> Result<PatientId> {
    match scope {
        OwnershipScope::OwnedBy(profile) => Ok(profile),
        OwnershipScope::Unscoped => Err(ApiError::NotFound),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
) -> Result<Json<Vec<PatientProfile>>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::PatientProfile, uri.path())?;
    Ok(Json(state.store.list_patients(scope).await?))
}

/// Register a patient profile, optionally with a passwordless account the
/// patient later activates through `patient-register`
pub async fn create(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<PatientRequest>,
) -> Result<(StatusCode, Json<PatientProfile>)> {
    req.validate()?;
    req.check().map_err(ApiError::Validation)?;
    let identity = state.identity(&session)?;

    let username = req.username.clone();
    if let Some(username) = &username {
        match state.store.find_account(username).await {
            Ok(_) => {
                return Err(ApiError::Conflict(format!(
                    "A user with username {} already exists.",
                    username
                )))
            }
            Err(StoreError::NotFound) => {}
            Err(err) => return Err(err.into()),
        }
    }

    let profile = match username {
        Some(username) => {
            let profile = req.into_profile();
            let mut account = Account::new(Identity::new(UserId(0), username, Role::Patient));
            account.first_name = profile.first_name.clone();
            account.last_name = profile.last_name.clone();
            account.email = profile.email.clone();
            // Activated later through /accounts/patient-register/
            account.is_active = false;

            let (profile, _) = state.store.create_patient_account(profile, account).await?;
            profile
        }
        None => state.store.create_patient(req.into_profile()).await?,
    };

    info!(
        patient = %profile.id,
        username = %identity.username,
        "patient registered"
    );
    state.notify(
        &session,
        &format!("Patient {} created successfully!", profile.full_name()),
        Severity::Success,
    );

    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
) -> Result<Json<PatientProfile>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::PatientProfile, uri.path())?;
    let id = own_profile(scope)?;
    Ok(Json(state.store.get_patient(scope, id).await?))
}

pub async fn profile_edit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Json(req): Json<PatientRequest>,
) -> Result<Json<PatientProfile>> {
    req.validate()?;
    req.check().map_err(ApiError::Validation)?;
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::PatientProfile, uri.path())?;

    let mut profile = state.store.get_patient(scope, own_profile(scope)?).await?;
    req.apply(&mut profile);
    let profile = state.store.update_patient(scope, profile).await?;

    state.notify(
        &session,
        "Your profile has been updated successfully!",
        Severity::Success,
    );
    Ok(Json(profile))
}

/// The caller's records; `?type=lab` or `?type=prescription` narrows to entries
pub async fn records(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Query(query): Query<PatientRecordsQuery>,
) -> Result<Json<PatientRecords>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::MedicalRecord, uri.path())?;

    let kind = match query.record_type.as_deref() {
        Some("lab") => Some(EntryKind::LabResult),
        Some("prescription") => Some(EntryKind::Prescription),
        _ => None,
    };

    let records = match kind {
        Some(kind) => {
            PatientRecords::Entries(state.store.entries_in_scope(scope, Some(kind)).await?)
        }
        None => PatientRecords::Records(state.store.list_records(scope).await?),
    };
    Ok(Json(records))
}

pub async fn detail(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Path(id): Path<u64>,
) -> Result<Json<PatientProfile>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::PatientProfile, uri.path())?;
    Ok(Json(state.store.get_patient(scope, PatientId(id)).await?))
}
