//! Appointment endpoints; every lookup runs under the caller's ownership scope

use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    Extension, Json,
};
use chrono::{NaiveTime, Utc};
use clinic_rbac::{default_assignee, OwnershipScope, ResourceClass, Severity};
use tracing::info;
use validator::Validate;

use super::Notice;
use crate::error::{ApiError, Result};
use crate::middleware::Session;
use crate::models::{Appointment, AppointmentRequest, AppointmentStatus, AppointmentUpdate};
use crate::state::AppState;

/// Slot assigned to an appointment a patient requests by date
const PATIENT_SLOT_START: (u32, u32) = (9, 0);
const PATIENT_SLOT_MINUTES: i64 = 30;

pub async fn list(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
) -> Result<Json<Vec<Appointment>>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::Appointment, uri.path())?;
    Ok(Json(state.store.list_appointments(scope).await?))
}

/// Book an appointment
///
/// Patients book by date for themselves; everyone else names the patient and
/// the exact window.
pub async fn create(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Json(req): Json<AppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>)> {
    req.validate()?;
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::Appointment, uri.path())?;
    let now = Utc::now();

    let (patient, start_time, end_time, confirmation) = match scope {
        OwnershipScope::OwnedBy(own_profile) => {
            let date = req
                .date
                .or_else(|| req.start_time.map(|t| t.date_naive()))
                .ok_or_else(|| ApiError::Validation("date: This field is required.".into()))?;
            let (hour, minute) = PATIENT_SLOT_START;
            let start = date
                .and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default())
                .and_utc();
            (
                own_profile,
                start,
                start + chrono::Duration::minutes(PATIENT_SLOT_MINUTES),
                "Appointment request submitted successfully!",
            )
        }
        OwnershipScope::Unscoped => {
            let missing =
                |field: &str| ApiError::Validation(format!("{}: This field is required.", field));
            (
                req.patient.ok_or_else(|| missing("patient"))?,
                req.start_time.ok_or_else(|| missing("start_time"))?,
                req.end_time.ok_or_else(|| missing("end_time"))?,
                "Appointment created successfully!",
            )
        }
    };

    let appointment = Appointment {
        id: 0,
        patient,
        doctor: req.doctor.or_else(|| default_assignee(identity)),
        start_time,
        end_time,
        reason: req.reason,
        status: AppointmentStatus::Scheduled,
        notes: req.notes,
        date_created: now,
        last_updated: now,
    };
    appointment.check_times(now).map_err(ApiError::Validation)?;

    let appointment = state.store.create_appointment(appointment).await?;
    info!(
        appointment = appointment.id,
        patient = %appointment.patient,
        username = %identity.username,
        "appointment created"
    );
    state.notify(&session, confirmation, Severity::Success);

    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn detail(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Path(id): Path<u64>,
) -> Result<Json<Appointment>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::Appointment, uri.path())?;
    Ok(Json(state.store.get_appointment(scope, id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Path(id): Path<u64>,
    Json(req): Json<AppointmentUpdate>,
) -> Result<Json<Appointment>> {
    req.validate()?;
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::Appointment, uri.path())?;

    let mut appointment = state.store.get_appointment(scope, id).await?;
    let times_changed = req.start_time.is_some() || req.end_time.is_some();

    if let Some(doctor) = req.doctor {
        appointment.doctor = Some(doctor);
    }
    if let Some(start_time) = req.start_time {
        appointment.start_time = start_time;
    }
    if let Some(end_time) = req.end_time {
        appointment.end_time = end_time;
    }
    if let Some(reason) = req.reason {
        appointment.reason = reason;
    }
    if let Some(status) = req.status {
        appointment.status = status;
    }
    if req.notes.is_some() {
        appointment.notes = req.notes;
    }

    let now = Utc::now();
    if times_changed {
        appointment.check_times(now).map_err(ApiError::Validation)?;
    }
    appointment.last_updated = now;

    let appointment = state.store.update_appointment(scope, appointment).await?;
    state.notify(&session, "Appointment updated successfully!", Severity::Success);
    Ok(Json(appointment))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
    Path(id): Path<u64>,
) -> Result<Json<Notice>> {
    let identity = state.identity(&session)?;
    let scope = state.scope(identity, ResourceClass::Appointment, uri.path())?;

    state.store.delete_appointment(scope, id).await?;
    info!(appointment = id, username = %identity.username, "appointment deleted");
    state.notify(&session, "Appointment deleted successfully!", Severity::Success);

    Ok(Notice::new("Appointment deleted successfully!"))
}
