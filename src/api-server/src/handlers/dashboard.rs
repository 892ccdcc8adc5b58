use axum::{extract::State, http::Uri, Extension, Json};
use chrono::Utc;
use clinic_rbac::{
    gate::MISSING_PROFILE_MESSAGE, AccessError, OwnershipScope, ResourceClass, Role, Severity,
};
use serde_json::{json, Value};

use crate::error::Result;
use crate::middleware::Session;
use crate::models::{AppointmentStatus, DashboardResponse};
use crate::state::AppState;

/// Public landing page
pub async fn home(State(state): State<AppState>, Extension(session): Extension<Session>) -> Json<Value> {
    let locations = &state.gate.policy().locations;
    let next = if session.principal.is_authenticated() {
        &locations.dashboard
    } else {
        &locations.login
    };

    Json(json!({
        "service": "clinic",
        "version": state.version,
        "authenticated": session.principal.is_authenticated(),
        "next": next,
    }))
}

/// Role-aware landing page with summary counts
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
) -> Result<Json<DashboardResponse>> {
    let identity = state.identity(&session)?;
    let mut response = DashboardResponse {
        username: identity.username.clone(),
        role: identity.role_label().to_string(),
        ..DashboardResponse::default()
    };

    match identity.role {
        Some(Role::Patient) => {
            // Already on the redirect target: report a missing profile in the body
            match state
                .gate
                .scope_for(identity, ResourceClass::Appointment, uri.path())
            {
                Ok(scope) => {
                    let now = Utc::now();
                    let upcoming = state
                        .store
                        .list_appointments(scope)
                        .await?
                        .iter()
                        .filter(|a| a.start_time >= now)
                        .count();
                    response.upcoming_appointments_count = Some(upcoming);
                    response.medical_records_count =
                        Some(state.store.list_records(scope).await?.len());
                }
                Err(AccessError::MissingProfile) => {
                    state.notify(&session, MISSING_PROFILE_MESSAGE, Severity::Error);
                    response.notice = Some(MISSING_PROFILE_MESSAGE.to_string());
                }
                Err(err) => return Err(state.deny(&err)),
            }
        }
        Some(Role::Doctor) => {
            let today = Utc::now().date_naive();
            let mine: Vec<_> = state
                .store
                .list_appointments(OwnershipScope::Unscoped)
                .await?
                .into_iter()
                .filter(|a| a.doctor == Some(identity.id))
                .collect();
            response.todays_patients_count = Some(
                mine.iter()
                    .filter(|a| a.start_time.date_naive() == today)
                    .count(),
            );
            response.pending_appointments_count = Some(
                mine.iter()
                    .filter(|a| a.status == AppointmentStatus::Scheduled)
                    .count(),
            );
        }
        Some(Role::Staff) | Some(Role::Admin) | None => {}
    }

    Ok(Json(response))
}
