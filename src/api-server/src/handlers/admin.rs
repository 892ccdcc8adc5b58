//! User administration, audit trail, metrics and the active path policy under `/admin/`

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use clinic_rbac::{AuditEvent, AuditStats, Identity, PathRule, Severity, UserId};
use serde::Serialize;
use tracing::info;
use validator::Validate;

use crate::auth::hash_password;
use crate::error::{ApiError, Result};
use crate::middleware::Session;
use crate::models::{Account, AuditQuery, UserCreateRequest, UserUpdateRequest};
use crate::state::AppState;

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1_000;

#[derive(Debug, Serialize)]
pub struct AuditLogResponse {
    pub events: Vec<AuditEvent>,
    pub stats: AuditStats,
}

pub async fn user_list(State(state): State<AppState>) -> Result<Json<Vec<Account>>> {
    Ok(Json(state.store.list_accounts().await?))
}

/// Create an account with any role; superusers are stored as admins
pub async fn user_create(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<UserCreateRequest>,
) -> Result<(StatusCode, Json<Account>)> {
    req.validate()?;

    let mut identity =
        Identity::new(UserId(0), req.username, req.role).with_superuser(req.is_superuser);
    identity.patient_profile = req.patient_profile;

    let mut account = Account::new(identity);
    account.email = req.email;
    account.first_name = req.first_name;
    account.last_name = req.last_name;
    account.password_digest = req.password.as_deref().map(hash_password).transpose()?;

    let account = state.store.create_account(account).await?;
    info!(
        username = %account.username(),
        role = %account.identity.role_label(),
        created_by = %session.principal.username(),
        "user created"
    );
    state.notify(
        &session,
        &format!("User {} created successfully!", account.username()),
        Severity::Success,
    );

    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn user_update(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<u64>,
    Json(req): Json<UserUpdateRequest>,
) -> Result<Json<Account>> {
    req.validate()?;

    let mut account = state.store.get_account(UserId(id)).await?;
    if let Some(role) = req.role {
        account.identity.role = Some(role);
    }
    if let Some(is_superuser) = req.is_superuser {
        account.identity.is_superuser = is_superuser;
    }
    if let Some(is_active) = req.is_active {
        account.is_active = is_active;
    }
    if req.email.is_some() {
        account.email = req.email;
    }
    if req.patient_profile.is_some() {
        account.identity.patient_profile = req.patient_profile;
    }

    let account = state.store.save_account(account).await?;
    info!(
        username = %account.username(),
        role = %account.identity.role_label(),
        updated_by = %session.principal.username(),
        "user updated"
    );
    state.notify(
        &session,
        &format!("User {} updated successfully!", account.username()),
        Severity::Success,
    );

    Ok(Json(account))
}

/// Recent audit events, optionally for one username, with totals
pub async fn audit_log(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Json<AuditLogResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .min(MAX_AUDIT_LIMIT);

    let events = match query.username.as_deref() {
        Some(username) => state.audit_log.query_by_username(username, limit),
        None => state.audit_log.recent(limit),
    };

    Json(AuditLogResponse {
        events,
        stats: state.audit_log.stats(),
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let body = state
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// The path policy in effect, flattened to prefix rules
pub async fn policy(State(state): State<AppState>) -> Json<Vec<PathRule>> {
    Json(state.gate.policy().rules())
}
