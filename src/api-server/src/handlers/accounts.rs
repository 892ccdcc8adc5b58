//! Login, registration and session endpoints under `/accounts/`

use axum::{extract::State, http::StatusCode, Extension, Json};
use clinic_rbac::{FlashMessage, Identity, Notifier, Role, Severity, UserId};
use tracing::info;
use validator::Validate;

use super::Notice;
use crate::auth::{hash_password, verify_password};
use crate::error::{ApiError, Result};
use crate::middleware::Session;
use crate::models::{
    Account, DoctorProfileUpdate, LoginRequest, LoginResponse, PatientRegisterRequest,
    RegisterRequest,
};
use crate::state::AppState;
use crate::store::StoreError;

const INVALID_CREDENTIALS: &str = "Invalid username or password.";
const UNKNOWN_PATIENT: &str =
    "No patient account with this username. Please get your username from your doctor.";

/// Exchange credentials for a session token
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    req.validate()?;

    let account = match state.store.find_account(&req.username).await {
        Ok(account) => account,
        Err(StoreError::NotFound) => return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into())),
        Err(err) => return Err(err.into()),
    };

    let verified = account.is_active
        && account
            .password_digest
            .as_deref()
            .is_some_and(|digest| verify_password(&req.password, digest));
    if !verified {
        info!(username = %req.username, "failed login");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let token = state.sessions.issue(account.id());
    state.flash.notify(
        &token,
        &format!("Welcome back, {}!", account.username()),
        Severity::Success,
    );
    info!(username = %account.username(), role = %account.identity.role_label(), "login");

    Ok(Json(LoginResponse {
        token,
        username: account.username().to_string(),
        role: account.identity.role_label().to_string(),
        redirect: state.gate.policy().locations.dashboard.clone(),
    }))
}

/// Self-service signup; the new account is always a patient
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Notice>)> {
    req.validate()?;

    let mut account = Account::new(Identity::new(UserId(0), req.username, Role::Patient));
    account.email = req.email;
    account.first_name = req.first_name;
    account.last_name = req.last_name;
    account.password_digest = Some(hash_password(&req.password)?);

    let account = state.store.create_account(account).await?;
    info!(username = %account.username(), "account registered");

    Ok((
        StatusCode::CREATED,
        Notice::redirecting(
            "Account created successfully! Please log in.",
            state.gate.policy().locations.login.clone(),
        ),
    ))
}

/// Set a password on a patient account created by a clinician
pub async fn patient_register(
    State(state): State<AppState>,
    Json(req): Json<PatientRegisterRequest>,
) -> Result<Json<Notice>> {
    req.validate()?;

    if req.password1 != req.password2 {
        return Err(ApiError::Validation("Passwords do not match.".into()));
    }

    let mut account = match state.store.find_account(&req.username).await {
        Ok(account) if account.identity.has_role(Role::Patient) => account,
        Ok(_) | Err(StoreError::NotFound) => {
            return Err(ApiError::Validation(UNKNOWN_PATIENT.into()))
        }
        Err(err) => return Err(err.into()),
    };

    if account.has_usable_password() {
        return Err(ApiError::Validation(
            "This account is already registered. Please log in or reset your password.".into(),
        ));
    }

    account.password_digest = Some(hash_password(&req.password1)?);
    account.is_active = true;
    let account = state.store.save_account(account).await?;
    info!(username = %account.username(), "patient account activated");

    Ok(Notice::redirecting(
        "Account activated! You can now log in.",
        state.gate.policy().locations.login.clone(),
    ))
}

/// End the caller's session
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Json<Notice> {
    if let Some(token) = &session.token {
        state.sessions.revoke(token);
        state.flash.drain(token);
    }
    info!(username = %session.principal.username(), "logout");

    Notice::redirecting(
        "You have been logged out.",
        state.gate.policy().locations.login.clone(),
    )
}

/// A doctor edits their own name and email
pub async fn doctor_profile_edit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<DoctorProfileUpdate>,
) -> Result<Json<Account>> {
    req.validate()?;
    let identity = state.identity(&session)?;

    let mut account = state.store.get_account(identity.id).await?;
    req.apply(&mut account);
    let account = state.store.save_account(account).await?;
    info!(username = %account.username(), "doctor profile updated");

    state.notify(
        &session,
        "Your profile has been updated successfully!",
        Severity::Success,
    );
    Ok(Json(account))
}

/// Drain pending flash messages for the caller's session
pub async fn messages(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Json<Vec<FlashMessage>> {
    Json(
        session
            .token
            .as_deref()
            .map(|token| state.flash.drain(token))
            .unwrap_or_default(),
    )
}
