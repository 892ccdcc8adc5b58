use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use clinic_rbac::Redirect;
use serde_json::json;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Header carrying the user-facing message of a redirect
pub const X_NOTICE: &str = "x-notice";

/// Header carrying the notice severity
pub const X_NOTICE_LEVEL: &str = "x-notice-level";

/// Body of every 404; identical for missing and out-of-scope records
pub const NOT_FOUND_MESSAGE: &str = "Not found.";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found")]
    NotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Redirect to {}: {}", .0.location, .0.message)]
    Redirect(Redirect),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Validation(msg) => ApiError::Validation(msg),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<Redirect> for ApiError {
    fn from(redirect: Redirect) -> Self {
        ApiError::Redirect(redirect)
    }
}

/// 303 response for a redirect decision
///
/// The redirect is also stored in the response extensions so outer layers
/// can forward the message to the notifier.
pub fn redirect_response(redirect: Redirect) -> Response {
    let body = Json(json!({
        "redirect": redirect.location,
        "message": redirect.message,
        "level": redirect.severity,
    }));

    let mut response = (StatusCode::SEE_OTHER, body).into_response();
    let headers = response.headers_mut();
    if let Ok(location) = HeaderValue::from_str(&redirect.location) {
        headers.insert(header::LOCATION, location);
    }
    if let Ok(notice) = HeaderValue::from_str(&redirect.message) {
        headers.insert(X_NOTICE, notice);
    }
    headers.insert(
        X_NOTICE_LEVEL,
        HeaderValue::from_static(redirect.severity.as_str()),
    );

    response.extensions_mut().insert(redirect);
    response
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Redirect(redirect) => return redirect_response(redirect),
            ApiError::NotFound => (StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE.to_string()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_rbac::{DenialReason, RedirectTarget, Severity};

    #[test]
    fn test_redirect_response_headers() {
        let response = ApiError::Redirect(Redirect {
            target: RedirectTarget::Login,
            location: "/accounts/login/".to_string(),
            reason: DenialReason::Unauthenticated,
            message: "Please log in to access this page.".to_string(),
            severity: Severity::Error,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/accounts/login/");
        assert_eq!(
            response.headers()[X_NOTICE],
            "Please log in to access this page."
        );
        assert_eq!(response.headers()[X_NOTICE_LEVEL], "error");
        assert!(response.extensions().get::<Redirect>().is_some());
    }

    #[test]
    fn test_store_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(StoreError::NotFound).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StoreError::Conflict("taken".into()))
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(StoreError::Validation("Invalid patient ID.".into()))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
    }
}
