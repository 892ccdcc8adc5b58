//! Middleware layer for the API server
//!
//! Layers, outermost first:
//! - CORS, request ID and request logging
//! - Session authentication
//! - Redirect notification
//!
//! Access control runs per route: [`policy_guard`] evaluates the path gate
//! followed by the operation's role requirement, wired up in
//! [`crate::routes`]. The router fallback uses [`enforce`] with the gate alone.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use clinic_rbac::{AccessPolicy, Notifier, PolicyChain, Principal, Redirect, RequestContext};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{redirect_response, X_NOTICE, X_NOTICE_LEVEL};
use crate::state::AppState;

/// Request ID header name
pub const X_REQUEST_ID: &str = "x-request-id";

/// Caller resolved from the bearer token; inserted on every request
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Token of a live session; `None` for anonymous callers
    pub token: Option<String>,
    pub principal: Principal,
}

impl Session {
    fn role_label(&self) -> &'static str {
        match self.principal.identity() {
            Some(identity) => identity.role_label(),
            None => "anonymous",
        }
    }
}

/// Configure CORS middleware
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static(X_REQUEST_ID),
        ])
        .expose_headers([
            header::LOCATION,
            HeaderName::from_static(X_REQUEST_ID),
            HeaderName::from_static(X_NOTICE),
            HeaderName::from_static(X_NOTICE_LEVEL),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Request ID middleware
///
/// Reuses a valid incoming `x-request-id` or generates one, stores it in the
/// request extensions and echoes it on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    response
}

/// Request logging middleware; level follows the response status
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<Uuid>()
        .copied()
        .unwrap_or_else(Uuid::new_v4);

    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "Incoming request"
    );

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed();

    let status = response.status();

    // tracing::event! needs a constant level
    match status.as_u16() {
        500..=599 => tracing::error!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            duration_ms = elapsed.as_millis() as u64,
            "Request completed"
        ),
        400..=499 => tracing::warn!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            duration_ms = elapsed.as_millis() as u64,
            "Request completed"
        ),
        _ => tracing::info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            duration_ms = elapsed.as_millis() as u64,
            "Request completed"
        ),
    }

    response
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Resolve the bearer token into a [`Session`]
///
/// Unknown tokens, deleted accounts and inactive accounts all yield an
/// anonymous session. The principal is loaded once here and reused by the
/// policy guard and the handlers.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let mut session = Session::default();

    if let Some(token) = bearer_token(request.headers()) {
        match state.sessions.resolve(&token) {
            Some(user) => match state.store.get_account(user).await {
                Ok(account) if account.is_active => {
                    session.token = Some(token);
                    session.principal = account.identity.into();
                }
                Ok(account) => {
                    debug!(username = %account.username(), "session for inactive account ignored");
                }
                Err(err) => {
                    warn!(user = %user, error = %err, "session refers to a missing account");
                }
            },
            None => debug!("unknown session token"),
        }
    }

    request.extensions_mut().insert(session);
    next.run(request).await
}

/// Push the message of any redirect response to the caller's flash queue
pub async fn notify_redirects(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let token = request
        .extensions()
        .get::<Session>()
        .and_then(|session| session.token.clone());

    let response = next.run(request).await;

    if let (Some(token), Some(redirect)) = (token, response.extensions().get::<Redirect>()) {
        state.flash.notify(&token, &redirect.message, redirect.severity);
    }

    response
}

/// Evaluate `chain` for the request; the redirect response on denial
pub fn enforce(
    state: &AppState,
    chain: &PolicyChain,
    session: &Session,
    method: &str,
    path: &str,
) -> Option<Response> {
    let decision = chain.evaluate(&RequestContext::new(&session.principal, path, method));
    state.metrics.observe(&decision, session.role_label());

    let redirect = decision.redirect()?;
    if redirect.reason.is_denial() {
        warn!(
            path = %path,
            username = %session.principal.username(),
            reason = ?redirect.reason,
            "request denied"
        );
    } else {
        debug!(path = %path, location = %redirect.location, "soft redirect");
    }
    Some(redirect_response(redirect.clone()))
}

/// Per-route access check: the path gate, then the operation's requirement
pub async fn policy_guard(
    State((state, chain)): State<(AppState, Arc<PolicyChain>)>,
    request: Request,
    next: Next,
) -> Response {
    let session = request.extensions().get::<Session>().cloned().unwrap_or_default();
    let denied = enforce(
        &state,
        &chain,
        &session,
        request.method().as_str(),
        request.uri().path(),
    );

    match denied {
        Some(response) => response,
        None => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Account;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use clinic_rbac::{Identity, Role, UserId};
    use tower::ServiceExt;

    async fn test_handler() -> &'static str {
        "OK"
    }

    async fn whoami(Extension(session): Extension<Session>) -> String {
        session.principal.username().to_string()
    }

    fn authenticated_app(state: AppState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(state, authenticate))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_request_id_middleware() {
        let app = Router::new()
            .route("/", get(test_handler))
            .layer(middleware::from_fn(request_id_middleware));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let app = Router::new()
            .route("/", get(test_handler))
            .layer(middleware::from_fn(request_id_middleware));
        let id = "6f1c3c1e-94a4-4c4f-8d3e-0b0c8f8a1a11";

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(X_REQUEST_ID, id)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[X_REQUEST_ID], id);
    }

    #[tokio::test]
    async fn test_cors_layer() {
        let app = Router::new()
            .route("/", get(test_handler))
            .layer(cors_layer());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/")
                    .header(header::ORIGIN, "http://example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_exposes_notice_headers() {
        let app = Router::new()
            .route("/", get(test_handler))
            .layer(cors_layer());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::ORIGIN, "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let exposed = response.headers()[header::ACCESS_CONTROL_EXPOSE_HEADERS]
            .to_str()
            .unwrap()
            .to_string();
        for name in ["location", X_REQUEST_ID, X_NOTICE, X_NOTICE_LEVEL] {
            assert!(exposed.contains(name), "{} missing from {}", name, exposed);
        }
    }

    #[tokio::test]
    async fn test_authenticate_without_token_is_anonymous() {
        let state = AppState::in_memory().unwrap();
        let response = authenticated_app(state)
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_authenticate_resolves_session() {
        let state = AppState::in_memory().unwrap();
        let account = state
            .store
            .create_account(Account::new(Identity::new(UserId(0), "house", Role::Doctor)))
            .await
            .unwrap();
        let token = state.sessions.issue(account.id());

        let response = authenticated_app(state)
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "house");
    }

    #[tokio::test]
    async fn test_authenticate_ignores_inactive_account() {
        let state = AppState::in_memory().unwrap();
        let mut account = Account::new(Identity::new(UserId(0), "gone", Role::Staff));
        account.is_active = false;
        let account = state.store.create_account(account).await.unwrap();
        let token = state.sessions.issue(account.id());

        let response = authenticated_app(state)
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "anonymous");
    }
}
