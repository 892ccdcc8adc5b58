//! Route definitions for the API server
//!
//! Every route is declared once in [`ROUTES`] with the roles its operation
//! admits. The router attaches a policy chain per operation from that table
//! (path gate, then role requirement), and the coverage audit checks the same
//! table against the path policy.

use crate::{handlers, middleware, state::AppState};
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post, put, MethodRouter},
    Router,
};
use clinic_rbac::{audit_routes, CoverageIssue, PolicyChain, Role, RouteDecl};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const EVERYONE: &[Role] = &Role::ALL;
const CARE_TEAM: &[Role] = &[Role::Patient, Role::Doctor, Role::Staff, Role::Admin];
const CLINICIANS: &[Role] = &[Role::Doctor, Role::Admin];
const PATIENTS: &[Role] = &[Role::Patient];
const PATIENT_VIEWERS: &[Role] = &[Role::Patient, Role::Doctor, Role::Admin];
const ADMINS: &[Role] = &[Role::Admin];
const DOCTORS: &[Role] = &[Role::Doctor];

/// A declared route and the roles its operation admits
#[derive(Debug, Clone, Copy)]
pub struct RouteSpec {
    pub method: &'static str,
    pub path: &'static str,
    pub operation: &'static str,
    /// `None` for public operations
    pub roles: Option<&'static [Role]>,
}

const fn route(
    method: &'static str,
    path: &'static str,
    operation: &'static str,
    roles: Option<&'static [Role]>,
) -> RouteSpec {
    RouteSpec {
        method,
        path,
        operation,
        roles,
    }
}

/// The service's route table
pub const ROUTES: &[RouteSpec] = &[
    // Accounts
    route("POST", "/accounts/login/", "login", None),
    route("POST", "/accounts/register/", "register", None),
    route("POST", "/accounts/patient-register/", "patient_register", None),
    route("POST", "/accounts/logout/", "logout", Some(EVERYONE)),
    route("GET", "/accounts/messages/", "messages", Some(EVERYONE)),
    route("PUT", "/accounts/profile/edit/", "doctor_profile_edit", Some(DOCTORS)),
    // Landing pages
    route("GET", "/", "home", None),
    route("GET", "/dashboard/", "dashboard", Some(EVERYONE)),
    // Appointments
    route("GET", "/appointments/", "appointment_list", Some(CARE_TEAM)),
    route("POST", "/appointments/", "appointment_create", Some(CARE_TEAM)),
    route("GET", "/appointments/:id/", "appointment_detail", Some(CARE_TEAM)),
    route("PUT", "/appointments/:id/", "appointment_update", Some(CARE_TEAM)),
    route("DELETE", "/appointments/:id/", "appointment_delete", Some(CARE_TEAM)),
    // Patients
    route("GET", "/patients/list/", "patient_list", Some(CLINICIANS)),
    route("POST", "/patients/", "patient_create", Some(CLINICIANS)),
    route("GET", "/patients/profile/", "patient_profile", Some(PATIENTS)),
    route("PUT", "/patients/profile/edit/", "patient_profile_edit", Some(PATIENTS)),
    route("GET", "/patients/records/", "patient_records", Some(PATIENTS)),
    route("GET", "/patients/:id/", "patient_detail", Some(PATIENT_VIEWERS)),
    // Medical records
    route("GET", "/medical-records/", "medical_record_list", Some(CLINICIANS)),
    route("POST", "/medical-records/", "medical_record_create", Some(CLINICIANS)),
    route("GET", "/medical-records/:id/", "medical_record_detail", Some(CLINICIANS)),
    route("PUT", "/medical-records/:id/", "medical_record_update", Some(CLINICIANS)),
    route("DELETE", "/medical-records/:id/", "medical_record_delete", Some(CLINICIANS)),
    route("GET", "/medical-records/:id/entries/", "entry_list", Some(CLINICIANS)),
    route("POST", "/medical-records/:id/entries/", "entry_create", Some(CLINICIANS)),
    // Administration
    route("GET", "/admin/users/", "user_list", Some(ADMINS)),
    route("POST", "/admin/users/", "user_create", Some(ADMINS)),
    route("PUT", "/admin/users/:id/", "user_update", Some(ADMINS)),
    route("GET", "/admin/audit/", "audit_log", Some(ADMINS)),
    route("GET", "/admin/metrics/", "metrics", Some(ADMINS)),
    route("GET", "/admin/policy/", "policy_rules", Some(ADMINS)),
    // REST
    route("GET", "/api/health/", "health", None),
    route("GET", "/api/patients/", "api_patient_list", Some(CLINICIANS)),
    route("GET", "/api/patients/:id/", "api_patient_detail", Some(CLINICIANS)),
    route("GET", "/api/medical-records/", "api_record_list", Some(CLINICIANS)),
    route("GET", "/api/medical-records/:id/", "api_record_detail", Some(CLINICIANS)),
];

/// Route table in the shape the coverage audit takes
pub fn route_table() -> Vec<RouteDecl> {
    ROUTES
        .iter()
        .map(|r| RouteDecl::new(r.method, r.path, r.operation, r.roles))
        .collect()
}

/// Attach the access policy chain declared for `operation`
///
/// Every route passes the path gate. Operations with declared roles add their
/// requirement behind it; an operation missing from [`ROUTES`] is closed to
/// every role.
fn guarded(router: MethodRouter<AppState>, state: &AppState, operation: &str) -> MethodRouter<AppState> {
    let mut chain = PolicyChain::new().with(Arc::new(state.gate.clone()));

    match ROUTES.iter().find(|r| r.operation == operation) {
        Some(RouteSpec { roles: None, .. }) => {}
        Some(RouteSpec {
            roles: Some(roles), ..
        }) => chain = chain.with(Arc::new(state.gate.requirement(operation, roles))),
        None => {
            error!(operation = %operation, "operation missing from the route table; denying every role");
            chain = chain.with(Arc::new(state.gate.requirement(operation, &[])));
        }
    }

    router.route_layer(axum_middleware::from_fn_with_state(
        (state.clone(), Arc::new(chain)),
        middleware::policy_guard,
    ))
}

/// Run the coverage audit and log each finding
pub fn log_coverage(state: &AppState) -> Vec<CoverageIssue> {
    let issues = audit_routes(state.gate.policy(), &route_table());
    for issue in &issues {
        warn!(issue = %issue, "route coverage");
    }
    if issues.is_empty() {
        info!(routes = ROUTES.len(), "route coverage audit clean");
    }
    issues
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let s = &state;

    let router = Router::new()
        // Accounts
        .route(
            "/accounts/login/",
            guarded(post(handlers::accounts::login), s, "login"),
        )
        .route(
            "/accounts/register/",
            guarded(post(handlers::accounts::register), s, "register"),
        )
        .route(
            "/accounts/patient-register/",
            guarded(
                post(handlers::accounts::patient_register),
                s,
                "patient_register",
            ),
        )
        .route(
            "/accounts/logout/",
            guarded(post(handlers::accounts::logout), s, "logout"),
        )
        .route(
            "/accounts/messages/",
            guarded(get(handlers::accounts::messages), s, "messages"),
        )
        .route(
            "/accounts/profile/edit/",
            guarded(
                put(handlers::accounts::doctor_profile_edit),
                s,
                "doctor_profile_edit",
            ),
        )
        // Landing pages
        .route("/", guarded(get(handlers::dashboard::home), s, "home"))
        .route(
            "/dashboard/",
            guarded(get(handlers::dashboard::dashboard), s, "dashboard"),
        )
        // Appointments
        .route(
            "/appointments/",
            guarded(get(handlers::appointments::list), s, "appointment_list"),
        )
        .route(
            "/appointments/",
            guarded(post(handlers::appointments::create), s, "appointment_create"),
        )
        .route(
            "/appointments/:id/",
            guarded(get(handlers::appointments::detail), s, "appointment_detail"),
        )
        .route(
            "/appointments/:id/",
            guarded(put(handlers::appointments::update), s, "appointment_update"),
        )
        .route(
            "/appointments/:id/",
            guarded(delete(handlers::appointments::remove), s, "appointment_delete"),
        )
        // Patients
        .route(
            "/patients/list/",
            guarded(get(handlers::patients::list), s, "patient_list"),
        )
        .route(
            "/patients/",
            guarded(post(handlers::patients::create), s, "patient_create"),
        )
        .route(
            "/patients/profile/",
            guarded(get(handlers::patients::profile), s, "patient_profile"),
        )
        .route(
            "/patients/profile/edit/",
            guarded(put(handlers::patients::profile_edit), s, "patient_profile_edit"),
        )
        .route(
            "/patients/records/",
            guarded(get(handlers::patients::records), s, "patient_records"),
        )
        .route(
            "/patients/:id/",
            guarded(get(handlers::patients::detail), s, "patient_detail"),
        )
        // Medical records
        .route(
            "/medical-records/",
            guarded(get(handlers::medical_records::list), s, "medical_record_list"),
        )
        .route(
            "/medical-records/",
            guarded(post(handlers::medical_records::create), s, "medical_record_create"),
        )
        .route(
            "/medical-records/:id/",
            guarded(get(handlers::medical_records::detail), s, "medical_record_detail"),
        )
        .route(
            "/medical-records/:id/",
            guarded(put(handlers::medical_records::update), s, "medical_record_update"),
        )
        .route(
            "/medical-records/:id/",
            guarded(delete(handlers::medical_records::remove), s, "medical_record_delete"),
        )
        .route(
            "/medical-records/:id/entries/",
            guarded(get(handlers::medical_records::entry_list), s, "entry_list"),
        )
        .route(
            "/medical-records/:id/entries/",
            guarded(post(handlers::medical_records::entry_create), s, "entry_create"),
        )
        // Administration
        .route(
            "/admin/users/",
            guarded(get(handlers::admin::user_list), s, "user_list"),
        )
        .route(
            "/admin/users/",
            guarded(post(handlers::admin::user_create), s, "user_create"),
        )
        .route(
            "/admin/users/:id/",
            guarded(put(handlers::admin::user_update), s, "user_update"),
        )
        .route(
            "/admin/audit/",
            guarded(get(handlers::admin::audit_log), s, "audit_log"),
        )
        .route(
            "/admin/metrics/",
            guarded(get(handlers::admin::metrics), s, "metrics"),
        )
        .route(
            "/admin/policy/",
            guarded(get(handlers::admin::policy), s, "policy_rules"),
        )
        // REST
        .route(
            "/api/health/",
            guarded(get(handlers::api::health), s, "health"),
        )
        .route(
            "/api/patients/",
            guarded(get(handlers::api::patient_list), s, "api_patient_list"),
        )
        .route(
            "/api/patients/:id/",
            guarded(get(handlers::api::patient_detail), s, "api_patient_detail"),
        )
        .route(
            "/api/medical-records/",
            guarded(get(handlers::api::record_list), s, "api_record_list"),
        )
        .route(
            "/api/medical-records/:id/",
            guarded(get(handlers::api::record_detail), s, "api_record_detail"),
        )
        .fallback(handlers::not_found);

    router
        .with_state(state.clone())
        // Add middleware layers (executed bottom to top)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::notify_redirects,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::authenticate,
        ))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(middleware::cors_layer())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use std::collections::HashSet;
    use tower::ServiceExt;

    fn create_test_state() -> AppState {
        AppState::in_memory().unwrap()
    }

    #[test]
    fn test_route_table_has_no_unguarded_routes() {
        let state = create_test_state();
        let issues = log_coverage(&state);
        assert!(
            !issues
                .iter()
                .any(|issue| matches!(issue, CoverageIssue::Unguarded { .. })),
            "unguarded routes: {:?}",
            issues
        );
    }

    #[test]
    fn test_route_table_is_fully_reachable() {
        let state = create_test_state();
        assert!(log_coverage(&state).is_empty());
    }

    #[test]
    fn test_operations_are_unique() {
        let mut seen = HashSet::new();
        for route in ROUTES {
            assert!(seen.insert(route.operation), "duplicate operation {}", route.operation);
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_home_is_public() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dashboard_requires_login() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/dashboard/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/accounts/login/");
    }

    #[tokio::test]
    async fn test_public_api_path_still_guarded_per_operation() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/patients/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/accounts/login/");
    }
}
