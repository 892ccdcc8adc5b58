//! End-to-end access control through the HTTP router

use api_server::{
    auth::hash_password,
    models::{Account, Gender, PatientRequest},
    routes::create_router,
    state::AppState,
};
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use clinic_rbac::{Identity, OwnershipScope, PatientId, Role, UserId};
use serde_json::{json, Value};
use tower::ServiceExt;

const REQUEST_ID: &str = "0d7e3f7c-5a53-4b4e-9d5e-4f3c2b1a0e9d";

// ============================================================================
// FIXTURES
// ============================================================================

struct Harness {
    state: AppState,
    app: Router,
}

impl Harness {
    fn new() -> Self {
        let state = AppState::in_memory().unwrap();
        let app = create_router(state.clone());
        Self { state, app }
    }

    /// Stored account plus a live session token
    async fn login_as(&self, identity: Identity) -> String {
        let mut account = Account::new(identity);
        account.password_digest = Some(hash_password("correct horse").unwrap());
        let account = self.state.store.create_account(account).await.unwrap();
        self.state.sessions.issue(account.id())
    }

    async fn patient_profile(&self, last_name: &str) -> PatientId {
        self.state
            .store
            .create_patient(patient_request(last_name).into_profile())
            .await
            .unwrap()
            .id
    }

    async fn patient(&self, username: &str) -> (String, PatientId) {
        let profile = self.patient_profile(username).await;
        let token = self
            .login_as(
                Identity::new(UserId(0), username, Role::Patient).with_patient_profile(profile),
            )
            .await;
        (token, profile)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-request-id", REQUEST_ID);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        self.send(Method::GET, uri, token, None).await
    }
}

fn patient_request(last_name: &str) -> PatientRequest {
    serde_json::from_value(json!({
        "first_name": "Test",
        "last_name": last_name,
        "date_of_birth": "1990-01-01",
        "gender": "other",
        "address": "1 Main St",
        "phone_number": "555-0100",
        "emergency_contact_name": "Kin",
        "emergency_contact_phone": "555-0101"
    }))
    .unwrap()
}

async fn bytes(response: Response) -> Bytes {
    to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    serde_json::from_slice(&bytes(response).await).unwrap()
}

fn assert_redirect(response: &Response, location: &str, notice: &str) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], location);
    assert_eq!(response.headers()["x-notice"], notice);
}

// ============================================================================
// PATH GATE
// ============================================================================

#[tokio::test]
async fn test_anonymous_allowed_on_public_paths() {
    let h = Harness::new();

    for path in ["/", "/api/health/"] {
        let response = h.get(path, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
    }
}

#[tokio::test]
async fn test_anonymous_sent_to_login() {
    let h = Harness::new();

    for path in ["/dashboard/", "/appointments/", "/medical-records/", "/admin/users/"] {
        let response = h.get(path, None).await;
        assert_redirect(
            &response,
            "/accounts/login/",
            "Please log in to access this page.",
        );
    }
}

#[tokio::test]
async fn test_invalid_role_sent_to_login() {
    let h = Harness::new();
    let token = h.login_as(Identity::without_role(UserId(0), "ghost")).await;

    let response = h.get("/dashboard/", Some(&token)).await;
    assert_redirect(
        &response,
        "/accounts/login/",
        "Invalid user type. Please contact support.",
    );
}

#[tokio::test]
async fn test_doctor_denied_admin_area() {
    let h = Harness::new();
    let token = h
        .login_as(Identity::new(UserId(0), "house", Role::Doctor))
        .await;

    let response = h.get("/admin/users/", Some(&token)).await;
    assert_redirect(
        &response,
        "/dashboard/",
        "Access denied. Doctors cannot access admin areas.",
    );
    assert_eq!(response.headers()["x-notice-level"], "error");
}

#[tokio::test]
async fn test_patient_denied_medical_records_area() {
    let h = Harness::new();
    let (token, _) = h.patient("alice").await;

    let response = h.get("/medical-records/", Some(&token)).await;
    assert_redirect(
        &response,
        "/dashboard/",
        "Access denied. Patients cannot access this area.",
    );
}

#[tokio::test]
async fn test_staff_soft_redirected_outside_area() {
    let h = Harness::new();
    let token = h
        .login_as(Identity::new(UserId(0), "desk", Role::Staff))
        .await;

    let response = h.get("/patients/list/", Some(&token)).await;
    assert_redirect(&response, "/dashboard/", "Redirecting to your dashboard.");
    assert_eq!(response.headers()["x-notice-level"], "info");

    let response = h.get("/appointments/", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_public_api_path_enforces_operation_roles() {
    let h = Harness::new();
    let (patient, _) = h.patient("alice").await;
    let doctor = h
        .login_as(Identity::new(UserId(0), "house", Role::Doctor))
        .await;

    let response = h.get("/api/patients/", None).await;
    assert_redirect(
        &response,
        "/accounts/login/",
        "Please log in to access this page.",
    );

    let response = h.get("/api/patients/", Some(&patient)).await;
    assert_redirect(
        &response,
        "/dashboard/",
        "Access denied. This area is restricted to doctor, admin.",
    );

    let response = h.get("/api/patients/", Some(&doctor)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_path_still_gated() {
    let h = Harness::new();
    let admin = h
        .login_as(Identity::new(UserId(0), "root", Role::Admin))
        .await;

    let response = h.get("/no-such-page/", None).await;
    assert_redirect(
        &response,
        "/accounts/login/",
        "Please log in to access this page.",
    );

    let response = h.get("/no-such-page/", Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_each_request_counted_once() {
    let h = Harness::new();
    let doctor = h
        .login_as(Identity::new(UserId(0), "house", Role::Doctor))
        .await;
    let (patient, _) = h.patient("alice").await;

    h.get("/appointments/", Some(&doctor)).await;
    assert_eq!(h.state.metrics.count("allow", "doctor"), 1);

    h.get("/api/patients/", Some(&patient)).await;
    assert_eq!(h.state.metrics.count("role_forbidden", "patient"), 1);
    assert_eq!(h.state.metrics.count("allow", "patient"), 0);
}

#[tokio::test]
async fn test_admin_reads_path_rules() {
    let h = Harness::new();
    let admin = h
        .login_as(Identity::new(UserId(0), "root", Role::Admin))
        .await;

    let response = h.get("/admin/policy/", Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rules = json_body(response).await;
    let records = rules
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["prefix"] == "/medical-records/")
        .unwrap();
    assert_eq!(records["allowed_roles"], json!(["doctor", "admin"]));
}

// ============================================================================
// OWNERSHIP
// ============================================================================

#[tokio::test]
async fn test_foreign_appointment_indistinguishable_from_missing() {
    let h = Harness::new();
    let (alice, _) = h.patient("alice").await;
    let (bob, _) = h.patient("bob").await;

    let tomorrow = (Utc::now() + Duration::days(2)).date_naive();
    let created = h
        .send(
            Method::POST,
            "/appointments/",
            Some(&bob),
            Some(json!({ "date": tomorrow, "reason": "checkup" })),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let bobs_id = json_body(created).await["id"].as_u64().unwrap();

    let foreign = h.get(&format!("/appointments/{}/", bobs_id), Some(&alice)).await;
    let missing = h.get("/appointments/999999/", Some(&alice)).await;

    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(foreign.headers(), missing.headers());
    assert_eq!(bytes(foreign).await, bytes(missing).await);

    let own = h.get(&format!("/appointments/{}/", bobs_id), Some(&bob)).await;
    assert_eq!(own.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_foreign_appointment_cannot_be_deleted() {
    let h = Harness::new();
    let (alice, _) = h.patient("alice").await;
    let (_, bob_profile) = h.patient("bob").await;
    let doctor = h
        .login_as(Identity::new(UserId(0), "house", Role::Doctor))
        .await;

    let start = Utc::now() + Duration::days(3);
    let created = h
        .send(
            Method::POST,
            "/appointments/",
            Some(&doctor),
            Some(json!({
                "patient": bob_profile,
                "start_time": start,
                "end_time": start + Duration::minutes(30),
                "reason": "follow-up"
            })),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = json_body(created).await;
    let id = body["id"].as_u64().unwrap();
    assert!(body["doctor"].is_u64(), "doctor defaults to the creator");

    let response = h
        .send(Method::DELETE, &format!("/appointments/{}/", id), Some(&alice), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let still_there = h
        .state
        .store
        .get_appointment(OwnershipScope::Unscoped, id)
        .await;
    assert!(still_there.is_ok());
}

#[tokio::test]
async fn test_patient_without_profile_gets_specific_message() {
    let h = Harness::new();
    let token = h
        .login_as(Identity::new(UserId(0), "orphan", Role::Patient))
        .await;

    let response = h.get("/appointments/", Some(&token)).await;
    assert_redirect(
        &response,
        "/dashboard/",
        "Your user profile is not linked to a patient profile.",
    );

    let audit = h.state.audit_log.query_by_username("orphan", 10);
    assert!(audit
        .iter()
        .any(|e| e.kind == clinic_rbac::AuditKind::MissingProfile));
}

#[tokio::test]
async fn test_patient_sees_only_own_records() {
    let h = Harness::new();
    let (alice, alice_profile) = h.patient("alice").await;
    let bob_profile = h.patient_profile("bob").await;
    let doctor = h
        .login_as(Identity::new(UserId(0), "house", Role::Doctor))
        .await;

    for patient in [alice_profile, bob_profile] {
        let response = h
            .send(
                Method::POST,
                "/medical-records/",
                Some(&doctor),
                Some(json!({ "patient": patient, "chief_complaint": "cough" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = h.get("/patients/records/", Some(&alice)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let records = json_body(response).await;
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["patient"], json!(alice_profile));
}

// ============================================================================
// HANDLERS
// ============================================================================

#[tokio::test]
async fn test_patient_appointment_gets_morning_slot() {
    let h = Harness::new();
    let (token, profile) = h.patient("alice").await;
    let date = (Utc::now() + Duration::days(2)).date_naive();

    let response = h
        .send(
            Method::POST,
            "/appointments/",
            Some(&token),
            Some(json!({ "date": date, "reason": "checkup", "patient": 999 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["patient"], json!(profile));
    assert_eq!(body["status"], "scheduled");
    assert_eq!(body["start_time"], json!(date.and_hms_opt(9, 0, 0).unwrap().and_utc()));
    assert_eq!(body["end_time"], json!(date.and_hms_opt(9, 30, 0).unwrap().and_utc()));
}

#[tokio::test]
async fn test_appointment_in_past_rejected() {
    let h = Harness::new();
    let doctor = h
        .login_as(Identity::new(UserId(0), "house", Role::Doctor))
        .await;
    let profile = h.patient_profile("bob").await;
    let start = Utc::now() - Duration::days(1);

    let response = h
        .send(
            Method::POST,
            "/appointments/",
            Some(&doctor),
            Some(json!({
                "patient": profile,
                "start_time": start,
                "end_time": start + Duration::minutes(30),
                "reason": "late"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"],
        "Appointment start time cannot be in the past."
    );
}

#[tokio::test]
async fn test_record_for_unknown_patient_rejected() {
    let h = Harness::new();
    let doctor = h
        .login_as(Identity::new(UserId(0), "house", Role::Doctor))
        .await;

    let response = h
        .send(
            Method::POST,
            "/medical-records/",
            Some(&doctor),
            Some(json!({ "patient": 424242 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid patient ID.");
}

#[tokio::test]
async fn test_dashboard_counts_for_patient() {
    let h = Harness::new();
    let (token, _) = h.patient("alice").await;
    let date = (Utc::now() + Duration::days(2)).date_naive();
    h.send(
        Method::POST,
        "/appointments/",
        Some(&token),
        Some(json!({ "date": date, "reason": "checkup" })),
    )
    .await;

    let body = json_body(h.get("/dashboard/", Some(&token)).await).await;
    assert_eq!(body["role"], "patient");
    assert_eq!(body["upcoming_appointments_count"], 1);
    assert_eq!(body["medical_records_count"], 0);
}

#[tokio::test]
async fn test_dashboard_reports_missing_profile() {
    let h = Harness::new();
    let token = h
        .login_as(Identity::new(UserId(0), "orphan", Role::Patient))
        .await;

    let response = h.get("/dashboard/", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(
        body["notice"],
        "Your user profile is not linked to a patient profile."
    );
    assert!(body.get("upcoming_appointments_count").is_none());
    assert!(body.get("medical_records_count").is_none());

    let messages = json_body(h.get("/accounts/messages/", Some(&token)).await).await;
    assert_eq!(
        messages[0]["text"],
        "Your user profile is not linked to a patient profile."
    );
    assert!(h
        .state
        .audit_log
        .query_by_username("orphan", 10)
        .iter()
        .any(|e| e.kind == clinic_rbac::AuditKind::MissingProfile));
}

#[tokio::test]
async fn test_superuser_coerced_to_admin_on_update() {
    let h = Harness::new();
    let admin = h
        .login_as(Identity::new(UserId(0), "root", Role::Admin))
        .await;
    let created = h
        .send(
            Method::POST,
            "/admin/users/",
            Some(&admin),
            Some(json!({ "username": "nurse", "role": "staff" })),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let id = json_body(created).await["id"].as_u64().unwrap();

    let updated = h
        .send(
            Method::PUT,
            &format!("/admin/users/{}/", id),
            Some(&admin),
            Some(json!({ "role": "patient", "is_superuser": true })),
        )
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let body = json_body(updated).await;
    assert_eq!(body["role"], "admin");
    assert_eq!(body["is_superuser"], true);
}

#[tokio::test]
async fn test_audit_log_and_metrics_for_admin() {
    let h = Harness::new();
    let admin = h
        .login_as(Identity::new(UserId(0), "root", Role::Admin))
        .await;
    let doctor = h
        .login_as(Identity::new(UserId(0), "house", Role::Doctor))
        .await;
    h.get("/admin/users/", Some(&doctor)).await;

    let response = h.get("/admin/audit/?username=house", Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["events"][0]["kind"], "role_mismatch");
    assert!(body["stats"]["denials"].as_u64().unwrap() >= 1);

    let response = h.get("/admin/metrics/", Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(bytes(response).await.to_vec()).unwrap();
    assert!(text.contains("clinic_access_decisions_total"));
}

// ============================================================================
// ACCOUNTS & FLASH MESSAGES
// ============================================================================

#[tokio::test]
async fn test_register_login_and_welcome_message() {
    let h = Harness::new();

    let response = h
        .send(
            Method::POST,
            "/accounts/register/",
            None,
            Some(json!({ "username": "carol", "password": "long-enough-pw" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = h
        .send(
            Method::POST,
            "/accounts/login/",
            None,
            Some(json!({ "username": "carol", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .send(
            Method::POST,
            "/accounts/login/",
            None,
            Some(json!({ "username": "carol", "password": "long-enough-pw" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["role"], "patient");
    let token = body["token"].as_str().unwrap().to_string();

    let messages = json_body(h.get("/accounts/messages/", Some(&token)).await).await;
    assert_eq!(messages[0]["text"], "Welcome back, carol!");
    assert_eq!(messages[0]["level"], "success");

    let response = h
        .send(Method::POST, "/accounts/logout/", Some(&token), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.state.sessions.resolve(&token).is_none());
}

#[tokio::test]
async fn test_denial_message_flashed_to_session() {
    let h = Harness::new();
    let token = h
        .login_as(Identity::new(UserId(0), "house", Role::Doctor))
        .await;

    h.get("/admin/users/", Some(&token)).await;

    let messages = json_body(h.get("/accounts/messages/", Some(&token)).await).await;
    assert_eq!(
        messages[0]["text"],
        "Access denied. Doctors cannot access admin areas."
    );

    let drained = json_body(h.get("/accounts/messages/", Some(&token)).await).await;
    assert_eq!(drained, json!([]));
}

#[tokio::test]
async fn test_clinician_created_patient_can_activate() {
    let h = Harness::new();
    let doctor = h
        .login_as(Identity::new(UserId(0), "house", Role::Doctor))
        .await;

    let mut request = serde_json::to_value(patient_request("dupont")).unwrap();
    request["username"] = json!("jdupont");
    let response = h
        .send(Method::POST, "/patients/", Some(&doctor), Some(request))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let profile = json_body(response).await;
    assert!(profile["user"].is_u64());

    let activate = json!({
        "username": "jdupont",
        "password1": "brand-new-pass",
        "password2": "brand-new-pass"
    });
    let response = h
        .send(
            Method::POST,
            "/accounts/patient-register/",
            None,
            Some(activate.clone()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let again = h
        .send(Method::POST, "/accounts/patient-register/", None, Some(activate))
        .await;
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(again).await["error"],
        "This account is already registered. Please log in or reset your password."
    );

    let login = h
        .send(
            Method::POST,
            "/accounts/login/",
            None,
            Some(json!({ "username": "jdupont", "password": "brand-new-pass" })),
        )
        .await;
    assert_eq!(login.status(), StatusCode::OK);
    let token = json_body(login).await["token"].as_str().unwrap().to_string();

    let own = h.get("/patients/profile/", Some(&token)).await;
    assert_eq!(own.status(), StatusCode::OK);
    assert_eq!(json_body(own).await["last_name"], "dupont");
}

#[tokio::test]
async fn test_patient_register_rejects_mismatch_and_unknown() {
    let h = Harness::new();

    let response = h
        .send(
            Method::POST,
            "/accounts/patient-register/",
            None,
            Some(json!({
                "username": "nobody",
                "password1": "brand-new-pass",
                "password2": "different-pass"
            })),
        )
        .await;
    assert_eq!(json_body(response).await["error"], "Passwords do not match.");

    let response = h
        .send(
            Method::POST,
            "/accounts/patient-register/",
            None,
            Some(json!({
                "username": "nobody",
                "password1": "brand-new-pass",
                "password2": "brand-new-pass"
            })),
        )
        .await;
    assert_eq!(
        json_body(response).await["error"],
        "No patient account with this username. Please get your username from your doctor."
    );
}

#[tokio::test]
async fn test_doctor_edits_own_profile() {
    let h = Harness::new();
    let doctor = h
        .login_as(Identity::new(UserId(0), "house", Role::Doctor))
        .await;

    let response = h
        .send(
            Method::PUT,
            "/accounts/profile/edit/",
            Some(&doctor),
            Some(json!({ "first_name": "Gregory", "email": "house@clinic.test" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["first_name"], "Gregory");
    assert_eq!(body["email"], "house@clinic.test");
    assert_eq!(body["role"], "doctor");

    let stored = h.state.store.find_account("house").await.unwrap();
    assert_eq!(stored.first_name, "Gregory");

    let messages = json_body(h.get("/accounts/messages/", Some(&doctor)).await).await;
    assert_eq!(messages[0]["text"], "Your profile has been updated successfully!");
}

#[tokio::test]
async fn test_doctor_profile_edit_refused_to_others() {
    let h = Harness::new();
    let (patient, _) = h.patient("alice").await;

    let response = h
        .send(
            Method::PUT,
            "/accounts/profile/edit/",
            Some(&patient),
            Some(json!({ "first_name": "Mallory" })),
        )
        .await;
    assert_redirect(
        &response,
        "/dashboard/",
        "Access denied. This area is restricted to doctor.",
    );

    let stored = h.state.store.find_account("alice").await.unwrap();
    assert_eq!(stored.first_name, "");
}

#[test]
fn test_patient_request_fixture_is_valid() {
    let request = patient_request("x");
    assert_eq!(request.gender, Gender::Other);
    assert!(request.check().is_ok());
}
