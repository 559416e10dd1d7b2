//! Registration, verification and login

use axum::http::{header, StatusCode};
use serde_json::{json, Value};

use crate::common::{
    register_payload, reload_user, seed_tenant_with_admin, test_config, TestApp, STRONG_PASSWORD,
};

#[tokio::test]
async fn test_register_creates_trial_tenant_and_sends_verification() {
    let app = TestApp::new().await;

    let response = app
        .post_json("/api/auth/register", None, register_payload("ada@clinic.example"))
        .await;
    response.assert_created();

    let json: Value = response.json();
    assert_eq!(json["user"]["status"], "PENDING_APPROVAL");
    assert_eq!(json["user"]["role"], "TENANT_ADMIN");
    assert_eq!(json["user"]["email_verified"], false);
    assert_eq!(json["tenant"]["status"], "TRIAL");
    assert_eq!(json["tenant"]["plan"], "FREE");
    assert_eq!(json["tenant"]["slug"], "lovelace-family-clinic");
    assert!(json["user"].get("password_hash").is_none());

    let subjects = app.mail_subjects("ada@clinic.example");
    assert_eq!(subjects.len(), 1);
    assert!(subjects[0].contains("Verify"));
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = TestApp::new().await;
    app.post_json("/api/auth/register", None, register_payload("dup@clinic.example"))
        .await
        .assert_created();

    let tenants = app.count_rows("tenants").await;
    let users = app.count_rows("users").await;

    app.post_json("/api/auth/register", None, register_payload("DUP@clinic.example"))
        .await
        .assert_conflict();

    assert_eq!(app.count_rows("tenants").await, tenants);
    assert_eq!(app.count_rows("users").await, users);
}

#[tokio::test]
async fn test_register_rejects_weak_password() {
    let app = TestApp::new().await;
    let mut payload = register_payload("weak@clinic.example");
    payload["password"] = json!("weak");

    let response = app.post_json("/api/auth/register", None, payload).await;
    response.assert_bad_request();

    let json: Value = response.json();
    assert!(json["details"]["fields"]["password"].as_array().is_some_and(|p| !p.is_empty()));
}

#[tokio::test]
async fn test_second_registration_of_same_organization_gets_suffixed_slug() {
    let app = TestApp::new().await;
    app.post_json("/api/auth/register", None, register_payload("one@clinic.example"))
        .await
        .assert_created();

    let response = app
        .post_json("/api/auth/register", None, register_payload("two@clinic.example"))
        .await;
    response.assert_created();
    let json: Value = response.json();
    assert_eq!(json["tenant"]["slug"], "lovelace-family-clinic-2");
}

#[tokio::test]
async fn test_verify_email_activates_user() {
    let app = TestApp::new().await;
    app.post_json("/api/auth/register", None, register_payload("verify@clinic.example"))
        .await
        .assert_created();

    let token = app.verification_token_for("verify@clinic.example");
    let response = app
        .get(&format!("/api/auth/verify-email?token={}", token), None)
        .await;
    response.assert_ok();

    let json: Value = response.json();
    assert_eq!(json["status"], "ACTIVE");
    assert_eq!(json["email_verified"], true);
    assert!(app
        .mail_subjects("verify@clinic.example")
        .iter()
        .any(|s| s.contains("Welcome")));

    // Tokens are single use
    app.post_json("/api/auth/verify-email", None, json!({ "token": token }))
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn test_verify_email_keeps_pending_when_approval_required() {
    let mut config = test_config();
    config.auth.require_admin_approval = true;
    let app = TestApp::with_config(config).await;

    app.post_json("/api/auth/register", None, register_payload("held@clinic.example"))
        .await
        .assert_created();
    let token = app.verification_token_for("held@clinic.example");

    let response = app
        .post_json("/api/auth/verify-email", None, json!({ "token": token }))
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "PENDING_APPROVAL");
    assert_eq!(json["email_verified"], true);
}

#[tokio::test]
async fn test_verify_email_with_unknown_token_fails() {
    let app = TestApp::new().await;
    app.post_json("/api/auth/verify-email", None, json!({ "token": "not-a-token" }))
        .await
        .assert_bad_request();
    app.post_json("/api/auth/verify-email", None, json!({ "token": "  " }))
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn test_login_pending_user_is_forbidden() {
    let app = TestApp::new().await;
    app.post_json("/api/auth/register", None, register_payload("pending@clinic.example"))
        .await
        .assert_created();

    app.post_json(
        "/api/auth/login",
        None,
        json!({ "email": "pending@clinic.example", "password": STRONG_PASSWORD }),
    )
    .await
    .assert_forbidden();
}

#[tokio::test]
async fn test_login_wrong_password_is_unauthorized() {
    let app = TestApp::new().await;
    let (_, admin) = seed_tenant_with_admin(&app).await;

    app.post_json(
        "/api/auth/login",
        None,
        json!({ "email": admin.email, "password": "Wr0ng!Password" }),
    )
    .await
    .assert_unauthorized();
}

#[tokio::test]
async fn test_login_sets_session_cookie_and_records_login() {
    let app = TestApp::new().await;
    let (_, admin) = seed_tenant_with_admin(&app).await;

    let response = app
        .post_json(
            "/api/auth/login",
            None,
            json!({ "email": admin.email, "password": STRONG_PASSWORD }),
        )
        .await;
    response.assert_ok();

    let cookie = response
        .headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("session cookie");
    assert!(cookie.starts_with("access_token="));
    assert!(cookie.contains("HttpOnly"));

    let json: Value = response.json();
    assert_eq!(json["token_type"], "Bearer");
    assert!(json["token"].as_str().is_some_and(|t| !t.is_empty()));

    let user = reload_user(&app, admin.id).await;
    assert!(user.last_login_at.is_some());
}

#[tokio::test]
async fn test_me_returns_profile_with_core_modules() {
    let app = TestApp::new().await;
    let (tenant, admin) = seed_tenant_with_admin(&app).await;
    let token = app.token_for(&admin);

    let response = app.get("/api/auth/me", Some(&token)).await;
    response.assert_ok();

    let json: Value = response.json();
    assert_eq!(json["user"]["id"], admin.id.to_string());
    assert_eq!(json["tenant"]["id"], tenant.id.to_string());
    let modules: Vec<String> = serde_json::from_value(json["modules"].clone()).unwrap();
    assert!(modules.contains(&"CORE_DASHBOARD".to_string()));
    assert!(json["trial_days_remaining"].as_i64().is_some_and(|d| d > 0));
}

#[tokio::test]
async fn test_session_cookie_authenticates() {
    let app = TestApp::new().await;
    let (_, admin) = seed_tenant_with_admin(&app).await;
    let token = app.token_for(&admin);

    let request = axum::http::Request::builder()
        .uri("/api/auth/me")
        .header(header::COOKIE, format!("access_token={}", token))
        .body(axum::body::Body::empty())
        .unwrap();
    app.request(request).await.assert_ok();
}

#[tokio::test]
async fn test_protected_route_without_token_is_unauthorized() {
    let app = TestApp::new().await;
    app.get("/api/auth/me", None).await.assert_unauthorized();
    app.get("/api/auth/me", Some("garbage")).await.assert_unauthorized();
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let app = TestApp::new().await;
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/auth/logout")
        .header(header::COOKIE, "access_token=stale")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.request(request).await;
    response.assert_status(StatusCode::NO_CONTENT);

    let cookie = response
        .headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("removal cookie");
    assert!(cookie.starts_with("access_token=;"));
}
