//! Approval, trial expiry, trial extension and suspension flows

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use medsas::models::{TenantStatus, UserRole, UserStatus};

use crate::common::{
    end_suspension_at, reload_tenant, reload_user, seed_super_admin, seed_tenant,
    seed_tenant_with_admin, TestApp, UserSeed,
};

#[tokio::test]
async fn test_super_admin_lists_and_approves_pending_registrations() {
    let app = TestApp::new().await;
    let admin = seed_super_admin(&app).await;
    let token = app.token_for(&admin);

    let tenant = seed_tenant(&app).await;
    let pending = UserSeed::new(UserRole::TenantAdmin, UserStatus::PendingApproval)
        .in_tenant(&tenant)
        .insert(&app)
        .await;

    let response = app.get("/api/super-admin/users", Some(&token)).await;
    response.assert_ok();
    let listed: Vec<Value> = response.json();
    assert!(listed.iter().any(|u| u["id"] == pending.id.to_string()));

    let response = app
        .post_json(
            "/api/super-admin/users",
            Some(&token),
            json!({ "user_id": pending.id, "action": "approve" }),
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "ACTIVE");

    assert!(app
        .mail_subjects(&pending.email)
        .iter()
        .any(|s| s.contains("approved")));
}

#[tokio::test]
async fn test_rejecting_tenant_admin_cancels_tenant() {
    let app = TestApp::new().await;
    let admin = seed_super_admin(&app).await;
    let token = app.token_for(&admin);

    let tenant = seed_tenant(&app).await;
    let pending = UserSeed::new(UserRole::TenantAdmin, UserStatus::PendingApproval)
        .in_tenant(&tenant)
        .insert(&app)
        .await;

    app.post_json(
        "/api/super-admin/users",
        Some(&token),
        json!({ "user_id": pending.id, "action": "reject", "reason": "Incomplete details" }),
    )
    .await
    .assert_ok();

    assert_eq!(reload_user(&app, pending.id).await.status, UserStatus::Rejected);
    assert_eq!(reload_tenant(&app, tenant.id).await.status, TenantStatus::Cancelled);
}

#[tokio::test]
async fn test_approving_active_user_is_rejected() {
    let app = TestApp::new().await;
    let admin = seed_super_admin(&app).await;
    let token = app.token_for(&admin);
    let (_, tenant_admin) = seed_tenant_with_admin(&app).await;

    let response = app
        .post_json(
            "/api/super-admin/users",
            Some(&token),
            json!({ "user_id": tenant_admin.id, "action": "approve" }),
        )
        .await;
    assert!(response.status.is_client_error(), "got {}", response.status);
}

#[tokio::test]
async fn test_tenant_admin_cannot_use_super_admin_routes() {
    let app = TestApp::new().await;
    let (_, tenant_admin) = seed_tenant_with_admin(&app).await;
    let token = app.token_for(&tenant_admin);

    app.get("/api/super-admin/users", Some(&token))
        .await
        .assert_forbidden();
    app.post_json("/api/super-admin/lifecycle/sweep", Some(&token), json!({}))
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn test_sweep_expires_trial_and_suspends_tenant() {
    let app = TestApp::new().await;
    let admin = seed_super_admin(&app).await;
    let token = app.token_for(&admin);

    let tenant = seed_tenant(&app).await;
    let expired = UserSeed::new(UserRole::TenantAdmin, UserStatus::Active)
        .in_tenant(&tenant)
        .trial_ending(Utc::now() - Duration::days(1))
        .insert(&app)
        .await;
    let colleague = UserSeed::new(UserRole::TenantUser, UserStatus::Active)
        .in_tenant(&tenant)
        .insert(&app)
        .await;

    // A dry run only counts
    let response = app
        .post_json("/api/super-admin/lifecycle/sweep?dry_run=true", Some(&token), json!({}))
        .await;
    response.assert_ok();
    let summary: Value = response.json();
    assert_eq!(summary["dry_run"], true);
    assert_eq!(summary["trials_expired"], 1);
    assert_eq!(reload_user(&app, expired.id).await.status, UserStatus::Active);

    let response = app
        .post_json("/api/super-admin/lifecycle/sweep", Some(&token), json!({}))
        .await;
    response.assert_ok();
    let summary: Value = response.json();
    assert_eq!(summary["trials_expired"], 1);
    assert_eq!(summary["tenants_suspended"], 1);
    assert_eq!(summary["users_cascaded"], 1);

    assert_eq!(reload_user(&app, expired.id).await.status, UserStatus::TrialExpired);
    assert_eq!(reload_user(&app, colleague.id).await.status, UserStatus::TrialExpired);
    assert_eq!(reload_tenant(&app, tenant.id).await.status, TenantStatus::Suspended);
    assert!(app
        .mail_subjects(&expired.email)
        .iter()
        .any(|s| s.contains("trial")));

    // A second pass finds nothing left to do
    let summary: Value = app
        .post_json("/api/super-admin/lifecycle/sweep", Some(&token), json!({}))
        .await
        .json();
    assert_eq!(summary["trials_expired"], 0);
}

#[tokio::test]
async fn test_sweep_expires_lapsed_trial_regardless_of_tenant_status() {
    let app = TestApp::new().await;
    let admin = seed_super_admin(&app).await;
    let token = app.token_for(&admin);

    let tenant = seed_tenant(&app).await;
    crate::common::set_tenant_status(&app, &tenant, TenantStatus::Active).await;
    let user = UserSeed::new(UserRole::TenantAdmin, UserStatus::Active)
        .in_tenant(&tenant)
        .trial_ending(Utc::now() - Duration::days(1))
        .insert(&app)
        .await;

    let summary: Value = app
        .post_json("/api/super-admin/lifecycle/sweep", Some(&token), json!({}))
        .await
        .json();
    assert_eq!(summary["trials_expired"], 1);
    assert_eq!(reload_user(&app, user.id).await.status, UserStatus::TrialExpired);
    assert_eq!(reload_tenant(&app, tenant.id).await.status, TenantStatus::Suspended);
}

#[tokio::test]
async fn test_trial_extension_reactivates_expired_user() {
    let app = TestApp::new().await;
    let admin = seed_super_admin(&app).await;
    let token = app.token_for(&admin);

    let tenant = seed_tenant(&app).await;
    let user = UserSeed::new(UserRole::TenantAdmin, UserStatus::TrialExpired)
        .in_tenant(&tenant)
        .trial_ending(Utc::now() - Duration::days(2))
        .insert(&app)
        .await;

    let response = app
        .post_json(
            &format!("/api/admin/users/{}/trial-days", user.id),
            Some(&token),
            json!({ "days": 14 }),
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "ACTIVE");
    assert_eq!(json["extra_trial_days"], 14);

    // Out of range
    app.post_json(
        &format!("/api/admin/users/{}/trial-days", user.id),
        Some(&token),
        json!({ "days": 0 }),
    )
    .await
    .assert_bad_request();
}

#[tokio::test]
async fn test_trial_extension_requires_super_admin() {
    let app = TestApp::new().await;
    let (tenant, tenant_admin) = seed_tenant_with_admin(&app).await;
    let member = UserSeed::new(UserRole::TenantUser, UserStatus::Active)
        .in_tenant(&tenant)
        .insert(&app)
        .await;

    app.post_json(
        &format!("/api/admin/users/{}/trial-days", member.id),
        Some(&app.token_for(&tenant_admin)),
        json!({ "days": 7 }),
    )
    .await
    .assert_forbidden();
}

#[tokio::test]
async fn test_suspension_appeal_and_decision() {
    let app = TestApp::new().await;
    let (tenant, tenant_admin) = seed_tenant_with_admin(&app).await;
    let admin_token = app.token_for(&tenant_admin);
    let member = UserSeed::new(UserRole::TenantUser, UserStatus::Active)
        .in_tenant(&tenant)
        .insert(&app)
        .await;
    let member_token = app.token_for(&member);

    let response = app
        .post_json(
            &format!("/api/admin/users/{}/suspend", member.id),
            Some(&admin_token),
            json!({
                "reason": "Shared credentials",
                "duration_type": "TEMPORARY",
                "duration_days": 7
            }),
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["user"]["status"], "SUSPENDED");
    let suspension_id = json["suspension"]["id"].as_str().unwrap().to_string();
    assert!(json["suspension"]["appeal_deadline"].is_string());

    // Suspended users keep their session and can see why
    let response = app.get("/api/suspension", Some(&member_token)).await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["suspended"], true);
    assert_eq!(json["can_appeal_now"], true);

    let response = app
        .post_json(
            "/api/suspension/appeal",
            Some(&member_token),
            json!({ "reason": "It was a one-off" }),
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["appeal_status"], "PENDING");

    app.post_json(
        "/api/suspension/appeal",
        Some(&member_token),
        json!({ "reason": "Again" }),
    )
    .await
    .assert_conflict();

    let response = app
        .post_json(
            &format!("/api/admin/suspensions/{}/appeal-decision", suspension_id),
            Some(&admin_token),
            json!({ "approve": true, "note": "Accepted" }),
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["appeal_status"], "APPROVED");
    assert_eq!(json["is_active"], false);

    assert_eq!(reload_user(&app, member.id).await.status, UserStatus::Active);
}

/// Suspend `member` for three days and return the suspension id
async fn suspend_temporarily(app: &TestApp, admin_token: &str, member_id: uuid::Uuid) -> String {
    let json: Value = app
        .post_json(
            &format!("/api/admin/users/{}/suspend", member_id),
            Some(admin_token),
            json!({ "reason": "Shared credentials", "duration_type": "TEMPORARY", "duration_days": 3 }),
        )
        .await
        .json();
    json["suspension"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_elapsed_suspension_is_lifted_once_on_read() {
    let app = TestApp::new().await;
    let (tenant, tenant_admin) = seed_tenant_with_admin(&app).await;
    let member = UserSeed::new(UserRole::TenantUser, UserStatus::Active)
        .in_tenant(&tenant)
        .insert(&app)
        .await;
    let member_token = app.token_for(&member);

    let suspension_id = suspend_temporarily(&app, &app.token_for(&tenant_admin), member.id).await;
    assert_eq!(reload_user(&app, member.id).await.status, UserStatus::Suspended);
    end_suspension_at(&app, &suspension_id, Utc::now() - Duration::hours(1)).await;

    let json: Value = app.get("/api/suspension", Some(&member_token)).await.json();
    assert_eq!(json["suspended"], false);
    assert_eq!(reload_user(&app, member.id).await.status, UserStatus::Active);

    let (is_active, lifted_at): (i64, Option<String>) =
        sqlx::query_as("SELECT is_active, lifted_at FROM suspensions WHERE id = ?")
            .bind(&suspension_id)
            .fetch_one(&app.state.db)
            .await
            .unwrap();
    assert_eq!(is_active, 0);
    assert!(lifted_at.is_some());

    // Reconciling again changes nothing
    let json: Value = app.get("/api/suspension", Some(&member_token)).await.json();
    assert_eq!(json["suspended"], false);
    assert_eq!(reload_user(&app, member.id).await.status, UserStatus::Active);
    let lifted_again: Option<String> =
        sqlx::query_scalar("SELECT lifted_at FROM suspensions WHERE id = ?")
            .bind(&suspension_id)
            .fetch_one(&app.state.db)
            .await
            .unwrap();
    assert_eq!(lifted_again, lifted_at);
}

#[tokio::test]
async fn test_sweep_lifts_elapsed_suspensions() {
    let app = TestApp::new().await;
    let super_admin = seed_super_admin(&app).await;
    let token = app.token_for(&super_admin);
    let (tenant, tenant_admin) = seed_tenant_with_admin(&app).await;
    let member = UserSeed::new(UserRole::TenantUser, UserStatus::Active)
        .in_tenant(&tenant)
        .insert(&app)
        .await;

    let suspension_id = suspend_temporarily(&app, &app.token_for(&tenant_admin), member.id).await;

    // Still running: nothing to lift
    let summary: Value = app
        .post_json("/api/super-admin/lifecycle/sweep", Some(&token), json!({}))
        .await
        .json();
    assert_eq!(summary["suspensions_lifted"], 0);
    assert_eq!(reload_user(&app, member.id).await.status, UserStatus::Suspended);

    end_suspension_at(&app, &suspension_id, Utc::now() - Duration::minutes(5)).await;
    let summary: Value = app
        .post_json("/api/super-admin/lifecycle/sweep", Some(&token), json!({}))
        .await
        .json();
    assert_eq!(summary["suspensions_lifted"], 1);
    assert_eq!(reload_user(&app, member.id).await.status, UserStatus::Active);

    let summary: Value = app
        .post_json("/api/super-admin/lifecycle/sweep", Some(&token), json!({}))
        .await
        .json();
    assert_eq!(summary["suspensions_lifted"], 0);
}

#[tokio::test]
async fn test_temporary_suspension_requires_duration() {
    let app = TestApp::new().await;
    let (tenant, tenant_admin) = seed_tenant_with_admin(&app).await;
    let member = UserSeed::new(UserRole::TenantUser, UserStatus::Active)
        .in_tenant(&tenant)
        .insert(&app)
        .await;

    app.post_json(
        &format!("/api/admin/users/{}/suspend", member.id),
        Some(&app.token_for(&tenant_admin)),
        json!({ "reason": "Policy", "duration_type": "TEMPORARY" }),
    )
    .await
    .assert_bad_request();
}

#[tokio::test]
async fn test_oversized_suspension_duration_is_rejected() {
    let app = TestApp::new().await;
    let (tenant, tenant_admin) = seed_tenant_with_admin(&app).await;
    let member = UserSeed::new(UserRole::TenantUser, UserStatus::Active)
        .in_tenant(&tenant)
        .insert(&app)
        .await;

    let response = app
        .post_json(
            &format!("/api/admin/users/{}/suspend", member.id),
            Some(&app.token_for(&tenant_admin)),
            json!({
                "reason": "Policy",
                "duration_type": "TEMPORARY",
                "duration_days": i64::MAX
            }),
        )
        .await;
    response.assert_bad_request();
    let json: Value = response.json();
    assert!(json["details"]["fields"]["duration_days"].is_array());
    assert_eq!(reload_user(&app, member.id).await.status, UserStatus::Active);
}

#[tokio::test]
async fn test_tenant_admin_cannot_act_on_other_tenant() {
    let app = TestApp::new().await;
    let (_, tenant_admin) = seed_tenant_with_admin(&app).await;
    let (other_tenant, _) = seed_tenant_with_admin(&app).await;
    let stranger = UserSeed::new(UserRole::TenantUser, UserStatus::Active)
        .in_tenant(&other_tenant)
        .insert(&app)
        .await;

    app.post_json(
        &format!("/api/admin/users/{}/suspend", stranger.id),
        Some(&app.token_for(&tenant_admin)),
        json!({ "reason": "Nope", "duration_type": "PERMANENT" }),
    )
    .await
    .assert_forbidden();

    app.post_json(
        &format!("/api/admin/users/{}/suspend", tenant_admin.id),
        Some(&app.token_for(&tenant_admin)),
        json!({ "reason": "Self", "duration_type": "PERMANENT" }),
    )
    .await
    .assert_forbidden();
}

#[tokio::test]
async fn test_tenant_user_cannot_manage_users() {
    let app = TestApp::new().await;
    let (tenant, _) = seed_tenant_with_admin(&app).await;
    let member = UserSeed::new(UserRole::TenantUser, UserStatus::Active)
        .in_tenant(&tenant)
        .insert(&app)
        .await;
    let other = UserSeed::new(UserRole::TenantUser, UserStatus::Active)
        .in_tenant(&tenant)
        .insert(&app)
        .await;

    app.post_json(
        &format!("/api/admin/users/{}/suspend", other.id),
        Some(&app.token_for(&member)),
        json!({ "reason": "Nope", "duration_type": "PERMANENT" }),
    )
    .await
    .assert_forbidden();
}

#[tokio::test]
async fn test_tenant_admin_adds_user_to_own_tenant() {
    let app = TestApp::new().await;
    let (tenant, tenant_admin) = seed_tenant_with_admin(&app).await;
    let token = app.token_for(&tenant_admin);

    let response = app
        .post_json(
            "/api/tenant/users",
            Some(&token),
            json!({
                "first_name": "Grace",
                "last_name": "Hopper",
                "email": "grace@clinic.example",
                "password": crate::common::STRONG_PASSWORD
            }),
        )
        .await;
    response.assert_created();
    let json: Value = response.json();
    assert_eq!(json["tenant_id"], tenant.id.to_string());
    assert_eq!(json["role"], "TENANT_USER");

    let users: Vec<Value> = app.get("/api/tenant/users", Some(&token)).await.json();
    assert_eq!(users.len(), 2);
}

#[tokio::test]
async fn test_extension_after_sweep_reopens_trial_tenant() {
    let app = TestApp::new().await;
    let admin = seed_super_admin(&app).await;
    let token = app.token_for(&admin);

    let tenant = seed_tenant(&app).await;
    let owner = UserSeed::new(UserRole::TenantAdmin, UserStatus::Active)
        .in_tenant(&tenant)
        .trial_ending(Utc::now() - Duration::hours(1))
        .insert(&app)
        .await;
    let colleague = UserSeed::new(UserRole::TenantUser, UserStatus::Active)
        .in_tenant(&tenant)
        .insert(&app)
        .await;

    app.post_json("/api/super-admin/lifecycle/sweep", Some(&token), json!({}))
        .await
        .assert_ok();
    assert_eq!(reload_tenant(&app, tenant.id).await.status, TenantStatus::Suspended);

    app.post_json(
        &format!("/api/admin/users/{}/trial-days", owner.id),
        Some(&token),
        json!({ "days": 30 }),
    )
    .await
    .assert_ok();

    assert_eq!(reload_tenant(&app, tenant.id).await.status, TenantStatus::Trial);
    assert_eq!(reload_user(&app, owner.id).await.status, UserStatus::Active);
    assert_eq!(reload_user(&app, colleague.id).await.status, UserStatus::Active);
}
