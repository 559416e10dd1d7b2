//! Simulated plan payments

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use medsas::models::{PlanTier, TenantStatus, UserRole, UserStatus};

use crate::common::{
    payment_payload, reload_tenant, reload_user, seed_tenant, seed_tenant_with_admin,
    set_tenant_status, TestApp, UserSeed, DECLINED_CARD, VALID_CARD,
};

#[tokio::test]
async fn test_declined_card_returns_payment_required() {
    let app = TestApp::new().await;
    let (tenant, admin) = seed_tenant_with_admin(&app).await;

    let response = app
        .post_json(
            "/api/payment/process",
            Some(&app.token_for(&admin)),
            payment_payload("BASIC", "MONTHLY", DECLINED_CARD),
        )
        .await;
    response.assert_status(StatusCode::PAYMENT_REQUIRED);

    assert_eq!(reload_tenant(&app, tenant.id).await.status, TenantStatus::Trial);
    let subscription: Value = app
        .get("/api/payment/subscription", Some(&app.token_for(&admin)))
        .await
        .json();
    assert!(subscription.is_null());
}

#[tokio::test]
async fn test_invalid_card_is_rejected() {
    let app = TestApp::new().await;
    let (_, admin) = seed_tenant_with_admin(&app).await;

    let response = app
        .post_json(
            "/api/payment/process",
            Some(&app.token_for(&admin)),
            payment_payload("BASIC", "MONTHLY", "4242424242424241"),
        )
        .await;
    response.assert_bad_request();
    let json: Value = response.json();
    assert!(json["details"]["fields"]["card.number"].is_array());
}

#[tokio::test]
async fn test_free_plan_needs_no_payment() {
    let app = TestApp::new().await;
    let (_, admin) = seed_tenant_with_admin(&app).await;

    app.post_json(
        "/api/payment/process",
        Some(&app.token_for(&admin)),
        payment_payload("FREE", "MONTHLY", VALID_CARD),
    )
    .await
    .assert_bad_request();
}

#[tokio::test]
async fn test_successful_payment_activates_tenant_on_paid_plan() {
    let app = TestApp::new().await;
    let (tenant, admin) = seed_tenant_with_admin(&app).await;
    let token = app.token_for(&admin);
    let trial_end = admin.trial_end_date.unwrap();

    let response = app
        .post_json(
            "/api/payment/process",
            Some(&token),
            payment_payload("PROFESSIONAL", "MONTHLY", VALID_CARD),
        )
        .await;
    response.assert_ok();

    let receipt: Value = response.json();
    let subscription = &receipt["subscription"];
    assert_eq!(subscription["plan"], "PROFESSIONAL");
    assert_eq!(subscription["status"], "ACTIVE");
    assert_eq!(subscription["card_last4"], "4242");
    assert_eq!(subscription["currency"], "USD");
    let amount: Decimal = subscription["amount"].as_str().unwrap().parse().unwrap();
    assert_eq!(amount, Decimal::new(249, 0));
    assert!(subscription["payment_reference"]
        .as_str()
        .is_some_and(|r| r.starts_with("PAY-")));

    // Paid time starts after the remaining trial
    let paid_until: DateTime<Utc> =
        serde_json::from_value(receipt["trial_end_date"].clone()).unwrap();
    assert!(paid_until >= trial_end + Duration::days(30) - Duration::seconds(5));

    let tenant = reload_tenant(&app, tenant.id).await;
    assert_eq!(tenant.status, TenantStatus::Active);
    assert_eq!(tenant.plan, PlanTier::Professional);

    assert!(app
        .mail_subjects(&admin.email)
        .iter()
        .any(|s| s.contains("receipt")));

    let current: Value = app.get("/api/payment/subscription", Some(&token)).await.json();
    assert_eq!(current["id"], subscription["id"]);
}

#[tokio::test]
async fn test_yearly_payment_replaces_previous_subscription() {
    let app = TestApp::new().await;
    let (_, admin) = seed_tenant_with_admin(&app).await;
    let token = app.token_for(&admin);

    let first: Value = app
        .post_json(
            "/api/payment/process",
            Some(&token),
            payment_payload("BASIC", "MONTHLY", VALID_CARD),
        )
        .await
        .json();

    let response = app
        .post_json(
            "/api/payment/process",
            Some(&token),
            payment_payload("BASIC", "YEARLY", VALID_CARD),
        )
        .await;
    response.assert_ok();
    let second: Value = response.json();
    let amount: Decimal = second["subscription"]["amount"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(amount, Decimal::new(990, 0));

    let current: Value = app.get("/api/payment/subscription", Some(&token)).await.json();
    assert_eq!(current["id"], second["subscription"]["id"]);
    assert_ne!(current["id"], first["subscription"]["id"]);
}

#[tokio::test]
async fn test_payment_restores_expired_tenant() {
    let app = TestApp::new().await;
    let tenant = seed_tenant(&app).await;
    set_tenant_status(&app, &tenant, TenantStatus::Suspended).await;
    let owner = UserSeed::new(UserRole::TenantAdmin, UserStatus::TrialExpired)
        .in_tenant(&tenant)
        .trial_ending(Utc::now() - Duration::days(5))
        .insert(&app)
        .await;
    let colleague = UserSeed::new(UserRole::TenantUser, UserStatus::TrialExpired)
        .in_tenant(&tenant)
        .trial_ending(Utc::now() - Duration::days(5))
        .insert(&app)
        .await;

    app.post_json(
        "/api/payment/process",
        Some(&app.token_for(&owner)),
        payment_payload("ENTERPRISE", "MONTHLY", VALID_CARD),
    )
    .await
    .assert_ok();

    let owner = reload_user(&app, owner.id).await;
    assert_eq!(owner.status, UserStatus::Active);
    assert!(owner.trial_end_date.is_some_and(|end| end > Utc::now() + Duration::days(29)));
    assert_eq!(reload_user(&app, colleague.id).await.status, UserStatus::Active);
    assert_eq!(reload_tenant(&app, tenant.id).await.status, TenantStatus::Active);
}

#[tokio::test]
async fn test_suspended_user_cannot_pay() {
    let app = TestApp::new().await;
    let tenant = seed_tenant(&app).await;
    let user = UserSeed::new(UserRole::TenantUser, UserStatus::Suspended)
        .in_tenant(&tenant)
        .insert(&app)
        .await;

    app.post_json(
        "/api/payment/process",
        Some(&app.token_for(&user)),
        payment_payload("BASIC", "MONTHLY", VALID_CARD),
    )
    .await
    .assert_conflict();
}
