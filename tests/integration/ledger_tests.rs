//! Current accounts and their ledgers

use rust_decimal::Decimal;
use serde_json::{json, Value};

use medsas::models::{UserRole, UserStatus};

use crate::common::{
    customer_account_payload, grant_module, seed_tenant_with_admin, transaction_payload, TestApp,
    UserSeed,
};

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

fn dated(document_type: &str, debit: &str, credit: &str, date: &str) -> Value {
    let mut payload = transaction_payload(document_type, debit, credit);
    payload["transaction_date"] = json!(date);
    payload
}

/// Tenant admin token for a tenant holding ACCOUNTING
async fn accounting_user(app: &TestApp) -> String {
    let (tenant, admin) = seed_tenant_with_admin(app).await;
    grant_module(app, &tenant, "ACCOUNTING").await;
    app.token_for(&admin)
}

async fn create_account(app: &TestApp, token: &str, name: &str) -> Value {
    let response = app
        .post_json(
            "/api/accounting/current-accounts",
            Some(token),
            customer_account_payload(name),
        )
        .await;
    response.assert_created();
    response.json()
}

#[tokio::test]
async fn test_accounting_requires_module() {
    let app = TestApp::new().await;
    let (_, admin) = seed_tenant_with_admin(&app).await;

    app.get("/api/accounting/current-accounts", Some(&app.token_for(&admin)))
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn test_accounting_requires_active_user() {
    let app = TestApp::new().await;
    let (tenant, _) = seed_tenant_with_admin(&app).await;
    grant_module(&app, &tenant, "ACCOUNTING").await;
    let expired = UserSeed::new(UserRole::TenantUser, UserStatus::TrialExpired)
        .in_tenant(&tenant)
        .insert(&app)
        .await;

    app.get("/api/accounting/current-accounts", Some(&app.token_for(&expired)))
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn test_account_codes_are_sequential_per_type() {
    let app = TestApp::new().await;
    let token = accounting_user(&app).await;

    let first = create_account(&app, &token, "Northwind Pharmacy").await;
    let second = create_account(&app, &token, "Contoso Labs").await;
    assert_eq!(first["code"], "C-00001");
    assert_eq!(second["code"], "C-00002");

    let response = app
        .post_json(
            "/api/accounting/current-accounts",
            Some(&token),
            json!({ "name": "MedSupply Ltd", "account_type": "SUPPLIER" }),
        )
        .await;
    response.assert_created();
    let supplier: Value = response.json();
    assert_eq!(supplier["code"], "S-00001");

    let listed: Vec<Value> = app
        .get("/api/accounting/current-accounts", Some(&token))
        .await
        .json();
    assert_eq!(listed.len(), 3);
    assert!(listed.iter().all(|a| decimal(&a["balance"]).is_zero()));
}

#[tokio::test]
async fn test_account_name_is_required() {
    let app = TestApp::new().await;
    let token = accounting_user(&app).await;

    app.post_json(
        "/api/accounting/current-accounts",
        Some(&token),
        json!({ "name": "", "account_type": "CUSTOMER" }),
    )
    .await
    .assert_bad_request();
}

#[tokio::test]
async fn test_posting_updates_balance() {
    let app = TestApp::new().await;
    let token = accounting_user(&app).await;
    let account = create_account(&app, &token, "Northwind Pharmacy").await;
    let id = account["id"].as_str().unwrap();
    let uri = format!("/api/accounting/current-accounts/{}/transactions", id);

    let response = app
        .post_json(&uri, Some(&token), transaction_payload("INVOICE", "150.00", "0"))
        .await;
    response.assert_created();
    let invoice: Value = response.json();
    assert_eq!(decimal(&invoice["balance"]), Decimal::new(150, 0));

    let receipt: Value = app
        .post_json(&uri, Some(&token), transaction_payload("RECEIPT", "0", "40.50"))
        .await
        .json();
    assert_eq!(decimal(&receipt["balance"]), Decimal::new(10950, 2));

    let summary: Value = app
        .get(&format!("/api/accounting/current-accounts/{}", id), Some(&token))
        .await
        .json();
    assert_eq!(decimal(&summary["balance"]), Decimal::new(10950, 2));
}

#[tokio::test]
async fn test_posting_rejects_invalid_amounts() {
    let app = TestApp::new().await;
    let token = accounting_user(&app).await;
    let account = create_account(&app, &token, "Northwind Pharmacy").await;
    let uri = format!(
        "/api/accounting/current-accounts/{}/transactions",
        account["id"].as_str().unwrap()
    );

    app.post_json(&uri, Some(&token), transaction_payload("INVOICE", "10", "5"))
        .await
        .assert_bad_request();
    app.post_json(&uri, Some(&token), transaction_payload("INVOICE", "0", "0"))
        .await
        .assert_bad_request();
    app.post_json(&uri, Some(&token), transaction_payload("REFUND", "-5", "0"))
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn test_posting_rejects_oversized_amounts() {
    let app = TestApp::new().await;
    let token = accounting_user(&app).await;
    let account = create_account(&app, &token, "Northwind Pharmacy").await;
    let id = account["id"].as_str().unwrap();
    let uri = format!("/api/accounting/current-accounts/{}/transactions", id);

    let response = app
        .post_json(
            &uri,
            Some(&token),
            transaction_payload("INVOICE", "79228162514264337593543950335", "0"),
        )
        .await;
    response.assert_bad_request();
    let json: Value = response.json();
    assert!(json["details"]["fields"]["debit_amount"].is_array());

    app.post_json(&uri, Some(&token), transaction_payload("INVOICE", "10.005", "0"))
        .await
        .assert_bad_request();

    // The largest accepted entries still post and fold without error
    for _ in 0..2 {
        app.post_json(
            &uri,
            Some(&token),
            transaction_payload("INVOICE", "999999999999999.99", "0"),
        )
        .await
        .assert_created();
    }
    let summary: Value = app
        .get(&format!("/api/accounting/current-accounts/{}", id), Some(&token))
        .await
        .json();
    assert_eq!(decimal(&summary["balance"]), Decimal::new(199_999_999_999_999_998, 2));
}

#[tokio::test]
async fn test_ledger_page_far_past_the_end_is_empty() {
    let app = TestApp::new().await;
    let token = accounting_user(&app).await;
    let account = create_account(&app, &token, "Northwind Pharmacy").await;
    let uri = format!(
        "/api/accounting/current-accounts/{}/transactions",
        account["id"].as_str().unwrap()
    );
    app.post_json(&uri, Some(&token), transaction_payload("INVOICE", "10", "0"))
        .await
        .assert_created();

    let response = app
        .get(&format!("{}?page=4294967295&per_page=200", uri), Some(&token))
        .await;
    response.assert_ok();
    let page: Value = response.json();
    assert_eq!(page["total"], 1);
    assert!(page["transactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_ledger_lists_newest_first_with_running_balances() {
    let app = TestApp::new().await;
    let token = accounting_user(&app).await;
    let account = create_account(&app, &token, "Northwind Pharmacy").await;
    let uri = format!(
        "/api/accounting/current-accounts/{}/transactions",
        account["id"].as_str().unwrap()
    );

    for payload in [
        dated("OPENING", "100", "0", "2026-01-05T09:00:00Z"),
        dated("INVOICE", "50", "0", "2026-02-10T09:00:00Z"),
        dated("RECEIPT", "0", "30", "2026-03-15T09:00:00Z"),
    ] {
        app.post_json(&uri, Some(&token), payload).await.assert_created();
    }

    let page: Value = app.get(&uri, Some(&token)).await.json();
    let rows = page["transactions"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["document_type"], "RECEIPT");
    assert_eq!(rows[2]["document_type"], "OPENING");

    let running: Vec<Decimal> = rows.iter().map(|r| decimal(&r["running_balance"])).collect();
    assert_eq!(
        running,
        vec![Decimal::new(120, 0), Decimal::new(150, 0), Decimal::new(100, 0)]
    );
    assert_eq!(decimal(&page["opening_balance"]), Decimal::ZERO);
    assert_eq!(decimal(&page["closing_balance"]), Decimal::new(120, 0));
    assert_eq!(decimal(&page["total_debit"]), Decimal::new(150, 0));
    assert_eq!(decimal(&page["total_credit"]), Decimal::new(30, 0));
}

#[tokio::test]
async fn test_ledger_date_filter_carries_opening_balance() {
    let app = TestApp::new().await;
    let token = accounting_user(&app).await;
    let account = create_account(&app, &token, "Northwind Pharmacy").await;
    let uri = format!(
        "/api/accounting/current-accounts/{}/transactions",
        account["id"].as_str().unwrap()
    );

    for payload in [
        dated("OPENING", "100", "0", "2026-01-05T09:00:00Z"),
        dated("INVOICE", "50", "0", "2026-02-10T09:00:00Z"),
        dated("RECEIPT", "0", "30", "2026-03-15T09:00:00Z"),
    ] {
        app.post_json(&uri, Some(&token), payload).await.assert_created();
    }

    let page: Value = app
        .get(
            &format!("{}?start_date=2026-02-01&end_date=2026-02-10", uri),
            Some(&token),
        )
        .await
        .json();
    assert_eq!(page["total"], 1);
    assert_eq!(decimal(&page["opening_balance"]), Decimal::new(100, 0));
    assert_eq!(decimal(&page["closing_balance"]), Decimal::new(150, 0));

    let page: Value = app
        .get(&format!("{}?per_page=1&page=2", uri), Some(&token))
        .await
        .json();
    assert_eq!(page["total"], 3);
    assert_eq!(page["per_page"], 1);
    assert_eq!(page["transactions"][0]["document_type"], "INVOICE");
}

#[tokio::test]
async fn test_deactivated_account_rejects_postings() {
    let app = TestApp::new().await;
    let token = accounting_user(&app).await;
    let account = create_account(&app, &token, "Northwind Pharmacy").await;
    let id = account["id"].as_str().unwrap();

    let response = app
        .delete(&format!("/api/accounting/current-accounts/{}", id), Some(&token), None)
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["is_active"], false);

    app.post_json(
        &format!("/api/accounting/current-accounts/{}/transactions", id),
        Some(&token),
        transaction_payload("INVOICE", "10", "0"),
    )
    .await
    .assert_bad_request();
}

#[tokio::test]
async fn test_accounts_are_isolated_between_tenants() {
    let app = TestApp::new().await;
    let token = accounting_user(&app).await;
    let other_token = accounting_user(&app).await;
    let account = create_account(&app, &token, "Northwind Pharmacy").await;
    let id = account["id"].as_str().unwrap();

    app.get(&format!("/api/accounting/current-accounts/{}", id), Some(&other_token))
        .await
        .assert_not_found();

    let listed: Vec<Value> = app
        .get("/api/accounting/current-accounts", Some(&other_token))
        .await
        .json();
    assert!(listed.is_empty());

    // Codes restart per tenant
    let theirs = create_account(&app, &other_token, "Contoso Labs").await;
    assert_eq!(theirs["code"], "C-00001");
}
