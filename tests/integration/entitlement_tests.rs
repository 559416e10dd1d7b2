//! Module catalog, assignments, packages and access checks

use serde_json::{json, Value};

use crate::common::{seed_super_admin, seed_tenant_with_admin, TestApp};

fn codes(json: &Value) -> Vec<String> {
    serde_json::from_value(json["codes"].clone()).unwrap()
}

#[tokio::test]
async fn test_catalog_lists_seeded_modules() {
    let app = TestApp::new().await;
    let (_, admin) = seed_tenant_with_admin(&app).await;

    let response = app.get("/api/modules", Some(&app.token_for(&admin))).await;
    response.assert_ok();
    let modules: Vec<Value> = response.json();
    assert!(modules.iter().any(|m| m["code"] == "ACCOUNTING"));
    assert!(modules
        .iter()
        .any(|m| m["code"] == "CORE_DASHBOARD" && m["is_core"] == true));
}

#[tokio::test]
async fn test_new_tenant_only_has_core_modules() {
    let app = TestApp::new().await;
    let (_, admin) = seed_tenant_with_admin(&app).await;

    let response = app.get("/api/modules/mine", Some(&app.token_for(&admin))).await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(
        codes(&json),
        vec!["CORE_DASHBOARD", "CORE_SETTINGS", "CORE_USERS"]
    );
    assert!(json["subscriptions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_assigning_module_grants_access() {
    let app = TestApp::new().await;
    let super_admin = seed_super_admin(&app).await;
    let (tenant, admin) = seed_tenant_with_admin(&app).await;
    let admin_token = app.token_for(&admin);

    let access: Value = app
        .get("/api/modules/accounting/access", Some(&admin_token))
        .await
        .json();
    assert_eq!(access["module_code"], "ACCOUNTING");
    assert_eq!(access["has_access"], false);

    let response = app
        .post_json(
            "/api/super-admin/tenant-modules",
            Some(&app.token_for(&super_admin)),
            json!({ "tenant_id": tenant.id, "module_code": "ACCOUNTING" }),
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["outcome"], "activated");
    assert_eq!(json["subscription"]["status"], "ACTIVE");
    assert!(json["subscription"]["expires_at"].is_string());

    let access: Value = app
        .get("/api/modules/ACCOUNTING/access", Some(&admin_token))
        .await
        .json();
    assert_eq!(access["has_access"], true);

    // Assigning again is a no-op
    let json: Value = app
        .post_json(
            "/api/super-admin/tenant-modules",
            Some(&app.token_for(&super_admin)),
            json!({ "tenant_id": tenant.id, "module_code": "ACCOUNTING" }),
        )
        .await
        .json();
    assert_eq!(json["outcome"], "already_active");
}

#[tokio::test]
async fn test_repeated_activation_keeps_single_unchanged_row() {
    let app = TestApp::new().await;
    let super_admin = seed_super_admin(&app).await;
    let token = app.token_for(&super_admin);
    let (tenant, _) = seed_tenant_with_admin(&app).await;
    let payload = json!({ "tenant_id": tenant.id, "module_code": "ACCOUNTING" });

    let first: Value = app
        .post_json("/api/super-admin/tenant-modules", Some(&token), payload.clone())
        .await
        .json();
    let second: Value = app
        .post_json("/api/super-admin/tenant-modules", Some(&token), payload)
        .await
        .json();
    assert_eq!(second["outcome"], "already_active");

    let rows: Vec<Value> = app
        .get(
            &format!("/api/super-admin/tenant-modules?tenant_id={}", tenant.id),
            Some(&token),
        )
        .await
        .json();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    for field in ["id", "activated_at", "expires_at", "status"] {
        assert_eq!(row[field], first["subscription"][field], "{} changed", field);
    }
}

#[tokio::test]
async fn test_trial_module_assignment() {
    let app = TestApp::new().await;
    let super_admin = seed_super_admin(&app).await;
    let (tenant, admin) = seed_tenant_with_admin(&app).await;

    let json: Value = app
        .post_json(
            "/api/super-admin/tenant-modules",
            Some(&app.token_for(&super_admin)),
            json!({
                "tenant_id": tenant.id,
                "module_code": "LABORATORY",
                "is_trial": true,
                "trial_days": 7
            }),
        )
        .await
        .json();
    assert_eq!(json["subscription"]["status"], "TRIAL");
    assert_eq!(json["subscription"]["is_trial_module"], true);
    assert_eq!(json["subscription"]["trial_days"], 7);

    // A running module trial grants access
    let access: Value = app
        .get("/api/modules/LABORATORY/access", Some(&app.token_for(&admin)))
        .await
        .json();
    assert_eq!(access["has_access"], true);
}

#[tokio::test]
async fn test_oversized_trial_and_package_terms_are_rejected() {
    let app = TestApp::new().await;
    let super_admin = seed_super_admin(&app).await;
    let token = app.token_for(&super_admin);
    let (tenant, _) = seed_tenant_with_admin(&app).await;

    let response = app
        .post_json(
            "/api/super-admin/tenant-modules",
            Some(&token),
            json!({
                "tenant_id": tenant.id,
                "module_code": "LABORATORY",
                "is_trial": true,
                "trial_days": i64::MAX
            }),
        )
        .await;
    response.assert_bad_request();
    let json: Value = response.json();
    assert!(json["details"]["fields"]["trial_days"].is_array());

    app.post_json(
        "/api/super-admin/tenant-packages",
        Some(&token),
        json!({ "tenant_id": tenant.id, "package_code": "CLINIC_STARTER", "months": u32::MAX }),
    )
    .await
    .assert_bad_request();

    let mine: Value = app
        .get(&format!("/api/super-admin/tenant-modules?tenant_id={}", tenant.id), Some(&token))
        .await
        .json();
    assert!(mine.as_array().is_some_and(|rows| rows.is_empty()));
}

#[tokio::test]
async fn test_removing_module_revokes_access() {
    let app = TestApp::new().await;
    let super_admin = seed_super_admin(&app).await;
    let token = app.token_for(&super_admin);
    let (tenant, admin) = seed_tenant_with_admin(&app).await;

    app.post_json(
        "/api/super-admin/tenant-modules",
        Some(&token),
        json!({ "tenant_id": tenant.id, "module_code": "PHARMACY" }),
    )
    .await
    .assert_ok();

    let response = app
        .delete(
            "/api/super-admin/tenant-modules",
            Some(&token),
            Some(json!({ "tenant_id": tenant.id, "module_code": "PHARMACY" })),
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["removed"], 1);

    let access: Value = app
        .get("/api/modules/PHARMACY/access", Some(&app.token_for(&admin)))
        .await
        .json();
    assert_eq!(access["has_access"], false);

    // Nothing left to remove
    app.delete(
        "/api/super-admin/tenant-modules",
        Some(&token),
        Some(json!({ "tenant_id": tenant.id, "module_code": "PHARMACY" })),
    )
    .await
    .assert_not_found();
}

#[tokio::test]
async fn test_core_modules_cannot_be_removed() {
    let app = TestApp::new().await;
    let super_admin = seed_super_admin(&app).await;
    let (tenant, _) = seed_tenant_with_admin(&app).await;

    app.delete(
        "/api/super-admin/tenant-modules",
        Some(&app.token_for(&super_admin)),
        Some(json!({ "tenant_id": tenant.id, "module_code": "CORE_USERS" })),
    )
    .await
    .assert_bad_request();
}

#[tokio::test]
async fn test_unknown_module_is_not_found() {
    let app = TestApp::new().await;
    let super_admin = seed_super_admin(&app).await;
    let (tenant, _) = seed_tenant_with_admin(&app).await;

    app.post_json(
        "/api/super-admin/tenant-modules",
        Some(&app.token_for(&super_admin)),
        json!({ "tenant_id": tenant.id, "module_code": "TELEPORTATION" }),
    )
    .await
    .assert_not_found();
}

#[tokio::test]
async fn test_bulk_module_update_reports_each_outcome() {
    let app = TestApp::new().await;
    let super_admin = seed_super_admin(&app).await;
    let (tenant, _) = seed_tenant_with_admin(&app).await;

    let response = app
        .put_json(
            &format!("/api/super-admin/tenant-modules/{}", tenant.id),
            Some(&app.token_for(&super_admin)),
            json!({
                "modules": {
                    "APPOINTMENTS": true,
                    "CORE_SETTINGS": false,
                    "REPORTING": false
                }
            }),
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["APPOINTMENTS"], "activated");
    assert_eq!(json["CORE_SETTINGS"], "always_granted");
    assert_eq!(json["REPORTING"], "not_assigned");
}

#[tokio::test]
async fn test_package_grants_its_modules() {
    let app = TestApp::new().await;
    let super_admin = seed_super_admin(&app).await;
    let token = app.token_for(&super_admin);
    let (tenant, admin) = seed_tenant_with_admin(&app).await;
    let admin_token = app.token_for(&admin);

    let packages: Vec<Value> = app.get("/api/super-admin/packages", Some(&token)).await.json();
    assert!(packages.iter().any(|p| p["code"] == "CLINIC_STARTER"));

    let response = app
        .post_json(
            "/api/super-admin/tenant-packages",
            Some(&token),
            json!({ "tenant_id": tenant.id, "package_code": "CLINIC_STARTER", "months": 12 }),
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "ACTIVE");

    let mine: Value = app.get("/api/modules/mine", Some(&admin_token)).await.json();
    let granted = codes(&mine);
    assert!(granted.contains(&"ACCOUNTING".to_string()));
    assert!(granted.contains(&"APPOINTMENTS".to_string()));
    assert!(!granted.contains(&"LABORATORY".to_string()));

    app.delete(
        "/api/super-admin/tenant-packages",
        Some(&token),
        Some(json!({ "tenant_id": tenant.id, "package_code": "CLINIC_STARTER" })),
    )
    .await
    .assert_ok();

    let mine: Value = app.get("/api/modules/mine", Some(&admin_token)).await.json();
    assert!(!codes(&mine).contains(&"ACCOUNTING".to_string()));
}

#[tokio::test]
async fn test_tenant_admin_cannot_assign_modules() {
    let app = TestApp::new().await;
    let (tenant, admin) = seed_tenant_with_admin(&app).await;

    app.post_json(
        "/api/super-admin/tenant-modules",
        Some(&app.token_for(&admin)),
        json!({ "tenant_id": tenant.id, "module_code": "ACCOUNTING" }),
    )
    .await
    .assert_forbidden();
}
