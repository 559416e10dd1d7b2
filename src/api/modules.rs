//! Module catalog and entitlement endpoints

use std::collections::BTreeSet;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    middleware::AuthUser,
    models::{Module, TenantModule},
    services::{EntitlementService, ModuleService},
    utils::AppResult,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(catalog))
        .route("/mine", get(my_modules))
        .route("/{code}/access", get(check_access))
}

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Serialize)]
pub struct MyModulesResponse {
    /// Every module code the tenant may use right now
    pub codes: BTreeSet<String>,
    pub subscriptions: Vec<TenantModule>,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub module_code: String,
    pub has_access: bool,
}

/// GET /api/modules
async fn catalog(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<CatalogQuery>,
) -> AppResult<Json<Vec<Module>>> {
    let include_inactive = query.include_inactive && auth_user.is_super_admin();
    Ok(Json(
        ModuleService::new(state.db.clone())
            .catalog(include_inactive)
            .await?,
    ))
}

/// GET /api/modules/mine
async fn my_modules(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<MyModulesResponse>> {
    let tenant_id = auth_user.require_tenant()?;

    let codes = EntitlementService::new(state.db.clone())
        .modules_at(tenant_id, Utc::now())
        .await;
    let subscriptions = ModuleService::new(state.db.clone())
        .tenant_modules(tenant_id)
        .await?;

    Ok(Json(MyModulesResponse {
        codes,
        subscriptions,
    }))
}

/// GET /api/modules/{code}/access
async fn check_access(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(code): Path<String>,
) -> AppResult<Json<AccessResponse>> {
    let tenant_id = auth_user.require_tenant()?;
    let code = code.to_ascii_uppercase();
    let has_access = EntitlementService::new(state.db.clone())
        .has_module_access(tenant_id, &code)
        .await;

    Ok(Json(AccessResponse {
        module_code: code,
        has_access,
    }))
}
