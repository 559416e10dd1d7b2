//! Super admin API endpoints
//!
//! Registration approval, tenant administration, module and package
//! assignment, the global audit log and the on-demand lifecycle sweep.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::record_audit;
use crate::{
    db::{AuditRepository, ModuleRepository, UserRepository},
    middleware::AuthUser,
    models::{
        AuditEvent, AuditLogEntry, AuditLogQuery, ModuleAssignmentRequest, ModuleRemovalRequest,
        Package, PackageAssignmentRequest, PackageRemovalRequest, Suspension, Tenant,
        TenantModule, TenantOverview, TenantPackage, UpdateTenantRequest, User, UserRole,
        UserStatus,
    },
    services::{
        LifecycleService, LifecycleSweeper, ModuleOutcome, ModuleService, SuspensionService,
        SweepSummary, TenantService,
    },
    utils::{AppError, AppResult},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(review_user))
        .route("/tenants", get(list_tenants))
        .route("/tenants/{id}", put(update_tenant))
        .route(
            "/tenant-modules",
            get(list_tenant_modules)
                .post(assign_module)
                .delete(remove_module),
        )
        .route("/tenant-modules/{tenant_id}", put(set_tenant_modules))
        .route("/packages", get(list_packages))
        .route(
            "/tenant-packages",
            get(list_tenant_packages)
                .post(assign_package)
                .delete(remove_package),
        )
        .route("/appeals", get(list_pending_appeals))
        .route("/audit-logs", get(list_audit_logs))
        .route("/lifecycle/sweep", post(run_sweep))
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub status: Option<UserStatus>,
    pub role: Option<UserRole>,
    /// List every role instead of tenant admins only
    #[serde(default)]
    pub all_roles: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct ReviewUserRequest {
    pub user_id: Uuid,
    pub action: ReviewAction,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TenantModulesQuery {
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct TenantPackagesQuery {
    pub tenant_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ModuleAssignmentResponse {
    pub outcome: ModuleOutcome,
    pub subscription: Option<TenantModule>,
}

#[derive(Debug, Deserialize)]
pub struct SetTenantModulesRequest {
    pub modules: BTreeMap<String, bool>,
}

#[derive(Debug, Serialize)]
pub struct RemovalResponse {
    pub removed: u64,
}

#[derive(Debug, Deserialize)]
pub struct SweepQuery {
    #[serde(default)]
    pub dry_run: bool,
}

/// GET /api/super-admin/users?status=&role=
async fn list_users(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<UserListQuery>,
) -> AppResult<Json<Vec<User>>> {
    auth_user.require_super_admin()?;

    let status = query.status.unwrap_or(UserStatus::PendingApproval);
    let role = if query.all_roles {
        None
    } else {
        Some(query.role.unwrap_or(UserRole::TenantAdmin))
    };

    let users = UserRepository::new(&state.db)
        .list_by_status(status, role)
        .await?;
    Ok(Json(users))
}

/// POST /api/super-admin/users
async fn review_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<ReviewUserRequest>,
) -> AppResult<Json<User>> {
    auth_user.require_super_admin()?;

    let lifecycle = LifecycleService::new(state.db.clone());
    let now = Utc::now();
    let email = state.email();

    let (user, action) = match payload.action {
        ReviewAction::Approve => {
            let user = lifecycle.approve_user(payload.user_id, now).await?;
            email.send_registration_approved(&user).await;
            (user, "user.approve")
        }
        ReviewAction::Reject => {
            let user = lifecycle.reject_user(payload.user_id, now).await?;
            email
                .send_registration_rejected(&user, payload.reason.as_deref())
                .await;
            (user, "user.reject")
        }
    };

    record_audit(
        &state,
        AuditEvent::new(action, "users")
            .tenant(user.tenant_id)
            .actor(auth_user.id)
            .resource(user.id)
            .details(serde_json::json!({ "reason": payload.reason })),
    )
    .await;

    Ok(Json(user))
}

/// GET /api/super-admin/tenants
async fn list_tenants(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<TenantOverview>>> {
    auth_user.require_super_admin()?;
    let overview = TenantService::new(state.db.clone())
        .overview(Utc::now())
        .await?;
    Ok(Json(overview))
}

/// PUT /api/super-admin/tenants/{id}
async fn update_tenant(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTenantRequest>,
) -> AppResult<Json<Tenant>> {
    auth_user.require_super_admin()?;

    let tenant = LifecycleService::new(state.db.clone())
        .update_tenant(id, &payload, Utc::now())
        .await?;

    record_audit(
        &state,
        AuditEvent::new("tenant.update", "tenants")
            .tenant(Some(tenant.id))
            .actor(auth_user.id)
            .resource(tenant.id)
            .details(serde_json::json!({
                "status": tenant.status,
                "plan": tenant.plan,
                "limits": tenant.limits,
            })),
    )
    .await;

    Ok(Json(tenant))
}

/// GET /api/super-admin/tenant-modules?tenant_id=
async fn list_tenant_modules(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<TenantModulesQuery>,
) -> AppResult<Json<Vec<TenantModule>>> {
    auth_user.require_super_admin()?;

    let service = ModuleService::new(state.db.clone());
    let modules = match query.tenant_id {
        Some(tenant_id) => service.tenant_modules(tenant_id).await?,
        None => service.all_tenant_modules().await?,
    };
    Ok(Json(modules))
}

/// POST /api/super-admin/tenant-modules
async fn assign_module(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<ModuleAssignmentRequest>,
) -> AppResult<Json<ModuleAssignmentResponse>> {
    auth_user.require_super_admin()?;

    let (outcome, subscription) = ModuleService::new(state.db.clone())
        .activate_module_for_tenant(
            payload.tenant_id,
            &payload.module_code,
            &payload.options,
            Utc::now(),
        )
        .await?;

    record_audit(
        &state,
        AuditEvent::new("module.assign", "tenant_modules")
            .tenant(Some(payload.tenant_id))
            .actor(auth_user.id)
            .resource(&payload.module_code)
            .details(serde_json::json!({
                "outcome": outcome,
                "is_trial": payload.options.is_trial,
            })),
    )
    .await;

    Ok(Json(ModuleAssignmentResponse {
        outcome,
        subscription,
    }))
}

/// DELETE /api/super-admin/tenant-modules
async fn remove_module(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<ModuleRemovalRequest>,
) -> AppResult<Json<RemovalResponse>> {
    auth_user.require_super_admin()?;

    let removed = ModuleService::new(state.db.clone())
        .deactivate_module_for_tenant(payload.tenant_id, &payload.module_code, Utc::now())
        .await?;
    if removed == 0 {
        return Err(AppError::not_found(format!(
            "Module {} is not assigned to this tenant",
            payload.module_code
        )));
    }

    record_audit(
        &state,
        AuditEvent::new("module.remove", "tenant_modules")
            .tenant(Some(payload.tenant_id))
            .actor(auth_user.id)
            .resource(&payload.module_code),
    )
    .await;

    Ok(Json(RemovalResponse { removed }))
}

/// PUT /api/super-admin/tenant-modules/{tenant_id}
async fn set_tenant_modules(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(tenant_id): Path<Uuid>,
    Json(payload): Json<SetTenantModulesRequest>,
) -> AppResult<Json<BTreeMap<String, ModuleOutcome>>> {
    auth_user.require_super_admin()?;

    let outcomes = ModuleService::new(state.db.clone())
        .set_tenant_modules(tenant_id, &payload.modules, Utc::now())
        .await?;

    record_audit(
        &state,
        AuditEvent::new("module.bulk_update", "tenant_modules")
            .tenant(Some(tenant_id))
            .actor(auth_user.id)
            .resource(tenant_id)
            .details(serde_json::json!({ "modules": outcomes })),
    )
    .await;

    Ok(Json(outcomes))
}

/// GET /api/super-admin/packages
async fn list_packages(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<Package>>> {
    auth_user.require_super_admin()?;
    Ok(Json(ModuleRepository::new(&state.db).list_packages().await?))
}

/// GET /api/super-admin/tenant-packages?tenant_id=
async fn list_tenant_packages(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<TenantPackagesQuery>,
) -> AppResult<Json<Vec<TenantPackage>>> {
    auth_user.require_super_admin()?;
    Ok(Json(
        ModuleRepository::new(&state.db)
            .tenant_packages(query.tenant_id)
            .await?,
    ))
}

/// POST /api/super-admin/tenant-packages
async fn assign_package(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<PackageAssignmentRequest>,
) -> AppResult<Json<TenantPackage>> {
    auth_user.require_super_admin()?;
    payload.validate()?;

    let package = ModuleService::new(state.db.clone())
        .assign_package(
            payload.tenant_id,
            &payload.package_code,
            payload.months,
            Utc::now(),
        )
        .await?;

    record_audit(
        &state,
        AuditEvent::new("package.assign", "tenant_packages")
            .tenant(Some(payload.tenant_id))
            .actor(auth_user.id)
            .resource(&payload.package_code)
            .details(serde_json::json!({ "months": payload.months })),
    )
    .await;

    Ok(Json(package))
}

/// DELETE /api/super-admin/tenant-packages
async fn remove_package(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<PackageRemovalRequest>,
) -> AppResult<Json<RemovalResponse>> {
    auth_user.require_super_admin()?;

    let removed = ModuleService::new(state.db.clone())
        .cancel_package(payload.tenant_id, &payload.package_code, Utc::now())
        .await?;
    if removed == 0 {
        return Err(AppError::not_found(format!(
            "Package {} is not assigned to this tenant",
            payload.package_code
        )));
    }

    record_audit(
        &state,
        AuditEvent::new("package.remove", "tenant_packages")
            .tenant(Some(payload.tenant_id))
            .actor(auth_user.id)
            .resource(&payload.package_code),
    )
    .await;

    Ok(Json(RemovalResponse { removed }))
}

/// GET /api/super-admin/appeals
async fn list_pending_appeals(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<Suspension>>> {
    auth_user.require_super_admin()?;
    let appeals = SuspensionService::new(state.db.clone(), state.config.trial.appeal_window_days)
        .pending_appeals()
        .await?;
    Ok(Json(appeals))
}

/// GET /api/super-admin/audit-logs
async fn list_audit_logs(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<Json<Vec<AuditLogEntry>>> {
    auth_user.require_super_admin()?;

    let logs = AuditRepository::new(&state.db).list(&query).await.map_err(|e| {
        tracing::error!("Failed to list audit logs: {}", e);
        AppError::internal("Failed to list audit logs")
    })?;
    Ok(Json(logs))
}

/// POST /api/super-admin/lifecycle/sweep?dry_run=
async fn run_sweep(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<SweepQuery>,
) -> AppResult<Json<SweepSummary>> {
    auth_user.require_super_admin()?;

    let sweeper = LifecycleSweeper::new(
        state.db.clone(),
        state.config.trial.appeal_window_days,
        Some(state.email()),
    );
    let summary = sweeper.run_once(Utc::now(), query.dry_run).await?;

    if !query.dry_run {
        record_audit(
            &state,
            AuditEvent::new("lifecycle.sweep", "users")
                .actor(auth_user.id)
                .details(serde_json::to_value(&summary)?),
        )
        .await;
    }

    Ok(Json(summary))
}
