//! Tenant self-service endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;

use super::record_audit;
use crate::{
    db::UserRepository,
    middleware::AuthUser,
    models::{AuditEvent, CreateTenantUserRequest, Tenant, User},
    services::TenantService,
    utils::{AppError, AppResult},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_tenant))
        .route("/users", get(list_users).post(add_user))
}

/// GET /api/tenant
async fn get_tenant(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Tenant>> {
    let tenant_id = auth_user.require_tenant()?;
    Ok(Json(TenantService::new(state.db.clone()).get(tenant_id).await?))
}

/// GET /api/tenant/users
async fn list_users(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<User>>> {
    let tenant_id = auth_user.require_tenant_admin()?;
    Ok(Json(TenantService::new(state.db.clone()).users(tenant_id).await?))
}

/// POST /api/tenant/users
async fn add_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateTenantUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let tenant_id = auth_user.require_tenant_admin()?;
    let admin = UserRepository::new(&state.db)
        .get_by_id(auth_user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let user = TenantService::new(state.db.clone())
        .add_user(
            &admin,
            &payload,
            state.config.auth.password_min_length,
            Utc::now(),
        )
        .await?;

    record_audit(
        &state,
        AuditEvent::new("tenant.add_user", "users")
            .tenant(Some(tenant_id))
            .actor(auth_user.id)
            .resource(user.id)
            .details(serde_json::json!({ "email": user.email })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(user)))
}
