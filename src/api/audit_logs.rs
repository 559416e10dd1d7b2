//! Audit log API endpoints

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::{
    db::AuditRepository,
    middleware::AuthUser,
    models::{AuditLogEntry, AuditLogQuery},
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_audit_logs))
}

/// Tenant admins read their own organization's log
async fn list_audit_logs(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(mut query): Query<AuditLogQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    let tenant_id = auth_user.require_tenant_admin()?;

    match query.tenant_id {
        Some(requested) if requested != tenant_id => {
            return Err(AppError::forbidden(
                "tenant_id can only be specified by a super admin",
            ));
        }
        _ => query.tenant_id = Some(tenant_id),
    }

    let repo = AuditRepository::new(&state.db);
    let logs = repo.list(&query).await.map_err(|e| {
        tracing::error!("Failed to list audit logs: {}", e);
        AppError::internal("Failed to list audit logs")
    })?;

    Ok(Json(logs))
}
