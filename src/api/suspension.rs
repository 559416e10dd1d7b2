//! The caller's own suspension and appeal

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use super::record_audit;
use crate::{
    middleware::AuthUser,
    models::{AppealRequest, AuditEvent, Suspension},
    services::SuspensionService,
    utils::AppResult,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_my_suspension))
        .route("/appeal", post(submit_appeal))
}

#[derive(Debug, Serialize)]
pub struct MySuspensionResponse {
    pub suspended: bool,
    pub suspension: Option<Suspension>,
    pub can_appeal_now: bool,
}

/// GET /api/suspension
///
/// Lifts an elapsed temporary suspension before answering.
async fn get_my_suspension(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<MySuspensionResponse>> {
    let now = Utc::now();
    let suspension = SuspensionService::new(state.db.clone(), state.config.trial.appeal_window_days)
        .current_for_user(auth_user.id, now)
        .await?;

    Ok(Json(MySuspensionResponse {
        suspended: suspension.is_some(),
        can_appeal_now: suspension.as_ref().is_some_and(|s| s.appeal_open(now)),
        suspension,
    }))
}

/// POST /api/suspension/appeal
async fn submit_appeal(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<AppealRequest>,
) -> AppResult<Json<Suspension>> {
    let suspension = SuspensionService::new(state.db.clone(), state.config.trial.appeal_window_days)
        .submit_appeal(auth_user.id, &payload.reason, Utc::now())
        .await?;

    record_audit(
        &state,
        AuditEvent::new("appeal.submit", "suspensions")
            .tenant(auth_user.tenant_id)
            .actor(auth_user.id)
            .resource(suspension.id),
    )
    .await;

    Ok(Json(suspension))
}
