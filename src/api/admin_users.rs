//! Administrative actions on individual users
//!
//! Available to super admins and, within their own organization, to tenant
//! admins. Trial extensions stay with super admins.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record_audit;
use crate::{
    db::UserRepository,
    middleware::AuthUser,
    models::{AppealDecisionRequest, AuditEvent, SuspendUserRequest, Suspension, User},
    services::{authorize_admin_action, LifecycleService, SuspensionService},
    utils::{AppError, AppResult},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{id}/approve", post(approve_user))
        .route("/users/{id}/suspend", post(suspend_user).get(get_suspension))
        .route("/users/{id}/trial-days", post(extend_trial))
        .route("/suspensions/{id}/appeal-decision", post(decide_appeal))
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    #[serde(default = "default_approve")]
    pub approve: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

fn default_approve() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct TrialDaysRequest {
    pub days: i64,
}

#[derive(Debug, Serialize)]
pub struct SuspensionResponse {
    pub user: User,
    pub suspension: Suspension,
}

fn suspension_service(state: &AppState) -> SuspensionService {
    SuspensionService::new(state.db.clone(), state.config.trial.appeal_window_days)
}

/// Load the target and check the caller may manage them
async fn load_target(state: &AppState, auth_user: &AuthUser, id: Uuid) -> AppResult<User> {
    let target = UserRepository::new(&state.db)
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    authorize_admin_action(&auth_user.actor(), &target)?;
    Ok(target)
}

/// POST /api/admin/users/{id}/approve
async fn approve_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApprovalRequest>,
) -> AppResult<Json<User>> {
    load_target(&state, &auth_user, id).await?;

    let lifecycle = LifecycleService::new(state.db.clone());
    let now = Utc::now();
    let user = if payload.approve {
        let user = lifecycle.approve_user(id, now).await?;
        state.email().send_registration_approved(&user).await;
        user
    } else {
        let user = lifecycle.reject_user(id, now).await?;
        state
            .email()
            .send_registration_rejected(&user, payload.reason.as_deref())
            .await;
        user
    };

    record_audit(
        &state,
        AuditEvent::new(
            if payload.approve { "user.approve" } else { "user.reject" },
            "users",
        )
        .tenant(user.tenant_id)
        .actor(auth_user.id)
        .resource(user.id)
        .details(serde_json::json!({ "reason": payload.reason })),
    )
    .await;

    Ok(Json(user))
}

/// POST /api/admin/users/{id}/suspend
async fn suspend_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SuspendUserRequest>,
) -> AppResult<Json<SuspensionResponse>> {
    load_target(&state, &auth_user, id).await?;

    let (user, suspension) = suspension_service(&state)
        .suspend_user(id, auth_user.id, &payload, Utc::now())
        .await?;
    state.email().send_account_suspended(&user, &suspension).await;

    record_audit(
        &state,
        AuditEvent::new("user.suspend", "suspensions")
            .tenant(user.tenant_id)
            .actor(auth_user.id)
            .resource(suspension.id)
            .details(serde_json::json!({
                "user_id": user.id,
                "duration_type": suspension.duration_type,
                "suspended_until": suspension.suspended_until,
                "can_appeal": suspension.can_appeal,
            })),
    )
    .await;

    Ok(Json(SuspensionResponse { user, suspension }))
}

/// GET /api/admin/users/{id}/suspend
async fn get_suspension(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Option<Suspension>>> {
    load_target(&state, &auth_user, id).await?;
    let suspension = suspension_service(&state)
        .current_for_user(id, Utc::now())
        .await?;
    Ok(Json(suspension))
}

/// POST /api/admin/users/{id}/trial-days
async fn extend_trial(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<TrialDaysRequest>,
) -> AppResult<Json<User>> {
    auth_user.require_super_admin()?;
    load_target(&state, &auth_user, id).await?;

    let user = LifecycleService::new(state.db.clone())
        .extend_trial(id, payload.days, Utc::now())
        .await?;

    record_audit(
        &state,
        AuditEvent::new("user.extend_trial", "users")
            .tenant(user.tenant_id)
            .actor(auth_user.id)
            .resource(user.id)
            .details(serde_json::json!({
                "days": payload.days,
                "trial_end_date": user.trial_end_date,
            })),
    )
    .await;

    Ok(Json(user))
}

/// POST /api/admin/suspensions/{id}/appeal-decision
async fn decide_appeal(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AppealDecisionRequest>,
) -> AppResult<Json<Suspension>> {
    let service = suspension_service(&state);
    let suspension = service
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Suspension not found"))?;
    let target = load_target(&state, &auth_user, suspension.user_id).await?;

    let decided = service
        .decide_appeal(
            id,
            auth_user.id,
            payload.approve,
            payload.note.as_deref(),
            Utc::now(),
        )
        .await?;

    record_audit(
        &state,
        AuditEvent::new(
            if payload.approve {
                "appeal.approve"
            } else {
                "appeal.reject"
            },
            "suspensions",
        )
        .tenant(target.tenant_id)
        .actor(auth_user.id)
        .resource(decided.id)
        .details(serde_json::json!({ "user_id": target.id, "note": payload.note })),
    )
    .await;

    Ok(Json(decided))
}
