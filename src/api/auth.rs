//! Authentication API endpoints
//!
//! Registration, e-mail verification, login and logout, and the current
//! user's profile.

use std::collections::BTreeSet;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::record_audit;
use crate::{
    middleware::auth::{create_access_token, removal_cookie, session_cookie, AuthUser},
    models::{AuditEvent, LoginRequest, RegisterRequest, Tenant, User, UserSubscription},
    services::{AuthService, EntitlementService, PaymentService, TenantService},
    utils::{AppError, AppResult},
    AppState,
};

/// Create public routes for authentication endpoints (no auth required)
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/verify-email", get(verify_email_link).post(verify_email))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

/// Create protected routes for authentication endpoints (auth required)
pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_current_user))
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: User,
    pub tenant: Tenant,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: User,
    pub tenant: Option<Tenant>,
    pub subscription: Option<UserSubscription>,
    pub modules: BTreeSet<String>,
    pub trial_days_remaining: i64,
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let registration = AuthService::new(state.db.clone())
        .register(&payload, &state.config, Utc::now())
        .await?;

    state
        .email()
        .send_verification(&registration.user, &registration.verification_token)
        .await;

    record_audit(
        &state,
        AuditEvent::new("auth.register", "users")
            .tenant(Some(registration.tenant.id))
            .actor(registration.user.id)
            .resource(registration.user.id)
            .details(serde_json::json!({ "organization": registration.tenant.name })),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration received. Check your e-mail to verify your address."
                .to_string(),
            user: registration.user,
            tenant: registration.tenant,
        }),
    ))
}

async fn confirm_email(state: &AppState, token: &str) -> AppResult<User> {
    if token.trim().is_empty() {
        return Err(AppError::invalid_field("token", "A verification token is required"));
    }

    let user = AuthService::new(state.db.clone())
        .verify_email(token.trim(), state.config.auth.require_admin_approval, Utc::now())
        .await?;
    state.email().send_welcome(&user).await;
    Ok(user)
}

/// GET /api/auth/verify-email?token=
async fn verify_email_link(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailRequest>,
) -> AppResult<Json<User>> {
    Ok(Json(confirm_email(&state, &query.token).await?))
}

/// POST /api/auth/verify-email
async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> AppResult<Json<User>> {
    Ok(Json(confirm_email(&state, &payload.token).await?))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let user = AuthService::new(state.db.clone())
        .login(&payload.email, &payload.password, Utc::now())
        .await?;

    let token = create_access_token(
        &user,
        &state.config.auth.jwt_secret,
        state.config.auth.token_expiry_hours,
    )
    .map_err(|e| {
        tracing::error!("Failed to create access token: {}", e);
        AppError::internal("Failed to create access token")
    })?;

    record_audit(
        &state,
        AuditEvent::new("auth.login", "users")
            .tenant(user.tenant_id)
            .actor(user.id)
            .resource(user.id),
    )
    .await;

    let jar = jar.add(session_cookie(&state.config.auth, token.clone()));
    Ok((
        jar,
        Json(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.auth.token_expiry_hours * 3600,
            user,
        }),
    ))
}

/// POST /api/auth/logout
async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, StatusCode) {
    (
        jar.remove(removal_cookie(&state.config.auth)),
        StatusCode::NO_CONTENT,
    )
}

/// GET /api/auth/me
async fn get_current_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<ProfileResponse>> {
    let now = Utc::now();
    let user = crate::db::UserRepository::new(&state.db)
        .get_by_id(auth_user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let (tenant, modules) = match user.tenant_id {
        Some(tenant_id) => (
            Some(TenantService::new(state.db.clone()).get(tenant_id).await?),
            EntitlementService::new(state.db.clone())
                .modules_at(tenant_id, now)
                .await,
        ),
        None => (None, BTreeSet::new()),
    };
    let subscription = PaymentService::new(state.db.clone())
        .active_subscription(user.id)
        .await?;

    Ok(Json(ProfileResponse {
        trial_days_remaining: user.trial_days_remaining(now),
        user,
        tenant,
        subscription,
        modules,
    }))
}
