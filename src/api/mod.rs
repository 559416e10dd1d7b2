//! API routes and handlers
//!
//! This module defines all API endpoints and their routing.

use axum::{middleware::from_fn_with_state, routing::get, Router};

use crate::{
    db::AuditRepository,
    middleware::{
        auth_middleware,
        rate_limit::{
            rate_limit_middleware, spawn_rate_limit_cleanup, RateLimitConfig, RateLimitState,
        },
        with_no_store,
    },
    models::AuditEvent,
    AppState,
};

mod accounting;
mod admin_users;
mod audit_logs;
mod auth;
mod health;
mod modules;
mod payment;
mod super_admin;
mod suspension;
mod tenant;

/// Health check endpoints
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::health_check_detailed))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
}

/// Registration, login and e-mail verification (rate limited separately)
pub fn auth_routes() -> Router<AppState> {
    Router::new().nest("/auth", auth::public_routes())
}

/// Protected API routes (authentication required)
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::protected_routes())
        .nest("/super-admin", super_admin::routes())
        .nest("/admin", admin_users::routes())
        .nest("/tenant", tenant::routes())
        .nest("/modules", modules::routes())
        .nest("/suspension", suspension::routes())
        .nest("/payment", payment::routes())
        .nest("/accounting", accounting::routes())
        .nest("/audit-logs", audit_logs::routes())
}

/// The `/api` tree with authentication and, when enabled, per-IP rate limits
///
/// Authentication must not be applied globally, otherwise login and
/// registration become unreachable. Auth endpoints get the strict quota.
pub fn router(state: AppState) -> Router {
    let mut auth = auth_routes();
    let mut protected =
        protected_routes().layer(from_fn_with_state(state.clone(), auth_middleware));

    let settings = &state.config.rate_limit;
    if settings.enabled {
        let auth_limit = RateLimitState::new(RateLimitConfig::auth(settings));
        let api_limit = RateLimitState::new(RateLimitConfig::api(settings));
        spawn_rate_limit_cleanup(auth_limit.clone());
        spawn_rate_limit_cleanup(api_limit.clone());

        auth = auth.layer(from_fn_with_state(auth_limit, rate_limit_middleware));
        protected = protected.layer(from_fn_with_state(api_limit, rate_limit_middleware));
    }

    Router::new()
        .nest("/api", with_no_store(health_routes().merge(auth).merge(protected)))
        .with_state(state)
}

/// Write an audit record; failures are logged and never fail the request
pub(crate) async fn record_audit(state: &AppState, event: AuditEvent<'_>) {
    if let Err(e) = AuditRepository::new(&state.db).insert(&event, None).await {
        tracing::warn!(action = event.action, "Failed to write audit log: {:#}", e);
    }
}
