//! Simulated plan payment endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use super::record_audit;
use crate::{
    db::UserRepository,
    middleware::AuthUser,
    models::{AuditEvent, PaymentReceipt, PaymentRequest, UserSubscription},
    services::PaymentService,
    utils::AppResult,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/process", post(process_payment))
        .route("/subscription", get(get_subscription))
}

/// POST /api/payment/process
async fn process_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<PaymentRequest>,
) -> AppResult<Json<PaymentReceipt>> {
    let receipt = PaymentService::new(state.db.clone())
        .process_payment(auth_user.id, &payload, Utc::now())
        .await?;

    if let Some(user) = UserRepository::new(&state.db).get_by_id(auth_user.id).await? {
        state
            .email()
            .send_payment_receipt(&user, &receipt.subscription)
            .await;
    }

    record_audit(
        &state,
        AuditEvent::new("payment.capture", "subscriptions")
            .tenant(auth_user.tenant_id)
            .actor(auth_user.id)
            .resource(receipt.subscription.id)
            .details(serde_json::json!({
                "plan": receipt.subscription.plan,
                "billing_period": receipt.subscription.billing_period,
                "amount": receipt.subscription.amount,
                "reference": receipt.subscription.payment_reference,
            })),
    )
    .await;

    Ok(Json(receipt))
}

/// GET /api/payment/subscription
async fn get_subscription(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Option<UserSubscription>>> {
    Ok(Json(
        PaymentService::new(state.db.clone())
            .active_subscription(auth_user.id)
            .await?,
    ))
}
