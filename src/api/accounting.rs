//! Current accounts and their ledgers
//!
//! Every route needs an ACTIVE tenant user whose tenant holds the
//! ACCOUNTING module.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use super::record_audit;
use crate::{
    middleware::AuthUser,
    models::{
        AccountListQuery, AuditEvent, CreateCurrentAccountRequest, CurrentAccount,
        CurrentAccountSummary, LedgerPage, LedgerTransaction, PostTransactionRequest,
        TransactionFilter, UpdateCurrentAccountRequest, ACCOUNTING_MODULE,
    },
    services::{EntitlementService, LedgerService, TenantService},
    utils::{AppError, AppResult},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/current-accounts",
            get(list_accounts).post(create_account),
        )
        .route(
            "/current-accounts/{id}",
            get(get_account).put(update_account).delete(deactivate_account),
        )
        .route(
            "/current-accounts/{id}/transactions",
            get(list_transactions).post(post_transaction),
        )
}

/// Tenant of a caller allowed to use the ledger
async fn require_accounting(state: &AppState, auth_user: &AuthUser) -> AppResult<Uuid> {
    auth_user.require_active()?;
    let tenant_id = auth_user.require_tenant()?;

    let entitled = EntitlementService::new(state.db.clone())
        .has_module_access(tenant_id, ACCOUNTING_MODULE)
        .await;
    if !entitled {
        return Err(AppError::forbidden(
            "Your organization does not have access to the accounting module",
        ));
    }
    Ok(tenant_id)
}

/// GET /api/accounting/current-accounts
async fn list_accounts(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<AccountListQuery>,
) -> AppResult<Json<Vec<CurrentAccountSummary>>> {
    let tenant_id = require_accounting(&state, &auth_user).await?;
    Ok(Json(
        LedgerService::new(state.db.clone())
            .list_accounts(tenant_id, &query)
            .await?,
    ))
}

/// POST /api/accounting/current-accounts
async fn create_account(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateCurrentAccountRequest>,
) -> AppResult<(StatusCode, Json<CurrentAccount>)> {
    let tenant_id = require_accounting(&state, &auth_user).await?;
    let tenant = TenantService::new(state.db.clone()).get(tenant_id).await?;

    let account = LedgerService::new(state.db.clone())
        .create_account(tenant_id, &tenant.limits, &payload, Utc::now())
        .await?;

    record_audit(
        &state,
        AuditEvent::new("current_account.create", "current_accounts")
            .tenant(Some(tenant_id))
            .actor(auth_user.id)
            .resource(account.id)
            .details(serde_json::json!({ "code": account.code, "name": account.name })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /api/accounting/current-accounts/{id}
async fn get_account(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CurrentAccountSummary>> {
    let tenant_id = require_accounting(&state, &auth_user).await?;
    Ok(Json(
        LedgerService::new(state.db.clone())
            .get_account(tenant_id, id)
            .await?,
    ))
}

/// PUT /api/accounting/current-accounts/{id}
async fn update_account(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCurrentAccountRequest>,
) -> AppResult<Json<CurrentAccount>> {
    let tenant_id = require_accounting(&state, &auth_user).await?;
    let account = LedgerService::new(state.db.clone())
        .update_account(tenant_id, id, &payload, Utc::now())
        .await?;

    record_audit(
        &state,
        AuditEvent::new("current_account.update", "current_accounts")
            .tenant(Some(tenant_id))
            .actor(auth_user.id)
            .resource(account.id),
    )
    .await;

    Ok(Json(account))
}

/// DELETE /api/accounting/current-accounts/{id}
///
/// Accounts with history are never removed, only deactivated.
async fn deactivate_account(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CurrentAccount>> {
    let tenant_id = require_accounting(&state, &auth_user).await?;
    let account = LedgerService::new(state.db.clone())
        .deactivate_account(tenant_id, id, Utc::now())
        .await?;

    record_audit(
        &state,
        AuditEvent::new("current_account.deactivate", "current_accounts")
            .tenant(Some(tenant_id))
            .actor(auth_user.id)
            .resource(account.id),
    )
    .await;

    Ok(Json(account))
}

/// GET /api/accounting/current-accounts/{id}/transactions
async fn list_transactions(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Query(filter): Query<TransactionFilter>,
) -> AppResult<Json<LedgerPage>> {
    let tenant_id = require_accounting(&state, &auth_user).await?;
    Ok(Json(
        LedgerService::new(state.db.clone())
            .list_transactions(tenant_id, id, &filter)
            .await?,
    ))
}

/// POST /api/accounting/current-accounts/{id}/transactions
async fn post_transaction(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostTransactionRequest>,
) -> AppResult<(StatusCode, Json<LedgerTransaction>)> {
    let tenant_id = require_accounting(&state, &auth_user).await?;
    let transaction = LedgerService::new(state.db.clone())
        .post_transaction(tenant_id, id, auth_user.id, &payload, Utc::now())
        .await?;

    record_audit(
        &state,
        AuditEvent::new("ledger.post", "current_account_transactions")
            .tenant(Some(tenant_id))
            .actor(auth_user.id)
            .resource(transaction.id)
            .details(serde_json::json!({
                "current_account_id": id,
                "document_type": transaction.document_type,
                "debit": transaction.debit_amount,
                "credit": transaction.credit_amount,
            })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(transaction)))
}
