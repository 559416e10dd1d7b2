//! Current-account ledger
//!
//! Balances are debit minus credit. Each stored entry keeps the balance
//! snapshot computed at posting time; listings recompute running balances
//! from the entries themselves.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::db::{ledger_repository, LedgerRepository};
use crate::models::{
    AccountListQuery, CreateCurrentAccountRequest, CurrentAccount, CurrentAccountSummary,
    LedgerPage, LedgerRow, LedgerTransaction, PostTransactionRequest, TenantLimits,
    TransactionFilter, UpdateCurrentAccountRequest,
};
use crate::utils::{AppError, AppResult};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Single entries stay below this many currency units
pub const AMOUNT_LIMIT: i64 = 1_000_000_000_000_000;

/// Decimal places allowed on an amount
pub const AMOUNT_SCALE: u32 = 2;

fn check_amount(field: &str, amount: Decimal) -> AppResult<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AppError::invalid_field(field, "Amount cannot be negative"));
    }
    if amount >= Decimal::from(AMOUNT_LIMIT) {
        return Err(AppError::invalid_field(field, "Amount is too large"));
    }
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(AppError::invalid_field(
            field,
            format!("Amount allows at most {} decimal places", AMOUNT_SCALE),
        ));
    }
    Ok(())
}

/// Exactly one of debit and credit must be positive; neither may be negative
/// or exceed the per-entry limit
pub fn validate_amounts(debit: Decimal, credit: Decimal) -> AppResult<()> {
    check_amount("debit_amount", debit)?;
    check_amount("credit_amount", credit)?;
    match (debit.is_zero(), credit.is_zero()) {
        (true, true) => Err(AppError::bad_request(
            "Either a debit or a credit amount is required",
        )),
        (false, false) => Err(AppError::bad_request(
            "A transaction cannot have both a debit and a credit amount",
        )),
        _ => Ok(()),
    }
}

fn chronological(a: &LedgerTransaction, b: &LedgerTransaction) -> std::cmp::Ordering {
    a.transaction_date
        .cmp(&b.transaction_date)
        .then(a.created_at.cmp(&b.created_at))
}

/// Fold entries oldest first, attaching the balance after each one
pub fn running_balances(opening: Decimal, mut transactions: Vec<LedgerTransaction>) -> Vec<LedgerRow> {
    transactions.sort_by(chronological);

    let mut balance = opening;
    transactions
        .into_iter()
        .map(|transaction| {
            balance = balance.saturating_add(transaction.net());
            LedgerRow {
                transaction,
                running_balance: balance,
            }
        })
        .collect()
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Filter, fold, order newest first and paginate an account's entries
pub fn build_ledger_page(
    account: CurrentAccount,
    transactions: Vec<LedgerTransaction>,
    filter: &TransactionFilter,
) -> LedgerPage {
    let start = filter.start_date.map(start_of_day);
    let end = filter.end_date.map(|d| start_of_day(d) + Duration::days(1));

    let opening_balance: Decimal = transactions
        .iter()
        .filter(|t| start.is_some_and(|s| t.transaction_date < s))
        .map(LedgerTransaction::net)
        .fold(Decimal::ZERO, Decimal::saturating_add);

    let in_range: Vec<LedgerTransaction> = transactions
        .into_iter()
        .filter(|t| start.map_or(true, |s| t.transaction_date >= s))
        .filter(|t| end.map_or(true, |e| t.transaction_date < e))
        .filter(|t| filter.document_type.map_or(true, |dt| t.document_type == dt))
        .collect();

    // Postings are bounded, so saturation only guards rows written elsewhere
    let total_debit = in_range
        .iter()
        .map(|t| t.debit_amount)
        .fold(Decimal::ZERO, Decimal::saturating_add);
    let total_credit = in_range
        .iter()
        .map(|t| t.credit_amount)
        .fold(Decimal::ZERO, Decimal::saturating_add);

    let mut rows = running_balances(opening_balance, in_range);
    let closing_balance = rows
        .last()
        .map(|r| r.running_balance)
        .unwrap_or(opening_balance);
    rows.reverse();

    let per_page = filter
        .per_page
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let page = filter.page.unwrap_or(1).max(1);
    let total = rows.len();
    let offset = (page as usize - 1).saturating_mul(per_page as usize);
    let transactions = rows
        .into_iter()
        .skip(offset)
        .take(per_page as usize)
        .collect();

    LedgerPage {
        account,
        opening_balance,
        closing_balance,
        total_debit,
        total_credit,
        transactions,
        total,
        page,
        per_page,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct LedgerService {
    pool: SqlitePool,
}

impl LedgerService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn require_account(&self, tenant_id: Uuid, id: Uuid) -> AppResult<CurrentAccount> {
        LedgerRepository::new(&self.pool)
            .get_account(tenant_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("Current account not found"))
    }

    pub async fn list_accounts(
        &self,
        tenant_id: Uuid,
        query: &AccountListQuery,
    ) -> Result<Vec<CurrentAccountSummary>> {
        let repo = LedgerRepository::new(&self.pool);
        let accounts = repo.list_accounts(tenant_id, query).await?;
        let balances = repo.balances(tenant_id).await?;

        Ok(accounts
            .into_iter()
            .map(|account| {
                let balance = balances.get(&account.id).copied().unwrap_or_default();
                CurrentAccountSummary { account, balance }
            })
            .collect())
    }

    pub async fn get_account(&self, tenant_id: Uuid, id: Uuid) -> AppResult<CurrentAccountSummary> {
        let account = self.require_account(tenant_id, id).await?;
        let balance = LedgerRepository::new(&self.pool)
            .balances(tenant_id)
            .await?
            .get(&id)
            .copied()
            .unwrap_or_default();
        Ok(CurrentAccountSummary { account, balance })
    }

    /// Create an account with the next free code for its type
    pub async fn create_account(
        &self,
        tenant_id: Uuid,
        limits: &TenantLimits,
        request: &CreateCurrentAccountRequest,
        now: DateTime<Utc>,
    ) -> AppResult<CurrentAccount> {
        request.validate()?;

        if let Some(max) = limits.max_current_accounts {
            let count = LedgerRepository::new(&self.pool).count_accounts(tenant_id).await?;
            if count >= i64::from(max) {
                return Err(AppError::forbidden(format!(
                    "Current account limit of {} reached",
                    max
                )));
            }
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let prefix = request.account_type.code_prefix();
        let number = ledger_repository::next_account_number(&mut *tx, tenant_id, prefix).await?;
        let account = CurrentAccount {
            id: Uuid::new_v4(),
            tenant_id,
            code: format!("{}-{:05}", prefix, number),
            name: request.name.trim().to_string(),
            account_type: request.account_type,
            tax_number: non_blank(request.tax_number.clone()),
            email: non_blank(request.email.clone()),
            phone: non_blank(request.phone.clone()),
            address: non_blank(request.address.clone()),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        ledger_repository::insert_account(&mut *tx, &account).await?;

        tx.commit().await.context("Failed to commit current account")?;

        info!(%tenant_id, code = %account.code, "Created current account");
        Ok(account)
    }

    pub async fn update_account(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        request: &UpdateCurrentAccountRequest,
        now: DateTime<Utc>,
    ) -> AppResult<CurrentAccount> {
        request.validate()?;
        let mut account = self.require_account(tenant_id, id).await?;

        if let Some(ref name) = request.name {
            account.name = name.trim().to_string();
        }
        if let Some(account_type) = request.account_type {
            account.account_type = account_type;
        }
        if request.tax_number.is_some() {
            account.tax_number = non_blank(request.tax_number.clone());
        }
        if request.email.is_some() {
            account.email = non_blank(request.email.clone());
        }
        if request.phone.is_some() {
            account.phone = non_blank(request.phone.clone());
        }
        if request.address.is_some() {
            account.address = non_blank(request.address.clone());
        }
        account.updated_at = now;

        LedgerRepository::new(&self.pool)
            .update_account(&account, now)
            .await?;
        Ok(account)
    }

    /// Accounts are never deleted; deactivation hides them from default listings
    pub async fn deactivate_account(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<CurrentAccount> {
        let mut account = self.require_account(tenant_id, id).await?;
        account.is_active = false;
        account.updated_at = now;
        LedgerRepository::new(&self.pool)
            .update_account(&account, now)
            .await?;
        info!(%tenant_id, code = %account.code, "Deactivated current account");
        Ok(account)
    }

    pub async fn list_transactions(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        filter: &TransactionFilter,
    ) -> AppResult<LedgerPage> {
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(AppError::invalid_field(
                    "start_date",
                    "Start date must not be after end date",
                ));
            }
        }

        let account = self.require_account(tenant_id, account_id).await?;
        let transactions = LedgerRepository::new(&self.pool)
            .transactions(tenant_id, account_id)
            .await?;
        Ok(build_ledger_page(account, transactions, filter))
    }

    /// Post an entry, storing the account balance after it
    pub async fn post_transaction(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        created_by: Uuid,
        request: &PostTransactionRequest,
        now: DateTime<Utc>,
    ) -> AppResult<LedgerTransaction> {
        validate_amounts(request.debit_amount, request.credit_amount)?;

        let account = self.require_account(tenant_id, account_id).await?;
        if !account.is_active {
            return Err(AppError::bad_request("Current account is inactive"));
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let current = ledger_repository::account_balance(&mut *tx, tenant_id, account_id).await?;
        let balance = current
            .checked_add(request.debit_amount)
            .and_then(|b| b.checked_sub(request.credit_amount))
            .ok_or_else(|| AppError::bad_request("Posting would overflow the account balance"))?;
        let entry = LedgerTransaction {
            id: Uuid::new_v4(),
            tenant_id,
            current_account_id: account_id,
            transaction_date: request.transaction_date.unwrap_or(now),
            document_type: request.document_type,
            document_number: non_blank(request.document_number.clone()),
            description: non_blank(request.description.clone()),
            debit_amount: request.debit_amount,
            credit_amount: request.credit_amount,
            balance,
            created_by: Some(created_by),
            created_at: now,
        };
        ledger_repository::insert_transaction(&mut *tx, &entry).await?;

        tx.commit().await.context("Failed to commit ledger transaction")?;

        info!(%tenant_id, account = %account.code, balance = %entry.balance, "Posted ledger transaction");
        Ok(entry)
    }
}
