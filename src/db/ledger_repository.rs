//! Current account and ledger transaction repository

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{parse_decimal, parse_enum, parse_opt_uuid, parse_uuid};
use crate::models::{
    AccountListQuery, AccountType, CurrentAccount, DocumentType, LedgerTransaction,
};
use crate::utils::time::{parse_db_timestamp_or_epoch, to_db};

const ACCOUNT_COLUMNS: &str = "id, tenant_id, code, name, account_type, tax_number, email, \
     phone, address, is_active, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, tenant_id, current_account_id, transaction_date, \
     document_type, document_number, description, debit_amount, credit_amount, balance, \
     created_by, created_at";

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: String,
    tenant_id: String,
    code: String,
    name: String,
    account_type: String,
    tax_number: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: String,
    tenant_id: String,
    current_account_id: String,
    transaction_date: String,
    document_type: String,
    document_number: Option<String>,
    description: Option<String>,
    debit_amount: String,
    credit_amount: String,
    balance: String,
    created_by: Option<String>,
    created_at: String,
}

pub struct LedgerRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> LedgerRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_account(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<CurrentAccount>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM current_accounts WHERE tenant_id = ? AND id = ?"
        ))
        .bind(tenant_id.to_string())
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get current account")?;

        Ok(row.map(row_to_account))
    }

    pub async fn list_accounts(
        &self,
        tenant_id: Uuid,
        query: &AccountListQuery,
    ) -> Result<Vec<CurrentAccount>> {
        let mut sql = format!("SELECT {ACCOUNT_COLUMNS} FROM current_accounts WHERE tenant_id = ?");
        if !query.include_inactive {
            sql.push_str(" AND is_active = 1");
        }
        if query.account_type.is_some() {
            sql.push_str(" AND account_type = ?");
        }
        if query.search.is_some() {
            sql.push_str(" AND (name LIKE ? OR code LIKE ? OR tax_number LIKE ?)");
        }
        sql.push_str(" ORDER BY name");

        let mut q = sqlx::query_as::<_, AccountRow>(&sql).bind(tenant_id.to_string());
        if let Some(account_type) = query.account_type {
            q = q.bind(account_type.as_str());
        }
        if let Some(ref search) = query.search {
            let pattern = format!("%{}%", search.trim());
            q = q.bind(pattern.clone()).bind(pattern.clone()).bind(pattern);
        }

        let rows = q
            .fetch_all(self.pool)
            .await
            .context("Failed to list current accounts")?;

        Ok(rows.into_iter().map(row_to_account).collect())
    }

    pub async fn count_accounts(&self, tenant_id: Uuid) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM current_accounts WHERE tenant_id = ?")
            .bind(tenant_id.to_string())
            .fetch_one(self.pool)
            .await
            .context("Failed to count current accounts")
    }

    /// Sum of debit minus credit per account of a tenant
    pub async fn balances(&self, tenant_id: Uuid) -> Result<HashMap<Uuid, Decimal>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT current_account_id, debit_amount, credit_amount \
             FROM current_account_transactions WHERE tenant_id = ?",
        )
        .bind(tenant_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to load account balances")?;

        let mut balances: HashMap<Uuid, Decimal> = HashMap::new();
        for (account_id, debit, credit) in rows {
            let balance = balances.entry(parse_uuid(&account_id)).or_default();
            *balance = balance
                .checked_add(parse_decimal(&debit) - parse_decimal(&credit))
                .context("Account balance overflowed")?;
        }
        Ok(balances)
    }

    pub async fn update_account(&self, account: &CurrentAccount, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE current_accounts
            SET name = ?, account_type = ?, tax_number = ?, email = ?, phone = ?, address = ?,
                is_active = ?, updated_at = ?
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(&account.name)
        .bind(account.account_type.as_str())
        .bind(account.tax_number.as_deref())
        .bind(account.email.as_deref())
        .bind(account.phone.as_deref())
        .bind(account.address.as_deref())
        .bind(account.is_active)
        .bind(to_db(now))
        .bind(account.tenant_id.to_string())
        .bind(account.id.to_string())
        .execute(self.pool)
        .await
        .context("Failed to update current account")?;
        Ok(())
    }

    /// Every entry of an account in chronological order
    pub async fn transactions(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> Result<Vec<LedgerTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM current_account_transactions \
             WHERE tenant_id = ? AND current_account_id = ? \
             ORDER BY transaction_date, created_at"
        ))
        .bind(tenant_id.to_string())
        .bind(account_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to load ledger transactions")?;

        Ok(rows.into_iter().map(row_to_transaction).collect())
    }
}

/// Next free sequence number for codes with `prefix` in a tenant
pub async fn next_account_number(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    prefix: &str,
) -> Result<u32> {
    let codes: Vec<String> =
        sqlx::query_scalar("SELECT code FROM current_accounts WHERE tenant_id = ? AND code LIKE ?")
            .bind(tenant_id.to_string())
            .bind(format!("{}-%", prefix))
            .fetch_all(conn)
            .await
            .context("Failed to read account codes")?;

    let max = codes
        .iter()
        .filter_map(|code| code.strip_prefix(prefix)?.strip_prefix('-')?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    Ok(max + 1)
}

pub async fn insert_account(conn: &mut SqliteConnection, account: &CurrentAccount) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO current_accounts ({ACCOUNT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(account.id.to_string())
    .bind(account.tenant_id.to_string())
    .bind(&account.code)
    .bind(&account.name)
    .bind(account.account_type.as_str())
    .bind(account.tax_number.as_deref())
    .bind(account.email.as_deref())
    .bind(account.phone.as_deref())
    .bind(account.address.as_deref())
    .bind(account.is_active)
    .bind(to_db(account.created_at))
    .bind(to_db(account.updated_at))
    .execute(conn)
    .await
    .context("Failed to create current account")?;
    Ok(())
}

/// Current balance of an account, read inside the posting transaction
pub async fn account_balance(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    account_id: Uuid,
) -> Result<Decimal> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT debit_amount, credit_amount FROM current_account_transactions \
         WHERE tenant_id = ? AND current_account_id = ?",
    )
    .bind(tenant_id.to_string())
    .bind(account_id.to_string())
    .fetch_all(conn)
    .await
    .context("Failed to read account balance")?;

    rows.iter()
        .map(|(debit, credit)| parse_decimal(debit) - parse_decimal(credit))
        .try_fold(Decimal::ZERO, |acc, net| acc.checked_add(net))
        .context("Account balance overflowed")
}

pub async fn insert_transaction(conn: &mut SqliteConnection, tx: &LedgerTransaction) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO current_account_transactions ({TRANSACTION_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(tx.id.to_string())
    .bind(tx.tenant_id.to_string())
    .bind(tx.current_account_id.to_string())
    .bind(to_db(tx.transaction_date))
    .bind(tx.document_type.as_str())
    .bind(tx.document_number.as_deref())
    .bind(tx.description.as_deref())
    .bind(tx.debit_amount.to_string())
    .bind(tx.credit_amount.to_string())
    .bind(tx.balance.to_string())
    .bind(tx.created_by.map(|u| u.to_string()))
    .bind(to_db(tx.created_at))
    .execute(conn)
    .await
    .context("Failed to post ledger transaction")?;
    Ok(())
}

fn row_to_account(row: AccountRow) -> CurrentAccount {
    CurrentAccount {
        id: parse_uuid(&row.id),
        tenant_id: parse_uuid(&row.tenant_id),
        code: row.code,
        name: row.name,
        account_type: parse_enum(&row.account_type, AccountType::Customer),
        tax_number: row.tax_number,
        email: row.email,
        phone: row.phone,
        address: row.address,
        is_active: row.is_active,
        created_at: parse_db_timestamp_or_epoch(&row.created_at),
        updated_at: parse_db_timestamp_or_epoch(&row.updated_at),
    }
}

fn row_to_transaction(row: TransactionRow) -> LedgerTransaction {
    LedgerTransaction {
        id: parse_uuid(&row.id),
        tenant_id: parse_uuid(&row.tenant_id),
        current_account_id: parse_uuid(&row.current_account_id),
        transaction_date: parse_db_timestamp_or_epoch(&row.transaction_date),
        document_type: parse_enum(&row.document_type, DocumentType::Adjustment),
        document_number: row.document_number,
        description: row.description,
        debit_amount: parse_decimal(&row.debit_amount),
        credit_amount: parse_decimal(&row.credit_amount),
        balance: parse_decimal(&row.balance),
        created_by: parse_opt_uuid(row.created_by.as_deref()),
        created_at: parse_db_timestamp_or_epoch(&row.created_at),
    }
}
