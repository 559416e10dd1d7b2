//! User, verification token and subscription repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{parse_decimal, parse_enum, parse_opt_uuid, parse_uuid};
use crate::models::{
    BillingPeriod, NewUser, PlanTier, SubscriptionStatus, User, UserRole, UserStatus,
    UserSubscription,
};
use crate::utils::time::{parse_db_timestamp, parse_db_timestamp_or_epoch, to_db};

const USER_COLUMNS: &str = "id, tenant_id, email, first_name, last_name, phone, password_hash, \
     role, status, email_verified, trial_start_date, trial_end_date, extra_trial_days, \
     last_login_at, created_at, updated_at";

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, tenant_id, plan, billing_period, amount, \
     currency, status, payment_reference, card_last4, starts_at, ends_at, created_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    tenant_id: Option<String>,
    email: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    password_hash: String,
    role: String,
    status: String,
    email_verified: bool,
    trial_start_date: Option<String>,
    trial_end_date: Option<String>,
    extra_trial_days: i64,
    last_login_at: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: String,
    user_id: String,
    tenant_id: Option<String>,
    plan: String,
    billing_period: String,
    amount: String,
    currency: String,
    status: String,
    payment_reference: String,
    card_last4: String,
    starts_at: String,
    ends_at: String,
    created_at: String,
}

/// Stored e-mail verification token
#[derive(Debug, sqlx::FromRow)]
pub struct VerificationTokenRow {
    pub id: String,
    pub user_id: String,
    pub expires_at: String,
    pub consumed_at: Option<String>,
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get user")?;

        Ok(row.map(row_to_user))
    }

    /// Look up by e-mail (stored lowercase)
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await
        .context("Failed to get user by email")?;

        Ok(row.map(row_to_user))
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(self.pool)
            .await
            .context("Failed to check email")?;
        Ok(count > 0)
    }

    pub async fn list_by_status(
        &self,
        status: UserStatus,
        role: Option<UserRole>,
    ) -> Result<Vec<User>> {
        let mut sql = format!("SELECT {USER_COLUMNS} FROM users WHERE status = ?");
        if role.is_some() {
            sql.push_str(" AND role = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut q = sqlx::query_as::<_, UserRow>(&sql).bind(status.as_str());
        if let Some(role) = role {
            q = q.bind(role.as_str());
        }

        let rows = q
            .fetch_all(self.pool)
            .await
            .context("Failed to list users by status")?;

        Ok(rows.into_iter().map(row_to_user).collect())
    }

    pub async fn list_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE tenant_id = ? ORDER BY created_at"
        ))
        .bind(tenant_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list tenant users")?;

        Ok(rows.into_iter().map(row_to_user).collect())
    }

    pub async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE tenant_id = ?")
            .bind(tenant_id.to_string())
            .fetch_one(self.pool)
            .await
            .context("Failed to count tenant users")
    }

    /// Active users carrying a trial end date
    pub async fn list_active_with_trial(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE status = 'ACTIVE' AND trial_end_date IS NOT NULL \
             ORDER BY trial_end_date"
        ))
        .fetch_all(self.pool)
        .await
        .context("Failed to list trial users")?;

        Ok(rows.into_iter().map(row_to_user).collect())
    }

    pub async fn any_super_admin(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'SUPER_ADMIN'")
            .fetch_one(self.pool)
            .await
            .context("Failed to count super admins")?;
        Ok(count > 0)
    }

    pub async fn record_login(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(to_db(now))
            .bind(id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to record login")?;
        Ok(())
    }

    pub async fn active_subscription(&self, user_id: Uuid) -> Result<Option<UserSubscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM user_subscriptions \
             WHERE user_id = ? AND status = 'ACTIVE'"
        ))
        .bind(user_id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get active subscription")?;

        Ok(row.map(row_to_subscription))
    }
}

pub async fn get_by_id_conn(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(conn)
    .await
    .context("Failed to get user")?;

    Ok(row.map(row_to_user))
}

pub async fn insert(conn: &mut SqliteConnection, new: &NewUser, now: DateTime<Utc>) -> Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO users (id, tenant_id, email, first_name, last_name, phone, password_hash,
                           role, status, email_verified, trial_start_date, trial_end_date,
                           extra_trial_days, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(new.tenant_id.map(|t| t.to_string()))
    .bind(&new.email)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(new.phone.as_deref())
    .bind(&new.password_hash)
    .bind(new.role.as_str())
    .bind(new.status.as_str())
    .bind(new.email_verified)
    .bind(new.trial_start_date.map(to_db))
    .bind(new.trial_end_date.map(to_db))
    .bind(to_db(now))
    .bind(to_db(now))
    .execute(conn)
    .await
    .context("Failed to create user")?;

    Ok(id)
}

pub async fn set_status(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: UserStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(to_db(now))
        .bind(id.to_string())
        .execute(conn)
        .await
        .context("Failed to update user status")?;
    Ok(())
}

/// Move every user of a tenant in one of `from` to `to`, optionally sparing one user
pub async fn cascade_tenant_status(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    from: &[UserStatus],
    to: UserStatus,
    except: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<u64> {
    if from.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; from.len()].join(", ");
    let mut sql = format!(
        "UPDATE users SET status = ?, updated_at = ? WHERE tenant_id = ? AND status IN ({placeholders})"
    );
    if except.is_some() {
        sql.push_str(" AND id != ?");
    }

    let mut q = sqlx::query(&sql)
        .bind(to.as_str())
        .bind(to_db(now))
        .bind(tenant_id.to_string());
    for status in from {
        q = q.bind(status.as_str());
    }
    if let Some(except) = except {
        q = q.bind(except.to_string());
    }

    let result = q
        .execute(conn)
        .await
        .context("Failed to cascade tenant user status")?;
    Ok(result.rows_affected())
}

pub async fn mark_email_verified(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: UserStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE users SET email_verified = 1, status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(to_db(now))
        .bind(id.to_string())
        .execute(conn)
        .await
        .context("Failed to mark email verified")?;
    Ok(())
}

/// Persist a new trial window together with the resulting status
pub async fn update_trial(
    conn: &mut SqliteConnection,
    id: Uuid,
    trial_end_date: DateTime<Utc>,
    extra_trial_days: i64,
    status: UserStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET trial_end_date = ?, extra_trial_days = ?, status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(to_db(trial_end_date))
    .bind(extra_trial_days)
    .bind(status.as_str())
    .bind(to_db(now))
    .bind(id.to_string())
    .execute(conn)
    .await
    .context("Failed to update trial window")?;
    Ok(())
}

pub async fn insert_verification_token(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO email_verification_tokens (id, user_id, token_hash, expires_at, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(token_hash)
    .bind(to_db(expires_at))
    .bind(to_db(now))
    .execute(conn)
    .await
    .context("Failed to store verification token")?;
    Ok(())
}

pub async fn find_verification_token(
    conn: &mut SqliteConnection,
    token_hash: &str,
) -> Result<Option<VerificationTokenRow>> {
    sqlx::query_as::<_, VerificationTokenRow>(
        "SELECT id, user_id, expires_at, consumed_at FROM email_verification_tokens WHERE token_hash = ?",
    )
    .bind(token_hash)
    .fetch_optional(conn)
    .await
    .context("Failed to look up verification token")
}

pub async fn consume_verification_token(
    conn: &mut SqliteConnection,
    id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE email_verification_tokens SET consumed_at = ? WHERE id = ? AND consumed_at IS NULL",
    )
    .bind(to_db(now))
    .bind(id)
    .execute(conn)
    .await
    .context("Failed to consume verification token")?;
    Ok(result.rows_affected() == 1)
}

/// Mark the current active subscription of a user as replaced
pub async fn replace_active_subscription(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE user_subscriptions SET status = ? WHERE user_id = ? AND status = 'ACTIVE'",
    )
    .bind(SubscriptionStatus::Replaced.as_str())
    .bind(user_id.to_string())
    .execute(conn)
    .await
    .context("Failed to replace active subscription")?;
    Ok(result.rows_affected())
}

pub async fn insert_subscription(
    conn: &mut SqliteConnection,
    sub: &UserSubscription,
) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO user_subscriptions ({SUBSCRIPTION_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(sub.id.to_string())
    .bind(sub.user_id.to_string())
    .bind(sub.tenant_id.map(|t| t.to_string()))
    .bind(sub.plan.as_str())
    .bind(sub.billing_period.as_str())
    .bind(sub.amount.to_string())
    .bind(&sub.currency)
    .bind(sub.status.as_str())
    .bind(&sub.payment_reference)
    .bind(&sub.card_last4)
    .bind(to_db(sub.starts_at))
    .bind(to_db(sub.ends_at))
    .bind(to_db(sub.created_at))
    .execute(conn)
    .await
    .context("Failed to store subscription")?;
    Ok(())
}

fn row_to_user(row: UserRow) -> User {
    User {
        id: parse_uuid(&row.id),
        tenant_id: parse_opt_uuid(row.tenant_id.as_deref()),
        email: row.email,
        first_name: row.first_name,
        last_name: row.last_name,
        phone: row.phone,
        password_hash: row.password_hash,
        role: parse_enum(&row.role, UserRole::User),
        status: parse_enum(&row.status, UserStatus::Inactive),
        email_verified: row.email_verified,
        trial_start_date: row.trial_start_date.as_deref().and_then(parse_db_timestamp),
        trial_end_date: row.trial_end_date.as_deref().and_then(parse_db_timestamp),
        extra_trial_days: row.extra_trial_days,
        last_login_at: row.last_login_at.as_deref().and_then(parse_db_timestamp),
        created_at: parse_db_timestamp_or_epoch(&row.created_at),
        updated_at: parse_db_timestamp_or_epoch(&row.updated_at),
    }
}

fn row_to_subscription(row: SubscriptionRow) -> UserSubscription {
    UserSubscription {
        id: parse_uuid(&row.id),
        user_id: parse_uuid(&row.user_id),
        tenant_id: parse_opt_uuid(row.tenant_id.as_deref()),
        plan: parse_enum(&row.plan, PlanTier::Free),
        billing_period: parse_enum(&row.billing_period, BillingPeriod::Monthly),
        amount: parse_decimal(&row.amount),
        currency: row.currency,
        status: parse_enum(&row.status, SubscriptionStatus::Cancelled),
        payment_reference: row.payment_reference,
        card_last4: row.card_last4,
        starts_at: parse_db_timestamp_or_epoch(&row.starts_at),
        ends_at: parse_db_timestamp_or_epoch(&row.ends_at),
        created_at: parse_db_timestamp_or_epoch(&row.created_at),
    }
}
