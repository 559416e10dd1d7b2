//! Suspension repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{parse_enum, parse_opt_uuid, parse_uuid};
use crate::models::{AppealStatus, Suspension, SuspensionDuration};
use crate::utils::time::{parse_db_timestamp, parse_db_timestamp_or_epoch, to_db};

const SUSPENSION_COLUMNS: &str = "id, user_id, suspended_by, reason, duration_type, \
     suspended_until, can_appeal, appeal_deadline, has_appealed, appeal_status, appeal_reason, \
     appealed_at, appeal_reviewed_by, appeal_reviewed_at, appeal_review_note, is_active, \
     lifted_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct SuspensionRow {
    id: String,
    user_id: String,
    suspended_by: Option<String>,
    reason: String,
    duration_type: String,
    suspended_until: Option<String>,
    can_appeal: bool,
    appeal_deadline: Option<String>,
    has_appealed: bool,
    appeal_status: Option<String>,
    appeal_reason: Option<String>,
    appealed_at: Option<String>,
    appeal_reviewed_by: Option<String>,
    appeal_reviewed_at: Option<String>,
    appeal_review_note: Option<String>,
    is_active: bool,
    lifted_at: Option<String>,
    created_at: String,
    updated_at: String,
}

pub struct SuspensionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SuspensionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Suspension>> {
        let row = sqlx::query_as::<_, SuspensionRow>(&format!(
            "SELECT {SUSPENSION_COLUMNS} FROM suspensions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get suspension")?;

        Ok(row.map(row_to_suspension))
    }

    pub async fn active_for_user(&self, user_id: Uuid) -> Result<Option<Suspension>> {
        let row = sqlx::query_as::<_, SuspensionRow>(&format!(
            "SELECT {SUSPENSION_COLUMNS} FROM suspensions \
             WHERE user_id = ? AND is_active = 1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(user_id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get active suspension")?;

        Ok(row.map(row_to_suspension))
    }

    /// Most recent suspension, active or not
    pub async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<Suspension>> {
        let row = sqlx::query_as::<_, SuspensionRow>(&format!(
            "SELECT {SUSPENSION_COLUMNS} FROM suspensions \
             WHERE user_id = ? ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(user_id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get suspension history")?;

        Ok(row.map(row_to_suspension))
    }

    pub async fn active_temporary(&self) -> Result<Vec<Suspension>> {
        let rows = sqlx::query_as::<_, SuspensionRow>(&format!(
            "SELECT {SUSPENSION_COLUMNS} FROM suspensions \
             WHERE is_active = 1 AND duration_type = 'TEMPORARY'"
        ))
        .fetch_all(self.pool)
        .await
        .context("Failed to list temporary suspensions")?;

        Ok(rows.into_iter().map(row_to_suspension).collect())
    }

    pub async fn pending_appeals(&self) -> Result<Vec<Suspension>> {
        let rows = sqlx::query_as::<_, SuspensionRow>(&format!(
            "SELECT {SUSPENSION_COLUMNS} FROM suspensions \
             WHERE is_active = 1 AND appeal_status = 'PENDING' ORDER BY appealed_at"
        ))
        .fetch_all(self.pool)
        .await
        .context("Failed to list pending appeals")?;

        Ok(rows.into_iter().map(row_to_suspension).collect())
    }

    /// Record an appeal; only succeeds once per suspension
    pub async fn record_appeal(&self, id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE suspensions
            SET has_appealed = 1, appeal_status = 'PENDING', appeal_reason = ?,
                appealed_at = ?, updated_at = ?
            WHERE id = ? AND has_appealed = 0 AND is_active = 1
            "#,
        )
        .bind(reason)
        .bind(to_db(now))
        .bind(to_db(now))
        .bind(id.to_string())
        .execute(self.pool)
        .await
        .context("Failed to record appeal")?;

        Ok(result.rows_affected() == 1)
    }
}

pub async fn get_by_id_conn(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Suspension>> {
    let row = sqlx::query_as::<_, SuspensionRow>(&format!(
        "SELECT {SUSPENSION_COLUMNS} FROM suspensions WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(conn)
    .await
    .context("Failed to get suspension")?;

    Ok(row.map(row_to_suspension))
}

/// Deactivate whatever suspension is currently active for a user
pub async fn deactivate_active(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE suspensions SET is_active = 0, lifted_at = ?, updated_at = ? WHERE user_id = ? AND is_active = 1",
    )
    .bind(to_db(now))
    .bind(to_db(now))
    .bind(user_id.to_string())
    .execute(conn)
    .await
    .context("Failed to deactivate suspensions")?;
    Ok(result.rows_affected())
}

/// Lift one suspension; false when it was already inactive
pub async fn lift(conn: &mut SqliteConnection, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE suspensions SET is_active = 0, lifted_at = ?, updated_at = ? WHERE id = ? AND is_active = 1",
    )
    .bind(to_db(now))
    .bind(to_db(now))
    .bind(id.to_string())
    .execute(conn)
    .await
    .context("Failed to lift suspension")?;
    Ok(result.rows_affected() == 1)
}

pub async fn insert(conn: &mut SqliteConnection, s: &Suspension) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO suspensions ({SUSPENSION_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(s.id.to_string())
    .bind(s.user_id.to_string())
    .bind(s.suspended_by.map(|u| u.to_string()))
    .bind(&s.reason)
    .bind(s.duration_type.as_str())
    .bind(s.suspended_until.map(to_db))
    .bind(s.can_appeal)
    .bind(s.appeal_deadline.map(to_db))
    .bind(s.has_appealed)
    .bind(s.appeal_status.map(|a| a.as_str()))
    .bind(s.appeal_reason.as_deref())
    .bind(s.appealed_at.map(to_db))
    .bind(s.appeal_reviewed_by.map(|u| u.to_string()))
    .bind(s.appeal_reviewed_at.map(to_db))
    .bind(s.appeal_review_note.as_deref())
    .bind(s.is_active)
    .bind(s.lifted_at.map(to_db))
    .bind(to_db(s.created_at))
    .bind(to_db(s.updated_at))
    .execute(conn)
    .await
    .context("Failed to create suspension")?;
    Ok(())
}

pub async fn record_decision(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: AppealStatus,
    reviewer: Uuid,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE suspensions
        SET appeal_status = ?, appeal_reviewed_by = ?, appeal_reviewed_at = ?,
            appeal_review_note = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(reviewer.to_string())
    .bind(to_db(now))
    .bind(note)
    .bind(to_db(now))
    .bind(id.to_string())
    .execute(conn)
    .await
    .context("Failed to record appeal decision")?;
    Ok(())
}

fn row_to_suspension(row: SuspensionRow) -> Suspension {
    Suspension {
        id: parse_uuid(&row.id),
        user_id: parse_uuid(&row.user_id),
        suspended_by: parse_opt_uuid(row.suspended_by.as_deref()),
        reason: row.reason,
        duration_type: parse_enum(&row.duration_type, SuspensionDuration::Permanent),
        suspended_until: row.suspended_until.as_deref().and_then(parse_db_timestamp),
        can_appeal: row.can_appeal,
        appeal_deadline: row.appeal_deadline.as_deref().and_then(parse_db_timestamp),
        has_appealed: row.has_appealed,
        appeal_status: row.appeal_status.as_deref().and_then(|s| s.parse().ok()),
        appeal_reason: row.appeal_reason,
        appealed_at: row.appealed_at.as_deref().and_then(parse_db_timestamp),
        appeal_reviewed_by: parse_opt_uuid(row.appeal_reviewed_by.as_deref()),
        appeal_reviewed_at: row.appeal_reviewed_at.as_deref().and_then(parse_db_timestamp),
        appeal_review_note: row.appeal_review_note,
        is_active: row.is_active,
        lifted_at: row.lifted_at.as_deref().and_then(parse_db_timestamp),
        created_at: parse_db_timestamp_or_epoch(&row.created_at),
        updated_at: parse_db_timestamp_or_epoch(&row.updated_at),
    }
}
