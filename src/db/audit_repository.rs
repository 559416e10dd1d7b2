//! Audit log repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_opt_uuid, parse_uuid};
use crate::models::{AuditEvent, AuditLogEntry, AuditLogQuery};
use crate::utils::time::{parse_db_timestamp_or_epoch, to_db};

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: String,
    tenant_id: Option<String>,
    user_id: Option<String>,
    action: String,
    resource_type: String,
    resource_id: Option<String>,
    details: Option<String>,
    ip_address: Option<String>,
    created_at: String,
}

pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, event: &AuditEvent<'_>, ip_address: Option<&str>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let details = event.details.as_ref().map(|d| d.to_string());

        sqlx::query(
            r#"
            INSERT INTO audit_log (id, tenant_id, user_id, action, resource_type, resource_id, details, ip_address, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(event.tenant_id.map(|t| t.to_string()))
        .bind(event.user_id.map(|u| u.to_string()))
        .bind(event.action)
        .bind(event.resource_type)
        .bind(event.resource_id.as_deref())
        .bind(details.as_deref())
        .bind(ip_address)
        .bind(to_db(Utc::now()))
        .execute(self.pool)
        .await
        .context("Failed to insert audit log entry")?;

        Ok(id)
    }

    /// List entries, newest first; `tenant_id` in the query narrows to one tenant
    pub async fn list(&self, query: &AuditLogQuery) -> Result<Vec<AuditLogEntry>> {
        let mut sql = String::from(
            "SELECT id, tenant_id, user_id, action, resource_type, resource_id, details, ip_address, created_at FROM audit_log WHERE 1 = 1",
        );

        if query.tenant_id.is_some() {
            sql.push_str(" AND tenant_id = ?");
        }
        if query.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if query.resource_type.is_some() {
            sql.push_str(" AND resource_type = ?");
        }
        if query.action.is_some() {
            sql.push_str(" AND action = ?");
        }

        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query_as::<_, AuditRow>(&sql);
        if let Some(tenant_id) = query.tenant_id {
            q = q.bind(tenant_id.to_string());
        }
        if let Some(user_id) = query.user_id {
            q = q.bind(user_id.to_string());
        }
        if let Some(ref resource_type) = query.resource_type {
            q = q.bind(resource_type);
        }
        if let Some(ref action) = query.action {
            q = q.bind(action);
        }
        q = q
            .bind(query.limit.unwrap_or(100).min(1000) as i64)
            .bind(query.offset.unwrap_or(0) as i64);

        let rows = q
            .fetch_all(self.pool)
            .await
            .context("Failed to list audit logs")?;

        Ok(rows.into_iter().map(row_to_audit).collect())
    }
}

fn row_to_audit(row: AuditRow) -> AuditLogEntry {
    AuditLogEntry {
        id: parse_uuid(&row.id),
        tenant_id: parse_opt_uuid(row.tenant_id.as_deref()),
        user_id: parse_opt_uuid(row.user_id.as_deref()),
        action: row.action,
        resource_type: row.resource_type,
        resource_id: row.resource_id,
        details: row.details.and_then(|s| serde_json::from_str(&s).ok()),
        ip_address: row.ip_address,
        created_at: parse_db_timestamp_or_epoch(&row.created_at),
    }
}
