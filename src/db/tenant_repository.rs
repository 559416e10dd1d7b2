//! Tenant repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{parse_enum, parse_uuid};
use crate::models::{
    PlanTier, Tenant, TenantLimits, TenantOverview, TenantSettings, TenantStatus,
};
use crate::utils::time::{parse_db_timestamp_or_epoch, to_db};
use crate::utils::validation::slugify;

const TENANT_COLUMNS: &str =
    "id, name, slug, status, plan, settings, limits, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    id: String,
    name: String,
    slug: String,
    status: String,
    plan: String,
    settings: String,
    limits: String,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TenantOverviewRow {
    #[sqlx(flatten)]
    tenant: TenantRow,
    user_count: i64,
    active_user_count: i64,
    active_module_count: i64,
}

pub struct TenantRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TenantRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get tenant")?;

        Ok(row.map(row_to_tenant))
    }

    /// All tenants with user and module counts
    pub async fn list_overview(&self, now: DateTime<Utc>) -> Result<Vec<TenantOverview>> {
        let rows = sqlx::query_as::<_, TenantOverviewRow>(
            r#"
            SELECT t.id, t.name, t.slug, t.status, t.plan, t.settings, t.limits,
                   t.created_at, t.updated_at,
                   (SELECT COUNT(*) FROM users u WHERE u.tenant_id = t.id) AS user_count,
                   (SELECT COUNT(*) FROM users u
                     WHERE u.tenant_id = t.id AND u.status = 'ACTIVE') AS active_user_count,
                   (SELECT COUNT(*) FROM tenant_modules tm
                     WHERE tm.tenant_id = t.id
                       AND tm.status IN ('ACTIVE', 'TRIAL')
                       AND (tm.expires_at IS NULL OR tm.expires_at > ?)) AS active_module_count
            FROM tenants t
            ORDER BY t.created_at DESC
            "#,
        )
        .bind(to_db(now))
        .fetch_all(self.pool)
        .await
        .context("Failed to list tenants")?;

        Ok(rows
            .into_iter()
            .map(|row| TenantOverview {
                tenant: row_to_tenant(row.tenant),
                user_count: row.user_count,
                active_user_count: row.active_user_count,
                active_module_count: row.active_module_count,
            })
            .collect())
    }
}

pub async fn get_by_id_conn(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Tenant>> {
    let row = sqlx::query_as::<_, TenantRow>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(conn)
    .await
    .context("Failed to get tenant")?;

    Ok(row.map(row_to_tenant))
}

/// Slug derived from `name`, suffixed with -2, -3, ... until unused
pub async fn unique_slug(conn: &mut SqliteConnection, name: &str) -> Result<String> {
    let base = slugify(name);
    let mut candidate = base.clone();
    let mut suffix = 2;

    loop {
        let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants WHERE slug = ?")
            .bind(&candidate)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to check tenant slug")?;
        if taken == 0 {
            return Ok(candidate);
        }
        candidate = format!("{}-{}", base, suffix);
        suffix += 1;
    }
}

/// Insert a new trial tenant on the free plan
pub async fn insert(
    conn: &mut SqliteConnection,
    name: &str,
    slug: &str,
    now: DateTime<Utc>,
) -> Result<Tenant> {
    let tenant = Tenant {
        id: Uuid::new_v4(),
        name: name.to_string(),
        slug: slug.to_string(),
        status: TenantStatus::Trial,
        plan: PlanTier::Free,
        settings: TenantSettings::default(),
        limits: TenantLimits::default(),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO tenants (id, name, slug, status, plan, settings, limits, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tenant.id.to_string())
    .bind(&tenant.name)
    .bind(&tenant.slug)
    .bind(tenant.status.as_str())
    .bind(tenant.plan.as_str())
    .bind(serde_json::to_string(&tenant.settings)?)
    .bind(serde_json::to_string(&tenant.limits)?)
    .bind(to_db(now))
    .bind(to_db(now))
    .execute(conn)
    .await
    .context("Failed to create tenant")?;

    Ok(tenant)
}

pub async fn set_status(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: TenantStatus,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query("UPDATE tenants SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(to_db(now))
        .bind(id.to_string())
        .execute(conn)
        .await
        .context("Failed to update tenant status")?;

    Ok(result.rows_affected())
}

/// Persist status, plan, settings and limits of an edited tenant
pub async fn save(conn: &mut SqliteConnection, tenant: &Tenant, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE tenants
        SET status = ?, plan = ?, settings = ?, limits = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(tenant.status.as_str())
    .bind(tenant.plan.as_str())
    .bind(serde_json::to_string(&tenant.settings)?)
    .bind(serde_json::to_string(&tenant.limits)?)
    .bind(to_db(now))
    .bind(tenant.id.to_string())
    .execute(conn)
    .await
    .context("Failed to update tenant")?;

    Ok(())
}

fn row_to_tenant(row: TenantRow) -> Tenant {
    Tenant {
        id: parse_uuid(&row.id),
        name: row.name,
        slug: row.slug,
        status: parse_enum(&row.status, TenantStatus::Suspended),
        plan: parse_enum(&row.plan, PlanTier::Free),
        settings: serde_json::from_str(&row.settings).unwrap_or_default(),
        limits: serde_json::from_str(&row.limits).unwrap_or_default(),
        created_at: parse_db_timestamp_or_epoch(&row.created_at),
        updated_at: parse_db_timestamp_or_epoch(&row.updated_at),
    }
}
