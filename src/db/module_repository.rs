//! Module catalog, tenant module and package repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_decimal, parse_enum, parse_uuid};
use crate::models::{
    Module, ModuleBillingType, Package, PackageGrant, PaymentStatus, SubscriptionState,
    TenantModule, TenantPackage,
};
use crate::utils::time::{parse_db_timestamp, parse_db_timestamp_or_epoch, to_db};

const MODULE_COLUMNS: &str =
    "id, code, name, description, category, price, billing_type, is_core, is_active";

const TENANT_MODULE_SELECT: &str = r#"
    SELECT tm.id, tm.tenant_id, tm.module_id, m.code AS module_code, tm.status,
           tm.activated_at, tm.expires_at, tm.auto_renew, tm.monthly_amount,
           tm.payment_status, tm.is_trial_module, tm.trial_days,
           tm.created_at, tm.updated_at
    FROM tenant_modules tm
    INNER JOIN modules m ON m.id = tm.module_id
"#;

#[derive(Debug, sqlx::FromRow)]
struct ModuleRow {
    id: String,
    code: String,
    name: String,
    description: Option<String>,
    category: String,
    price: String,
    billing_type: String,
    is_core: bool,
    is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct TenantModuleRow {
    id: String,
    tenant_id: String,
    module_id: String,
    module_code: String,
    status: String,
    activated_at: String,
    expires_at: Option<String>,
    auto_renew: bool,
    monthly_amount: String,
    payment_status: String,
    is_trial_module: bool,
    trial_days: Option<i64>,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct PackageRow {
    id: String,
    code: String,
    name: String,
    description: Option<String>,
    price: String,
    is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct TenantPackageRow {
    id: String,
    tenant_id: String,
    package_id: String,
    package_code: String,
    status: String,
    activated_at: String,
    expires_at: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct PackageGrantRow {
    module_code: String,
    status: String,
    expires_at: Option<String>,
}

pub struct ModuleRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ModuleRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_catalog(&self, include_inactive: bool) -> Result<Vec<Module>> {
        let sql = if include_inactive {
            format!("SELECT {MODULE_COLUMNS} FROM modules ORDER BY is_core DESC, category, name")
        } else {
            format!(
                "SELECT {MODULE_COLUMNS} FROM modules WHERE is_active = 1 \
                 ORDER BY is_core DESC, category, name"
            )
        };

        let rows = sqlx::query_as::<_, ModuleRow>(&sql)
            .fetch_all(self.pool)
            .await
            .context("Failed to list modules")?;

        Ok(rows.into_iter().map(row_to_module).collect())
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<Module>> {
        let row = sqlx::query_as::<_, ModuleRow>(&format!(
            "SELECT {MODULE_COLUMNS} FROM modules WHERE code = ?"
        ))
        .bind(code)
        .fetch_optional(self.pool)
        .await
        .context("Failed to get module")?;

        Ok(row.map(row_to_module))
    }

    /// Codes of modules granted to every tenant
    pub async fn core_codes(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT code FROM modules WHERE is_active = 1 AND (is_core = 1 OR code LIKE 'CORE\\_%' ESCAPE '\\')",
        )
        .fetch_all(self.pool)
        .await
        .context("Failed to load core modules")
    }

    pub async fn tenant_modules(&self, tenant_id: Uuid) -> Result<Vec<TenantModule>> {
        let rows = sqlx::query_as::<_, TenantModuleRow>(&format!(
            "{TENANT_MODULE_SELECT} WHERE tm.tenant_id = ? ORDER BY m.code"
        ))
        .bind(tenant_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to load tenant modules")?;

        Ok(rows.into_iter().map(row_to_tenant_module).collect())
    }

    pub async fn all_tenant_modules(&self) -> Result<Vec<TenantModule>> {
        let rows = sqlx::query_as::<_, TenantModuleRow>(&format!(
            "{TENANT_MODULE_SELECT} ORDER BY tm.tenant_id, m.code"
        ))
        .fetch_all(self.pool)
        .await
        .context("Failed to load tenant modules")?;

        Ok(rows.into_iter().map(row_to_tenant_module).collect())
    }

    pub async fn find_tenant_module(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
    ) -> Result<Option<TenantModule>> {
        let row = sqlx::query_as::<_, TenantModuleRow>(&format!(
            "{TENANT_MODULE_SELECT} WHERE tm.tenant_id = ? AND tm.module_id = ?"
        ))
        .bind(tenant_id.to_string())
        .bind(module_id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get tenant module")?;

        Ok(row.map(row_to_tenant_module))
    }

    /// Insert or update the single row for (tenant, module)
    pub async fn upsert_tenant_module(&self, tm: &TenantModule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenant_modules (id, tenant_id, module_id, status, activated_at, expires_at,
                                        auto_renew, monthly_amount, payment_status,
                                        is_trial_module, trial_days, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tenant_id, module_id) DO UPDATE SET
                status = excluded.status,
                activated_at = excluded.activated_at,
                expires_at = excluded.expires_at,
                auto_renew = excluded.auto_renew,
                monthly_amount = excluded.monthly_amount,
                payment_status = excluded.payment_status,
                is_trial_module = excluded.is_trial_module,
                trial_days = excluded.trial_days,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(tm.id.to_string())
        .bind(tm.tenant_id.to_string())
        .bind(tm.module_id.to_string())
        .bind(tm.status.as_str())
        .bind(to_db(tm.activated_at))
        .bind(tm.expires_at.map(to_db))
        .bind(tm.auto_renew)
        .bind(tm.monthly_amount.to_string())
        .bind(tm.payment_status.as_str())
        .bind(tm.is_trial_module)
        .bind(tm.trial_days)
        .bind(to_db(tm.created_at))
        .bind(to_db(tm.updated_at))
        .execute(self.pool)
        .await
        .context("Failed to save tenant module")?;
        Ok(())
    }

    /// Cancel a tenant's module rows; returns the number of rows changed
    pub async fn cancel_tenant_module(
        &self,
        tenant_id: Uuid,
        module_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tenant_modules
            SET status = 'CANCELLED', auto_renew = 0, updated_at = ?
            WHERE tenant_id = ? AND module_id = ?
            "#,
        )
        .bind(to_db(now))
        .bind(tenant_id.to_string())
        .bind(module_id.to_string())
        .execute(self.pool)
        .await
        .context("Failed to cancel tenant module")?;
        Ok(result.rows_affected())
    }

    /// Mark lapsed ACTIVE/TRIAL module and package rows as EXPIRED
    pub async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<u64> {
        let now = to_db(now);
        let modules = sqlx::query(
            r#"
            UPDATE tenant_modules SET status = 'EXPIRED', updated_at = ?
            WHERE status IN ('ACTIVE', 'TRIAL') AND expires_at IS NOT NULL AND expires_at < ?
            "#,
        )
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await
        .context("Failed to expire tenant modules")?;

        let packages = sqlx::query(
            r#"
            UPDATE tenant_packages SET status = 'EXPIRED', updated_at = ?
            WHERE status = 'ACTIVE' AND expires_at IS NOT NULL AND expires_at < ?
            "#,
        )
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await
        .context("Failed to expire tenant packages")?;

        Ok(modules.rows_affected() + packages.rows_affected())
    }

    /// Lapsed rows that the next expiry pass would touch
    pub async fn count_lapsed(&self, now: DateTime<Utc>) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM tenant_modules
            WHERE status IN ('ACTIVE', 'TRIAL') AND expires_at IS NOT NULL AND expires_at < ?
            "#,
        )
        .bind(to_db(now))
        .fetch_one(self.pool)
        .await
        .context("Failed to count lapsed modules")
    }

    pub async fn list_packages(&self) -> Result<Vec<Package>> {
        let rows = sqlx::query_as::<_, PackageRow>(
            "SELECT id, code, name, description, price, is_active FROM packages ORDER BY name",
        )
        .fetch_all(self.pool)
        .await
        .context("Failed to list packages")?;

        let mut packages = Vec::with_capacity(rows.len());
        for row in rows {
            let codes = self.package_module_codes(&row.id).await?;
            packages.push(row_to_package(row, codes));
        }
        Ok(packages)
    }

    pub async fn get_package_by_code(&self, code: &str) -> Result<Option<Package>> {
        let row = sqlx::query_as::<_, PackageRow>(
            "SELECT id, code, name, description, price, is_active FROM packages WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(self.pool)
        .await
        .context("Failed to get package")?;

        match row {
            Some(row) => {
                let codes = self.package_module_codes(&row.id).await?;
                Ok(Some(row_to_package(row, codes)))
            }
            None => Ok(None),
        }
    }

    async fn package_module_codes(&self, package_id: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT m.code FROM package_modules pm
            INNER JOIN modules m ON m.id = pm.module_id
            WHERE pm.package_id = ?
            ORDER BY m.code
            "#,
        )
        .bind(package_id)
        .fetch_all(self.pool)
        .await
        .context("Failed to load package modules")
    }

    /// Module codes reachable through the tenant's packages, with package state
    pub async fn package_grants(&self, tenant_id: Uuid) -> Result<Vec<PackageGrant>> {
        let rows = sqlx::query_as::<_, PackageGrantRow>(
            r#"
            SELECT m.code AS module_code, tp.status, tp.expires_at
            FROM tenant_packages tp
            INNER JOIN packages p ON p.id = tp.package_id AND p.is_active = 1
            INNER JOIN package_modules pm ON pm.package_id = p.id
            INNER JOIN modules m ON m.id = pm.module_id AND m.is_active = 1
            WHERE tp.tenant_id = ?
            "#,
        )
        .bind(tenant_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to load package grants")?;

        Ok(rows
            .into_iter()
            .map(|row| PackageGrant {
                module_code: row.module_code,
                status: parse_enum(&row.status, SubscriptionState::Cancelled),
                expires_at: row.expires_at.as_deref().and_then(parse_db_timestamp),
            })
            .collect())
    }

    pub async fn tenant_packages(&self, tenant_id: Uuid) -> Result<Vec<TenantPackage>> {
        let rows = sqlx::query_as::<_, TenantPackageRow>(
            r#"
            SELECT tp.id, tp.tenant_id, tp.package_id, p.code AS package_code, tp.status,
                   tp.activated_at, tp.expires_at
            FROM tenant_packages tp
            INNER JOIN packages p ON p.id = tp.package_id
            WHERE tp.tenant_id = ?
            ORDER BY p.code
            "#,
        )
        .bind(tenant_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to load tenant packages")?;

        Ok(rows.into_iter().map(row_to_tenant_package).collect())
    }

    pub async fn upsert_tenant_package(
        &self,
        tenant_id: Uuid,
        package_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenant_packages (id, tenant_id, package_id, status, activated_at,
                                         expires_at, created_at, updated_at)
            VALUES (?, ?, ?, 'ACTIVE', ?, ?, ?, ?)
            ON CONFLICT (tenant_id, package_id) DO UPDATE SET
                status = 'ACTIVE',
                activated_at = excluded.activated_at,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(tenant_id.to_string())
        .bind(package_id.to_string())
        .bind(to_db(now))
        .bind(expires_at.map(to_db))
        .bind(to_db(now))
        .bind(to_db(now))
        .execute(self.pool)
        .await
        .context("Failed to assign package")?;
        Ok(())
    }

    pub async fn cancel_tenant_package(
        &self,
        tenant_id: Uuid,
        package_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tenant_packages SET status = 'CANCELLED', updated_at = ?
            WHERE tenant_id = ? AND package_id = ? AND status != 'CANCELLED'
            "#,
        )
        .bind(to_db(now))
        .bind(tenant_id.to_string())
        .bind(package_id.to_string())
        .execute(self.pool)
        .await
        .context("Failed to cancel package")?;
        Ok(result.rows_affected())
    }
}

fn row_to_module(row: ModuleRow) -> Module {
    Module {
        id: parse_uuid(&row.id),
        code: row.code,
        name: row.name,
        description: row.description,
        category: row.category,
        price: parse_decimal(&row.price),
        billing_type: parse_enum(&row.billing_type, ModuleBillingType::Monthly),
        is_core: row.is_core,
        is_active: row.is_active,
    }
}

fn row_to_tenant_module(row: TenantModuleRow) -> TenantModule {
    TenantModule {
        id: parse_uuid(&row.id),
        tenant_id: parse_uuid(&row.tenant_id),
        module_id: parse_uuid(&row.module_id),
        module_code: row.module_code,
        status: parse_enum(&row.status, SubscriptionState::Cancelled),
        activated_at: parse_db_timestamp_or_epoch(&row.activated_at),
        expires_at: row.expires_at.as_deref().and_then(parse_db_timestamp),
        auto_renew: row.auto_renew,
        monthly_amount: parse_decimal(&row.monthly_amount),
        payment_status: parse_enum(&row.payment_status, PaymentStatus::Pending),
        is_trial_module: row.is_trial_module,
        trial_days: row.trial_days,
        created_at: parse_db_timestamp_or_epoch(&row.created_at),
        updated_at: parse_db_timestamp_or_epoch(&row.updated_at),
    }
}

fn row_to_package(row: PackageRow, module_codes: Vec<String>) -> Package {
    Package {
        id: parse_uuid(&row.id),
        code: row.code,
        name: row.name,
        description: row.description,
        price: parse_decimal(&row.price),
        is_active: row.is_active,
        module_codes,
    }
}

fn row_to_tenant_package(row: TenantPackageRow) -> TenantPackage {
    TenantPackage {
        id: parse_uuid(&row.id),
        tenant_id: parse_uuid(&row.tenant_id),
        package_id: parse_uuid(&row.package_id),
        package_code: row.package_code,
        status: parse_enum(&row.status, SubscriptionState::Cancelled),
        activated_at: parse_db_timestamp_or_epoch(&row.activated_at),
        expires_at: row.expires_at.as_deref().and_then(parse_db_timestamp),
    }
}
