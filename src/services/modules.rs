//! Module activation and package assignment
//!
//! [`plan_activation`] is the only place that decides what an activation
//! request does to a tenant's module row. The single-module endpoint and the
//! bulk assignment both go through it.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::db::{ModuleRepository, TenantRepository};
use crate::models::{
    is_core_code, ActivationOptions, Module, ModuleBillingType, PaymentStatus, SubscriptionState,
    TenantModule, TenantPackage,
};
use crate::utils::{AppError, AppResult};

/// Trial length when an activation asks for a trial without a duration
pub const DEFAULT_MODULE_TRIAL_DAYS: i64 = 30;

/// What an activation request resolves to
#[derive(Debug, Clone, PartialEq)]
pub enum ActivationPlan {
    /// Core modules need no row
    AlwaysGranted,
    /// The existing row already satisfies the request
    Unchanged(TenantModule),
    /// Insert or update this row
    Write(TenantModule),
}

/// Per-module result reported back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleOutcome {
    AlwaysGranted,
    AlreadyActive,
    Activated,
    Deactivated,
    NotAssigned,
}

fn add_months(ts: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    ts.checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Decide the new state of a tenant's module row
pub fn plan_activation(
    existing: Option<&TenantModule>,
    module: &Module,
    options: &ActivationOptions,
    now: DateTime<Utc>,
) -> ActivationPlan {
    if module.is_core || is_core_code(&module.code) {
        return ActivationPlan::AlwaysGranted;
    }

    if let Some(current) = existing {
        let satisfied = match current.status {
            SubscriptionState::Active => true,
            SubscriptionState::Trial => options.is_trial,
            _ => false,
        };
        if satisfied {
            return ActivationPlan::Unchanged(current.clone());
        }
    }

    let (status, expires_at, payment_status, amount, trial_days) = if options.is_trial {
        let days = options
            .trial_days
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_MODULE_TRIAL_DAYS);
        (
            SubscriptionState::Trial,
            Some(now + Duration::days(days)),
            PaymentStatus::Paid,
            Decimal::ZERO,
            Some(days),
        )
    } else {
        let expires_at = match module.billing_type {
            ModuleBillingType::Monthly => Some(add_months(now, 1)),
            ModuleBillingType::Yearly => Some(add_months(now, 12)),
            ModuleBillingType::OneTime | ModuleBillingType::Free => None,
        };
        (
            SubscriptionState::Active,
            expires_at,
            PaymentStatus::Pending,
            module.price,
            None,
        )
    };

    ActivationPlan::Write(TenantModule {
        id: existing.map(|e| e.id).unwrap_or_else(Uuid::new_v4),
        tenant_id: existing.map(|e| e.tenant_id).unwrap_or_default(),
        module_id: module.id,
        module_code: module.code.clone(),
        status,
        activated_at: now,
        expires_at,
        auto_renew: options.auto_renew,
        monthly_amount: amount,
        payment_status,
        is_trial_module: options.is_trial,
        trial_days,
        created_at: existing.map(|e| e.created_at).unwrap_or(now),
        updated_at: now,
    })
}

/// Tenant module and package management
#[derive(Clone)]
pub struct ModuleService {
    pool: SqlitePool,
}

impl ModuleService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn require_tenant(&self, tenant_id: Uuid) -> AppResult<()> {
        TenantRepository::new(&self.pool)
            .get_by_id(tenant_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::not_found(format!("Tenant {} not found", tenant_id)))
    }

    async fn require_module(&self, code: &str) -> AppResult<Module> {
        ModuleRepository::new(&self.pool)
            .get_by_code(code)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| AppError::not_found(format!("Module {} not found", code)))
    }

    pub async fn catalog(&self, include_inactive: bool) -> Result<Vec<Module>> {
        ModuleRepository::new(&self.pool)
            .list_catalog(include_inactive)
            .await
    }

    pub async fn tenant_modules(&self, tenant_id: Uuid) -> Result<Vec<TenantModule>> {
        ModuleRepository::new(&self.pool).tenant_modules(tenant_id).await
    }

    pub async fn all_tenant_modules(&self) -> Result<Vec<TenantModule>> {
        ModuleRepository::new(&self.pool).all_tenant_modules().await
    }

    pub async fn activate_module_for_tenant(
        &self,
        tenant_id: Uuid,
        code: &str,
        options: &ActivationOptions,
        now: DateTime<Utc>,
    ) -> AppResult<(ModuleOutcome, Option<TenantModule>)> {
        options.validate()?;
        self.require_tenant(tenant_id).await?;
        let module = self.require_module(code).await?;

        let repo = ModuleRepository::new(&self.pool);
        let existing = repo.find_tenant_module(tenant_id, module.id).await?;

        match plan_activation(existing.as_ref(), &module, options, now) {
            ActivationPlan::AlwaysGranted => Ok((ModuleOutcome::AlwaysGranted, None)),
            ActivationPlan::Unchanged(row) => Ok((ModuleOutcome::AlreadyActive, Some(row))),
            ActivationPlan::Write(mut row) => {
                row.tenant_id = tenant_id;
                repo.upsert_tenant_module(&row).await?;
                info!(%tenant_id, module = %module.code, status = %row.status, "Activated module");
                let saved = repo.find_tenant_module(tenant_id, module.id).await?;
                Ok((ModuleOutcome::Activated, saved.or(Some(row))))
            }
        }
    }

    /// Cancel every row for the module; returns the affected count
    pub async fn deactivate_module_for_tenant(
        &self,
        tenant_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        if is_core_code(code) {
            return Err(AppError::bad_request("Core modules cannot be removed"));
        }
        let module = ModuleRepository::new(&self.pool)
            .get_by_code(code)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Module {} not found", code)))?;
        if module.is_core {
            return Err(AppError::bad_request("Core modules cannot be removed"));
        }

        let affected = ModuleRepository::new(&self.pool)
            .cancel_tenant_module(tenant_id, module.id, now)
            .await?;
        info!(%tenant_id, module = %code, affected, "Deactivated module");
        Ok(affected)
    }

    /// Bulk enable/disable routed through the single-module operations
    pub async fn set_tenant_modules(
        &self,
        tenant_id: Uuid,
        modules: &BTreeMap<String, bool>,
        now: DateTime<Utc>,
    ) -> AppResult<BTreeMap<String, ModuleOutcome>> {
        self.require_tenant(tenant_id).await?;

        let mut outcomes = BTreeMap::new();
        for (code, enabled) in modules {
            let outcome = if *enabled {
                self.activate_module_for_tenant(tenant_id, code, &ActivationOptions::default(), now)
                    .await?
                    .0
            } else if is_core_code(code) {
                ModuleOutcome::AlwaysGranted
            } else {
                match self.deactivate_module_for_tenant(tenant_id, code, now).await? {
                    0 => ModuleOutcome::NotAssigned,
                    _ => ModuleOutcome::Deactivated,
                }
            };
            outcomes.insert(code.clone(), outcome);
        }
        Ok(outcomes)
    }

    /// Expire lapsed module and package rows
    pub async fn expire_lapsed_modules(&self, now: DateTime<Utc>) -> Result<u64> {
        let expired = ModuleRepository::new(&self.pool).expire_lapsed(now).await?;
        if expired > 0 {
            info!(expired, "Expired lapsed module subscriptions");
        }
        Ok(expired)
    }

    pub async fn assign_package(
        &self,
        tenant_id: Uuid,
        package_code: &str,
        months: Option<u32>,
        now: DateTime<Utc>,
    ) -> AppResult<TenantPackage> {
        self.require_tenant(tenant_id).await?;
        let repo = ModuleRepository::new(&self.pool);
        let package = repo
            .get_package_by_code(package_code)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::not_found(format!("Package {} not found", package_code)))?;

        let expires_at = months.filter(|m| *m > 0).map(|m| add_months(now, m));
        repo.upsert_tenant_package(tenant_id, package.id, expires_at, now)
            .await?;
        info!(%tenant_id, package = %package.code, "Assigned package");

        repo.tenant_packages(tenant_id)
            .await?
            .into_iter()
            .find(|tp| tp.package_id == package.id)
            .ok_or_else(|| AppError::internal("Assigned package not found"))
    }

    pub async fn cancel_package(
        &self,
        tenant_id: Uuid,
        package_code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let repo = ModuleRepository::new(&self.pool);
        let package = repo
            .get_package_by_code(package_code)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Package {} not found", package_code)))?;

        let affected = repo.cancel_tenant_package(tenant_id, package.id, now).await?;
        info!(%tenant_id, package = %package.code, affected, "Cancelled package");
        Ok(affected)
    }
}
