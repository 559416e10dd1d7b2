//! User and tenant lifecycle
//!
//! Every status change goes through [`UserStatus::apply`]; the service adds
//! the side effects on the owning tenant and its other users, each inside a
//! single database transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{tenant_repository, user_repository, UserRepository};
use crate::models::{
    LifecycleEvent, PlanTier, Tenant, TenantStatus, UpdateTenantRequest, User, UserRole,
    UserStatus,
};
use crate::utils::{AppError, AppResult};

/// Longest single trial extension
pub const MAX_TRIAL_EXTENSION_DAYS: i64 = 365;

/// The user performing an administrative action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: UserRole,
    pub tenant_id: Option<Uuid>,
}

/// Super admins act on anyone but other super admins; tenant admins act on
/// users of their own tenant other than themselves.
pub fn authorize_admin_action(actor: &Actor, target: &User) -> AppResult<()> {
    match actor.role {
        UserRole::SuperAdmin if !target.is_super_admin() => Ok(()),
        UserRole::SuperAdmin => Err(AppError::forbidden(
            "Super admin accounts cannot be managed here",
        )),
        UserRole::TenantAdmin => {
            if target.id == actor.id {
                Err(AppError::forbidden("You cannot perform this action on yourself"))
            } else if actor.tenant_id.is_none() || target.tenant_id != actor.tenant_id {
                Err(AppError::forbidden("User belongs to another organization"))
            } else if target.is_super_admin() {
                Err(AppError::forbidden("Super admin accounts cannot be managed here"))
            } else {
                Ok(())
            }
        }
        _ => Err(AppError::forbidden("Administrator role required")),
    }
}

/// Outcome of one trial-expiry pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub users_expired: usize,
    pub tenants_suspended: usize,
    pub users_cascaded: u64,
    #[serde(skip)]
    pub expired_users: Vec<User>,
}

/// Status a tenant returns to when it becomes operational again
fn reactivated_tenant_status(tenant: &Tenant) -> TenantStatus {
    if tenant.plan == PlanTier::Free {
        TenantStatus::Trial
    } else {
        TenantStatus::Active
    }
}

pub struct LifecycleService {
    pool: SqlitePool,
}

impl LifecycleService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Approve a pending registration; reopens the registrant's tenant if needed
    pub async fn approve_user(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<User> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let user = user_repository::get_by_id_conn(&mut *tx, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        let status = user.status.apply(LifecycleEvent::Approve)?;
        user_repository::set_status(&mut *tx, user.id, status, now).await?;

        if user.role == UserRole::TenantAdmin {
            if let Some(tenant_id) = user.tenant_id {
                if let Some(tenant) = tenant_repository::get_by_id_conn(&mut *tx, tenant_id).await? {
                    if !tenant.status.is_operational() {
                        let reopened = reactivated_tenant_status(&tenant);
                        tenant_repository::set_status(&mut *tx, tenant.id, reopened, now).await?;
                        info!(%tenant_id, status = %reopened, "Reopened tenant on approval");
                    }
                }
            }
        }

        let user = user_repository::get_by_id_conn(&mut *tx, user.id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        tx.commit().await.context("Failed to commit approval")?;

        info!(user_id = %user.id, "Approved user {}", user.email);
        Ok(user)
    }

    /// Reject a pending registration; a rejected tenant admin cancels the tenant
    pub async fn reject_user(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<User> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let user = user_repository::get_by_id_conn(&mut *tx, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        let status = user.status.apply(LifecycleEvent::Reject)?;
        user_repository::set_status(&mut *tx, user.id, status, now).await?;

        if user.role == UserRole::TenantAdmin {
            if let Some(tenant_id) = user.tenant_id {
                tenant_repository::set_status(&mut *tx, tenant_id, TenantStatus::Cancelled, now)
                    .await?;
            }
        }

        let user = user_repository::get_by_id_conn(&mut *tx, user.id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        tx.commit().await.context("Failed to commit rejection")?;

        info!(user_id = %user.id, "Rejected user {}", user.email);
        Ok(user)
    }

    /// Active users whose trial ended
    ///
    /// The tenant's own status is not consulted; a captured payment moves the
    /// user's `trial_end_date` forward instead.
    pub async fn find_expired_trials(&self, now: DateTime<Utc>) -> Result<Vec<User>> {
        let candidates = UserRepository::new(&self.pool).list_active_with_trial().await?;
        Ok(candidates
            .into_iter()
            .filter(|user| user.trial_end_date.is_some_and(|end| end < now))
            .collect())
    }

    /// Expire lapsed trials, suspending the tenant and its other active users
    pub async fn run_trial_expiry_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let candidates = self.find_expired_trials(now).await?;
        let mut report = SweepReport {
            checked: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

            // Re-read inside the transaction; an earlier cascade may have moved it
            let Some(user) = user_repository::get_by_id_conn(&mut *tx, candidate.id).await? else {
                continue;
            };
            let Ok(status) = user.status.apply(LifecycleEvent::TrialExpired) else {
                continue;
            };
            user_repository::set_status(&mut *tx, user.id, status, now).await?;

            if let Some(tenant_id) = user.tenant_id {
                let changed =
                    tenant_repository::set_status(&mut *tx, tenant_id, TenantStatus::Suspended, now)
                        .await?;
                if changed > 0 {
                    report.tenants_suspended += 1;
                }
                report.users_cascaded += user_repository::cascade_tenant_status(
                    &mut *tx,
                    tenant_id,
                    &[UserStatus::Active],
                    UserStatus::TrialExpired,
                    Some(user.id),
                    now,
                )
                .await?;
            }

            tx.commit().await.context("Failed to commit trial expiry")?;

            info!(user_id = %user.id, tenant_id = ?user.tenant_id, "Trial expired for {}", user.email);
            report.users_expired += 1;
            report.expired_users.push(User { status, ..user });
        }

        Ok(report)
    }

    /// Push a user's trial end out by `days`
    pub async fn extend_trial(&self, user_id: Uuid, days: i64, now: DateTime<Utc>) -> AppResult<User> {
        if days <= 0 || days > MAX_TRIAL_EXTENSION_DAYS {
            return Err(AppError::invalid_field(
                "days",
                format!("Must be between 1 and {}", MAX_TRIAL_EXTENSION_DAYS),
            ));
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let user = user_repository::get_by_id_conn(&mut *tx, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let new_end = user.trial_end_date.unwrap_or(now) + Duration::days(days);
        let status = if user.status == UserStatus::TrialExpired && new_end > now {
            user.status.apply(LifecycleEvent::TrialExtended)?
        } else {
            user.status
        };

        user_repository::update_trial(
            &mut *tx,
            user.id,
            new_end,
            user.extra_trial_days + days,
            status,
            now,
        )
        .await?;

        let reactivated = user.status == UserStatus::TrialExpired && status == UserStatus::Active;
        if let (true, Some(tenant_id)) = (reactivated, user.tenant_id) {
            if let Some(tenant) = tenant_repository::get_by_id_conn(&mut *tx, tenant_id).await? {
                if tenant.status == TenantStatus::Suspended {
                    let reopened = reactivated_tenant_status(&tenant);
                    tenant_repository::set_status(&mut *tx, tenant_id, reopened, now).await?;
                    let cascaded = user_repository::cascade_tenant_status(
                        &mut *tx,
                        tenant_id,
                        &[UserStatus::TrialExpired],
                        UserStatus::Active,
                        Some(user.id),
                        now,
                    )
                    .await?;
                    info!(%tenant_id, cascaded, status = %reopened, "Tenant reopened by trial extension");
                }
            }
        }

        let user = user_repository::get_by_id_conn(&mut *tx, user.id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        tx.commit().await.context("Failed to commit trial extension")?;

        info!(user_id = %user.id, days, status = %user.status, "Extended trial");
        Ok(user)
    }

    /// Edit a tenant and cascade operational changes to its users
    pub async fn update_tenant(
        &self,
        tenant_id: Uuid,
        request: &UpdateTenantRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Tenant> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let mut tenant = tenant_repository::get_by_id_conn(&mut *tx, tenant_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Tenant {} not found", tenant_id)))?;
        let was_operational = tenant.status.is_operational();

        if let Some(status) = request.status {
            tenant.status = status;
        }
        if let Some(plan) = request.plan {
            tenant.plan = plan;
        }
        if let Some(ref limits) = request.limits {
            tenant.limits = limits.clone();
        }
        if let Some(ref settings) = request.settings {
            tenant.settings = settings.clone();
        }
        tenant_repository::save(&mut *tx, &tenant, now).await?;

        let is_operational = tenant.status.is_operational();
        let cascaded = match (was_operational, is_operational) {
            (true, false) => {
                user_repository::cascade_tenant_status(
                    &mut *tx,
                    tenant_id,
                    &[UserStatus::Active],
                    UserStatus::Inactive,
                    None,
                    now,
                )
                .await?
            }
            (false, true) => {
                user_repository::cascade_tenant_status(
                    &mut *tx,
                    tenant_id,
                    &[UserStatus::Inactive, UserStatus::TrialExpired],
                    UserStatus::Active,
                    None,
                    now,
                )
                .await?
            }
            _ => 0,
        };

        tx.commit().await.context("Failed to commit tenant update")?;

        if cascaded > 0 {
            info!(%tenant_id, status = %tenant.status, cascaded, "Cascaded tenant status to users");
        } else if was_operational != is_operational {
            warn!(%tenant_id, status = %tenant.status, "Tenant status changed with no users to update");
        }

        tenant.updated_at = now;
        Ok(tenant)
    }
}
