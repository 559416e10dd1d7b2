//! Suspensions, their expiry and appeals

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::db::{suspension_repository, user_repository, SuspensionRepository};
use crate::models::{
    AppealStatus, LifecycleEvent, SuspendUserRequest, Suspension, SuspensionDuration, User,
    UserStatus,
};
use crate::utils::{AppError, AppResult};

pub struct SuspensionService {
    pool: SqlitePool,
    appeal_window_days: i64,
}

impl SuspensionService {
    pub fn new(pool: SqlitePool, appeal_window_days: i64) -> Self {
        Self {
            pool,
            appeal_window_days,
        }
    }

    /// Build the suspension record for a request, validating duration rules
    pub fn new_suspension(
        user_id: Uuid,
        actor_id: Uuid,
        request: &SuspendUserRequest,
        appeal_window_days: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Suspension> {
        request.validate()?;
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(AppError::invalid_field("reason", "A reason is required"));
        }

        let suspended_until = match request.duration_type {
            SuspensionDuration::Temporary => match request.duration_days {
                Some(days) if days > 0 => Some(now + Duration::days(days)),
                _ => {
                    return Err(AppError::invalid_field(
                        "duration_days",
                        "Temporary suspensions need a positive number of days",
                    ))
                }
            },
            SuspensionDuration::Permanent => None,
        };

        Ok(Suspension {
            id: Uuid::new_v4(),
            user_id,
            suspended_by: Some(actor_id),
            reason: reason.to_string(),
            duration_type: request.duration_type,
            suspended_until,
            can_appeal: request.can_appeal,
            appeal_deadline: request
                .can_appeal
                .then(|| now + Duration::days(appeal_window_days)),
            has_appealed: false,
            appeal_status: None,
            appeal_reason: None,
            appealed_at: None,
            appeal_reviewed_by: None,
            appeal_reviewed_at: None,
            appeal_review_note: None,
            is_active: true,
            lifted_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Suspend a user, replacing any suspension already in force
    pub async fn suspend_user(
        &self,
        user_id: Uuid,
        actor_id: Uuid,
        request: &SuspendUserRequest,
        now: DateTime<Utc>,
    ) -> AppResult<(User, Suspension)> {
        let suspension =
            Self::new_suspension(user_id, actor_id, request, self.appeal_window_days, now)?;

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let user = user_repository::get_by_id_conn(&mut *tx, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        let status = user.status.apply(LifecycleEvent::Suspend)?;

        suspension_repository::deactivate_active(&mut *tx, user_id, now).await?;
        suspension_repository::insert(&mut *tx, &suspension).await?;
        user_repository::set_status(&mut *tx, user_id, status, now).await?;

        tx.commit().await.context("Failed to commit suspension")?;

        info!(%user_id, %actor_id, duration = %suspension.duration_type, "Suspended user {}", user.email);
        Ok((User { status, ..user }, suspension))
    }

    async fn lift_elapsed(&self, suspension: &Suspension, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        if !suspension_repository::lift(&mut *tx, suspension.id, now).await? {
            return Ok(false);
        }
        if let Some(user) = user_repository::get_by_id_conn(&mut *tx, suspension.user_id).await? {
            if user.status == UserStatus::Suspended {
                let status = user.status.apply(LifecycleEvent::SuspensionLifted)?;
                user_repository::set_status(&mut *tx, user.id, status, now).await?;
            }
        }

        tx.commit().await.context("Failed to commit suspension expiry")?;
        info!(user_id = %suspension.user_id, suspension_id = %suspension.id, "Temporary suspension elapsed");
        Ok(true)
    }

    /// Lift the user's temporary suspension if its end has passed
    pub async fn reconcile_expiry(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let active = SuspensionRepository::new(&self.pool)
            .active_for_user(user_id)
            .await?;
        match active {
            Some(s) if s.has_elapsed(now) => self.lift_elapsed(&s, now).await,
            _ => Ok(false),
        }
    }

    /// Batch form of [`Self::reconcile_expiry`]; returns how many were lifted
    pub async fn reconcile_all(&self, now: DateTime<Utc>) -> Result<usize> {
        let elapsed: Vec<Suspension> = SuspensionRepository::new(&self.pool)
            .active_temporary()
            .await?
            .into_iter()
            .filter(|s| s.has_elapsed(now))
            .collect();

        let mut lifted = 0;
        for suspension in &elapsed {
            if self.lift_elapsed(suspension, now).await? {
                lifted += 1;
            }
        }
        Ok(lifted)
    }

    /// Active suspension of a user after reconciling expiry
    pub async fn current_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<Suspension>> {
        self.reconcile_expiry(user_id, now).await?;
        SuspensionRepository::new(&self.pool)
            .active_for_user(user_id)
            .await
    }

    pub async fn submit_appeal(
        &self,
        user_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Suspension> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::invalid_field("reason", "A reason is required"));
        }

        let repo = SuspensionRepository::new(&self.pool);
        let suspension = self
            .current_for_user(user_id, now)
            .await?
            .ok_or_else(|| AppError::not_found("No active suspension"))?;

        if !suspension.can_appeal {
            return Err(AppError::forbidden("This suspension cannot be appealed"));
        }
        if suspension.has_appealed {
            return Err(AppError::conflict("An appeal has already been submitted"));
        }
        if !suspension.appeal_open(now) {
            return Err(AppError::forbidden("The appeal window has closed"));
        }
        if !repo.record_appeal(suspension.id, reason, now).await? {
            return Err(AppError::conflict("An appeal has already been submitted"));
        }

        info!(%user_id, suspension_id = %suspension.id, "Appeal submitted");
        repo.get_by_id(suspension.id)
            .await?
            .ok_or_else(|| AppError::not_found("Suspension not found"))
    }

    pub async fn pending_appeals(&self) -> Result<Vec<Suspension>> {
        SuspensionRepository::new(&self.pool).pending_appeals().await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Suspension>> {
        SuspensionRepository::new(&self.pool).get_by_id(id).await
    }

    /// Approving lifts the suspension and reactivates the user
    pub async fn decide_appeal(
        &self,
        suspension_id: Uuid,
        reviewer: Uuid,
        approve: bool,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Suspension> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let suspension = suspension_repository::get_by_id_conn(&mut *tx, suspension_id)
            .await?
            .ok_or_else(|| AppError::not_found("Suspension not found"))?;
        if suspension.appeal_status != Some(AppealStatus::Pending) {
            return Err(AppError::conflict("There is no pending appeal for this suspension"));
        }

        let decision = if approve {
            AppealStatus::Approved
        } else {
            AppealStatus::Rejected
        };
        suspension_repository::record_decision(&mut *tx, suspension.id, decision, reviewer, note, now)
            .await?;

        if approve {
            suspension_repository::lift(&mut *tx, suspension.id, now).await?;
            if let Some(user) = user_repository::get_by_id_conn(&mut *tx, suspension.user_id).await? {
                if user.status == UserStatus::Suspended {
                    let status = user.status.apply(LifecycleEvent::SuspensionLifted)?;
                    user_repository::set_status(&mut *tx, user.id, status, now).await?;
                }
            }
        }

        let updated = suspension_repository::get_by_id_conn(&mut *tx, suspension.id)
            .await?
            .ok_or_else(|| AppError::not_found("Suspension not found"))?;
        tx.commit().await.context("Failed to commit appeal decision")?;

        info!(%suspension_id, %reviewer, decision = %decision, "Appeal decided");
        Ok(updated)
    }
}
