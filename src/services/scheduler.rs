//! Lifecycle sweep
//!
//! One pass expires lapsed module subscriptions, expires lapsed trials and
//! lifts elapsed temporary suspensions. It runs on an interval inside the
//! server, from the `run-lifecycle-sweep` binary, or on demand.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{error, info};

use crate::db::{DbPool, ModuleRepository, SuspensionRepository};
use crate::services::{EmailService, LifecycleService, ModuleService, SuspensionService};

/// Totals of one sweep pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    pub dry_run: bool,
    pub modules_expired: u64,
    pub trials_expired: usize,
    pub tenants_suspended: usize,
    pub users_cascaded: u64,
    pub suspensions_lifted: usize,
}

pub struct LifecycleSweeper {
    pool: DbPool,
    appeal_window_days: i64,
    email: Option<EmailService>,
}

impl LifecycleSweeper {
    pub fn new(pool: DbPool, appeal_window_days: i64, email: Option<EmailService>) -> Self {
        Self {
            pool,
            appeal_window_days,
            email,
        }
    }

    /// Run every step once; a dry run only counts what would change
    pub async fn run_once(&self, now: DateTime<Utc>, dry_run: bool) -> Result<SweepSummary> {
        let lifecycle = LifecycleService::new(self.pool.clone());

        if dry_run {
            let lapsed = ModuleRepository::new(&self.pool).count_lapsed(now).await?;
            let trials = lifecycle.find_expired_trials(now).await?;
            let suspensions = SuspensionRepository::new(&self.pool)
                .active_temporary()
                .await?
                .iter()
                .filter(|s| s.has_elapsed(now))
                .count();

            for user in &trials {
                info!(user_id = %user.id, "Would expire trial of {}", user.email);
            }

            return Ok(SweepSummary {
                dry_run: true,
                modules_expired: u64::try_from(lapsed).unwrap_or_default(),
                trials_expired: trials.len(),
                suspensions_lifted: suspensions,
                ..Default::default()
            });
        }

        let modules_expired = ModuleService::new(self.pool.clone())
            .expire_lapsed_modules(now)
            .await?;

        let report = lifecycle.run_trial_expiry_sweep(now).await?;
        if let Some(ref email) = self.email {
            for user in &report.expired_users {
                email.send_trial_expired(user).await;
            }
        }

        let suspensions_lifted = SuspensionService::new(self.pool.clone(), self.appeal_window_days)
            .reconcile_all(now)
            .await?;

        let summary = SweepSummary {
            dry_run: false,
            modules_expired,
            trials_expired: report.users_expired,
            tenants_suspended: report.tenants_suspended,
            users_cascaded: report.users_cascaded,
            suspensions_lifted,
        };
        info!(?summary, "Lifecycle sweep finished");
        Ok(summary)
    }
}

/// Handle to the background sweep task
#[derive(Clone)]
pub struct LifecycleSchedulerState {
    running: Arc<RwLock<bool>>,
}

impl LifecycleSchedulerState {
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        info!("Lifecycle scheduler stop requested");
    }
}

/// Spawn the interval task running [`LifecycleSweeper::run_once`]
pub fn start_lifecycle_scheduler(
    sweeper: LifecycleSweeper,
    every: Duration,
) -> LifecycleSchedulerState {
    let state = LifecycleSchedulerState {
        running: Arc::new(RwLock::new(true)),
    };

    let task_state = state.clone();
    tokio::spawn(async move {
        let mut interval_timer = interval(every);
        info!("Lifecycle sweep task started (interval: {}s)", every.as_secs());

        loop {
            interval_timer.tick().await;

            if !task_state.is_running().await {
                info!("Lifecycle sweep task stopping");
                break;
            }

            if let Err(e) = sweeper.run_once(Utc::now(), false).await {
                error!("Lifecycle sweep failed: {:#}", e);
            }
        }
    });

    state
}
