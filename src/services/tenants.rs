//! Tenant self-service and overview

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;
use validator::Validate;

use crate::db::{user_repository, TenantRepository, UserRepository};
use crate::models::{
    CreateTenantUserRequest, NewUser, Tenant, TenantOverview, User, UserRole, UserStatus,
};
use crate::services::AuthService;
use crate::utils::validation::{normalize_email, password_problems};
use crate::utils::{AppError, AppResult};

pub struct TenantService {
    pool: SqlitePool,
}

impl TenantService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, tenant_id: uuid::Uuid) -> AppResult<Tenant> {
        TenantRepository::new(&self.pool)
            .get_by_id(tenant_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Tenant {} not found", tenant_id)))
    }

    pub async fn overview(&self, now: DateTime<Utc>) -> Result<Vec<TenantOverview>> {
        TenantRepository::new(&self.pool).list_overview(now).await
    }

    pub async fn users(&self, tenant_id: uuid::Uuid) -> Result<Vec<User>> {
        UserRepository::new(&self.pool).list_by_tenant(tenant_id).await
    }

    /// Add an active tenant user sharing the admin's trial window
    pub async fn add_user(
        &self,
        admin: &User,
        request: &CreateTenantUserRequest,
        password_min_length: usize,
        now: DateTime<Utc>,
    ) -> AppResult<User> {
        let tenant_id = admin
            .tenant_id
            .ok_or_else(|| AppError::forbidden("You do not belong to an organization"))?;

        request.validate()?;
        let problems = password_problems(&request.password, password_min_length);
        if !problems.is_empty() {
            return Err(AppError::invalid_fields(
                [("password".to_string(), problems)].into_iter().collect(),
            ));
        }

        let tenant = self.get(tenant_id).await?;
        let users = UserRepository::new(&self.pool);
        if let Some(max) = tenant.limits.max_users {
            if users.count_by_tenant(tenant_id).await? >= i64::from(max) {
                return Err(AppError::forbidden(format!("User limit of {} reached", max)));
            }
        }

        let email = normalize_email(&request.email);
        if users.email_exists(&email).await? {
            return Err(AppError::conflict("An account with this e-mail already exists"));
        }

        let new_user = NewUser {
            tenant_id: Some(tenant_id),
            email,
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            phone: request.phone.clone().filter(|p| !p.trim().is_empty()),
            password_hash: AuthService::hash_password(&request.password)?,
            role: UserRole::TenantUser,
            status: UserStatus::Active,
            email_verified: true,
            trial_start_date: admin.trial_start_date,
            trial_end_date: admin.trial_end_date,
        };

        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        let id = user_repository::insert(&mut *conn, &new_user, now).await?;
        let user = user_repository::get_by_id_conn(&mut *conn, id)
            .await?
            .ok_or_else(|| AppError::internal("Created user vanished"))?;

        info!(%tenant_id, user_id = %user.id, "Added tenant user {}", user.email);
        Ok(user)
    }
}
