//! Authentication service
//!
//! Password hashing with Argon2, login, self-service registration and
//! e-mail verification.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::db::{tenant_repository, user_repository, UserRepository};
use crate::models::{
    LifecycleEvent, NewUser, RegisterRequest, Tenant, User, UserRole, UserStatus,
};
use crate::utils::time::parse_db_timestamp;
use crate::utils::validation::{normalize_email, password_problems, validate_phone};
use crate::utils::{AppError, AppResult};

/// Result of a successful registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    pub tenant: Tenant,
    /// Plain verification token; only its digest is stored
    pub verification_token: String,
}

/// Authentication service for user management
pub struct AuthService {
    pool: SqlitePool,
}

impl AuthService {
    /// Create a new auth service
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Hash a password using Argon2id
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();
        Ok(password_hash)
    }

    /// Verify a password against a hash
    pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(password_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Random one-time token, hex encoded
    pub fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Digest stored in place of a one-time token
    pub fn token_digest(token: &str) -> String {
        hex::encode(Sha256::digest(token.trim().as_bytes()))
    }

    /// Authenticate a user by e-mail and password
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let user = UserRepository::new(&self.pool)
            .get_by_email(&normalize_email(email))
            .await?;

        match user {
            Some(user) => {
                if Self::verify_password(password, &user.password_hash)? {
                    Ok(Some(user))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Check credentials and the account status, then record the login
    pub async fn login(&self, email: &str, password: &str, now: DateTime<Utc>) -> AppResult<User> {
        let user = self
            .authenticate(email, password)
            .await?
            .ok_or_else(|| AppError::unauthorized("Invalid e-mail or password"))?;

        if !user.status.can_login() {
            let message = match user.status {
                UserStatus::PendingApproval => "Your account is awaiting approval",
                UserStatus::Rejected => "Your registration was rejected",
                _ => "Your account is inactive",
            };
            return Err(AppError::forbidden(message));
        }

        UserRepository::new(&self.pool).record_login(user.id, now).await?;
        Ok(user)
    }

    /// Field-level validation of a registration request
    pub fn validate_registration(request: &RegisterRequest, password_min_length: usize) -> AppResult<()> {
        let mut fields: BTreeMap<String, Vec<String>> = match request.validate() {
            Err(errors) => match AppError::from(errors) {
                AppError::ValidationError { fields, .. } => fields,
                _ => BTreeMap::new(),
            },
            Ok(()) => BTreeMap::new(),
        };

        let problems = password_problems(&request.password, password_min_length);
        if !problems.is_empty() {
            fields.insert("password".to_string(), problems);
        }

        if let Some(phone) = request.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            if !validate_phone(phone) {
                fields
                    .entry("phone".to_string())
                    .or_default()
                    .push("Invalid phone number".to_string());
            }
        }

        if fields.is_empty() {
            Ok(())
        } else {
            Err(AppError::invalid_fields(fields))
        }
    }

    /// Create the tenant, its pending admin and a verification token in one transaction
    pub async fn register(
        &self,
        request: &RegisterRequest,
        config: &AppConfig,
        now: DateTime<Utc>,
    ) -> AppResult<Registration> {
        Self::validate_registration(request, config.auth.password_min_length)?;

        let email = normalize_email(&request.email);
        let users = UserRepository::new(&self.pool);
        if users.email_exists(&email).await? {
            return Err(AppError::conflict("An account with this e-mail already exists"));
        }

        let password_hash = Self::hash_password(&request.password)?;
        let token = Self::generate_token();
        let organization = request.organization_name.trim();

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let slug = tenant_repository::unique_slug(&mut *tx, organization).await?;
        let tenant = tenant_repository::insert(&mut *tx, organization, &slug, now).await?;

        let new_user = NewUser {
            tenant_id: Some(tenant.id),
            email,
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            phone: request
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from),
            password_hash,
            role: UserRole::TenantAdmin,
            status: UserStatus::PendingApproval,
            email_verified: false,
            trial_start_date: Some(now),
            trial_end_date: Some(now + Duration::days(config.trial.default_days)),
        };
        let user_id = user_repository::insert(&mut *tx, &new_user, now).await?;

        user_repository::insert_verification_token(
            &mut *tx,
            user_id,
            &Self::token_digest(&token),
            now + Duration::hours(config.auth.verification_token_hours),
            now,
        )
        .await?;

        let user = user_repository::get_by_id_conn(&mut *tx, user_id)
            .await?
            .ok_or_else(|| AppError::internal("Registered user vanished"))?;

        tx.commit().await.context("Failed to commit registration")?;

        info!(user_id = %user.id, tenant_id = %tenant.id, "Registered new organization {}", tenant.name);

        Ok(Registration {
            user,
            tenant,
            verification_token: token,
        })
    }

    /// Consume a verification token; activates the user unless approval is required
    pub async fn verify_email(
        &self,
        token: &str,
        require_admin_approval: bool,
        now: DateTime<Utc>,
    ) -> AppResult<User> {
        let invalid = || AppError::bad_request("Invalid or expired verification token");

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let stored = user_repository::find_verification_token(&mut *tx, &Self::token_digest(token))
            .await?
            .ok_or_else(invalid)?;

        if stored.consumed_at.is_some() {
            return Err(invalid());
        }
        let expired = parse_db_timestamp(&stored.expires_at).map_or(true, |expires| expires <= now);
        if expired {
            return Err(invalid());
        }
        if !user_repository::consume_verification_token(&mut *tx, &stored.id, now).await? {
            return Err(invalid());
        }

        let user_id = Uuid::parse_str(&stored.user_id).map_err(|_| invalid())?;
        let user = user_repository::get_by_id_conn(&mut *tx, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let status = if require_admin_approval {
            user.status
        } else {
            user.status
                .apply(LifecycleEvent::EmailVerified)
                .unwrap_or(user.status)
        };

        user_repository::mark_email_verified(&mut *tx, user.id, status, now).await?;
        let user = user_repository::get_by_id_conn(&mut *tx, user.id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        tx.commit().await.context("Failed to commit e-mail verification")?;

        info!(user_id = %user.id, status = %user.status, "E-mail verified");
        Ok(user)
    }

    /// Create the configured super admin when none exists yet
    pub async fn ensure_super_admin(&self, email: &str, password: &str) -> Result<Option<Uuid>> {
        let users = UserRepository::new(&self.pool);
        if users.any_super_admin().await? {
            return Ok(None);
        }

        let now = Utc::now();
        let new_user = NewUser {
            tenant_id: None,
            email: normalize_email(email),
            first_name: "Super".to_string(),
            last_name: "Admin".to_string(),
            phone: None,
            password_hash: Self::hash_password(password)?,
            role: UserRole::SuperAdmin,
            status: UserStatus::Active,
            email_verified: true,
            trial_start_date: None,
            trial_end_date: None,
        };

        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        let id = user_repository::insert(&mut *conn, &new_user, now).await?;
        info!(user_id = %id, "Created bootstrap super admin {}", new_user.email);
        Ok(Some(id))
    }
}
