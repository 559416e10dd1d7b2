//! User model and lifecycle state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

text_enum! {
    /// User role
    pub enum UserRole {
        SuperAdmin => "SUPER_ADMIN",
        TenantAdmin => "TENANT_ADMIN",
        TenantUser => "TENANT_USER",
        User => "USER",
    }
}

text_enum! {
    /// User account status
    pub enum UserStatus {
        PendingApproval => "PENDING_APPROVAL",
        Active => "ACTIVE",
        Rejected => "REJECTED",
        Suspended => "SUSPENDED",
        TrialExpired => "TRIAL_EXPIRED",
        Inactive => "INACTIVE",
    }
}

/// Events that move a user between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Super or tenant admin approved the registration
    Approve,
    /// E-mail verified while admin approval is not required
    EmailVerified,
    Reject,
    TrialExpired,
    Suspend,
    /// Appeal approved or temporary suspension elapsed
    SuspensionLifted,
    PaymentCaptured,
    /// Trial end moved past now
    TrialExtended,
    TenantDeactivated,
    TenantReactivated,
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleEvent::Approve => "approve",
            LifecycleEvent::EmailVerified => "email verification",
            LifecycleEvent::Reject => "reject",
            LifecycleEvent::TrialExpired => "trial expiry",
            LifecycleEvent::Suspend => "suspend",
            LifecycleEvent::SuspensionLifted => "suspension lift",
            LifecycleEvent::PaymentCaptured => "payment",
            LifecycleEvent::TrialExtended => "trial extension",
            LifecycleEvent::TenantDeactivated => "tenant deactivation",
            LifecycleEvent::TenantReactivated => "tenant reactivation",
        };
        f.write_str(name)
    }
}

/// Illegal lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {event} to a user in status {from}")]
pub struct TransitionError {
    pub from: UserStatus,
    pub event: LifecycleEvent,
}

impl UserStatus {
    /// Apply a lifecycle event, returning the next status
    pub fn apply(self, event: LifecycleEvent) -> Result<UserStatus, TransitionError> {
        use LifecycleEvent as E;
        use UserStatus as S;

        let next = match (self, event) {
            (S::PendingApproval, E::Approve | E::EmailVerified) => S::Active,
            (S::PendingApproval, E::Reject) => S::Rejected,

            (S::Active, E::TrialExpired) => S::TrialExpired,
            (S::Active, E::Suspend) => S::Suspended,
            (S::Active, E::TenantDeactivated) => S::Inactive,
            (S::Active, E::PaymentCaptured | E::TrialExtended) => S::Active,

            (S::Suspended, E::SuspensionLifted) => S::Active,
            // A new suspension replaces the current one
            (S::Suspended, E::Suspend) => S::Suspended,

            (S::TrialExpired, E::PaymentCaptured | E::TrialExtended) => S::Active,
            (S::TrialExpired, E::Suspend) => S::Suspended,
            (S::TrialExpired | S::Inactive, E::TenantReactivated) => S::Active,
            (S::Inactive, E::PaymentCaptured) => S::Active,

            (from, event) => return Err(TransitionError { from, event }),
        };

        Ok(next)
    }

    /// Statuses allowed to sign in
    pub fn can_login(&self) -> bool {
        matches!(
            self,
            UserStatus::Active | UserStatus::TrialExpired | UserStatus::Suspended
        )
    }
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub email_verified: bool,
    pub trial_start_date: Option<DateTime<Utc>>,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub extra_trial_days: i64,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == UserRole::SuperAdmin
    }

    /// Days of trial left (zero once it has passed)
    pub fn trial_days_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.trial_end_date
            .map(|end| (end - now).num_days().max(0))
            .unwrap_or(0)
    }
}

/// Fields for inserting a user row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub email_verified: bool,
    pub trial_start_date: Option<DateTime<Utc>>,
    pub trial_end_date: Option<DateTime<Utc>>,
}

/// Registration request body
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "A valid e-mail address is required"))]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[validate(length(min = 2, max = 200, message = "Organization name is required"))]
    pub organization_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Tenant admin adding a user to their organization
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTenantUserRequest {
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "A valid e-mail address is required"))]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub password: String,
}
