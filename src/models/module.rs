//! Module catalog, tenant module subscriptions and packages

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Code prefix of modules every tenant receives
pub const CORE_MODULE_PREFIX: &str = "CORE_";

/// Module gating the current-account ledger
pub const ACCOUNTING_MODULE: &str = "ACCOUNTING";

pub fn is_core_code(code: &str) -> bool {
    code.starts_with(CORE_MODULE_PREFIX)
}

text_enum! {
    pub enum ModuleBillingType {
        Monthly => "MONTHLY",
        Yearly => "YEARLY",
        OneTime => "ONE_TIME",
        Free => "FREE",
    }
}

text_enum! {
    /// Status of a tenant's module or package subscription
    pub enum SubscriptionState {
        Active => "ACTIVE",
        Trial => "TRIAL",
        Cancelled => "CANCELLED",
        Expired => "EXPIRED",
        Suspended => "SUSPENDED",
    }
}

impl SubscriptionState {
    pub fn grants_access(&self) -> bool {
        matches!(self, SubscriptionState::Active | SubscriptionState::Trial)
    }
}

text_enum! {
    pub enum PaymentStatus {
        Paid => "PAID",
        Pending => "PENDING",
        Failed => "FAILED",
    }
}

/// Catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: Decimal,
    pub billing_type: ModuleBillingType,
    pub is_core: bool,
    pub is_active: bool,
}

/// One tenant's subscription to one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantModule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub module_id: Uuid,
    pub module_code: String,
    pub status: SubscriptionState,
    pub activated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub monthly_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub is_trial_module: bool,
    pub trial_days: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantModule {
    /// Whether this row grants access at `now`
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.status.grants_access() && self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// Options for activating a module
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ActivationOptions {
    #[serde(default)]
    pub is_trial: bool,
    /// Trial length; the default applies when omitted
    #[serde(default)]
    #[validate(range(min = 1, max = 365, message = "Must be between 1 and 365 days"))]
    pub trial_days: Option<i64>,
    #[serde(default)]
    pub auto_renew: bool,
}

/// Bundle of modules sold together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub is_active: bool,
    pub module_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantPackage {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub package_id: Uuid,
    pub package_code: String,
    pub status: SubscriptionState,
    pub activated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Package membership of an active tenant package, as read for resolution
#[derive(Debug, Clone)]
pub struct PackageGrant {
    pub module_code: String,
    pub status: SubscriptionState,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleAssignmentRequest {
    pub tenant_id: Uuid,
    pub module_code: String,
    #[serde(flatten)]
    pub options: ActivationOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleRemovalRequest {
    pub tenant_id: Uuid,
    pub module_code: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PackageAssignmentRequest {
    pub tenant_id: Uuid,
    pub package_code: String,
    /// Validity in months; open-ended when omitted
    #[serde(default)]
    #[validate(range(min = 1, max = 120, message = "Must be between 1 and 120 months"))]
    pub months: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageRemovalRequest {
    pub tenant_id: Uuid,
    pub package_code: String,
}
