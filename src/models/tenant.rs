//! Tenant (organization) model

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    /// Tenant account status
    pub enum TenantStatus {
        Trial => "TRIAL",
        Active => "ACTIVE",
        Suspended => "SUSPENDED",
        Cancelled => "CANCELLED",
    }
}

impl TenantStatus {
    /// Whether users of a tenant in this status may be active
    pub fn is_operational(&self) -> bool {
        matches!(self, TenantStatus::Trial | TenantStatus::Active)
    }
}

text_enum! {
    /// Commercial plan
    pub enum PlanTier {
        Free => "FREE",
        Basic => "BASIC",
        Professional => "PROFESSIONAL",
        Enterprise => "ENTERPRISE",
    }
}

text_enum! {
    /// Subscription billing period
    pub enum BillingPeriod {
        Monthly => "MONTHLY",
        Yearly => "YEARLY",
    }
}

impl BillingPeriod {
    /// Access granted by one payment
    pub fn duration(&self) -> Duration {
        match self {
            BillingPeriod::Monthly => Duration::days(30),
            BillingPeriod::Yearly => Duration::days(365),
        }
    }
}

impl PlanTier {
    /// Monthly list price; `None` for the free plan
    pub fn monthly_price(&self) -> Option<Decimal> {
        match self {
            PlanTier::Free => None,
            PlanTier::Basic => Some(Decimal::new(9900, 2)),
            PlanTier::Professional => Some(Decimal::new(24900, 2)),
            PlanTier::Enterprise => Some(Decimal::new(49900, 2)),
        }
    }

    /// Price charged for one billing period (yearly is ten months)
    pub fn price_for(&self, period: BillingPeriod) -> Option<Decimal> {
        let monthly = self.monthly_price()?;
        Some(match period {
            BillingPeriod::Monthly => monthly,
            BillingPeriod::Yearly => monthly * Decimal::from(10),
        })
    }
}

/// Per-tenant preferences
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TenantSettings {
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            timezone: default_timezone(),
            currency: default_currency(),
        }
    }
}

/// Per-tenant quotas; `None` means unlimited
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TenantLimits {
    #[serde(default)]
    pub max_users: Option<u32>,
    #[serde(default)]
    pub max_current_accounts: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub status: TenantStatus,
    pub plan: PlanTier,
    pub settings: TenantSettings,
    pub limits: TenantLimits,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tenant row with aggregate counts for the super-admin overview
#[derive(Debug, Clone, Serialize)]
pub struct TenantOverview {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub user_count: i64,
    pub active_user_count: i64,
    pub active_module_count: i64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateTenantRequest {
    pub status: Option<TenantStatus>,
    pub plan: Option<PlanTier>,
    pub limits: Option<TenantLimits>,
    pub settings: Option<TenantSettings>,
}
