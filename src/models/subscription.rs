//! Paid subscriptions and payment requests

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BillingPeriod, PlanTier};

text_enum! {
    pub enum SubscriptionStatus {
        Active => "ACTIVE",
        /// Superseded by a later payment
        Replaced => "REPLACED",
        Cancelled => "CANCELLED",
    }
}

/// A captured plan payment. At most one `ACTIVE` row exists per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub plan: PlanTier,
    pub billing_period: BillingPeriod,
    pub amount: Decimal,
    pub currency: String,
    pub status: SubscriptionStatus,
    pub payment_reference: String,
    pub card_last4: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Card details for the simulated processor
#[derive(Debug, Clone, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub holder_name: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
    pub cvv: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub plan: PlanTier,
    pub billing_period: BillingPeriod,
    pub card: CardDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub subscription: UserSubscription,
    pub trial_end_date: DateTime<Utc>,
}
