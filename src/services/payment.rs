//! Simulated payment capture
//!
//! No money moves. Card details are checked for plausibility, one test card
//! is always declined, and a successful capture records the subscription and
//! reopens the account in a single transaction.

use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Datelike, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{tenant_repository, user_repository, UserRepository};
use crate::models::{
    CardDetails, LifecycleEvent, PaymentReceipt, PaymentRequest, SubscriptionStatus,
    TenantStatus, UserStatus, UserSubscription,
};
use crate::utils::{AppError, AppResult};

/// Test card number that the simulated processor always declines
pub const DECLINED_CARD: &str = "4000000000000002";

const DEFAULT_CURRENCY: &str = "USD";

/// Luhn checksum over a digit string
pub fn luhn_valid(digits: &str) -> bool {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

/// Card number with spaces and dashes removed
pub fn normalize_card_number(number: &str) -> String {
    number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Check a card for plausibility, reporting every problem per field
pub fn validate_card(card: &CardDetails, now: DateTime<Utc>) -> AppResult<()> {
    let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut fail = |field: &str, msg: &str| {
        fields
            .entry(field.to_string())
            .or_default()
            .push(msg.to_string());
    };

    let number = normalize_card_number(&card.number);
    if !(13..=19).contains(&number.len()) || !number.chars().all(|c| c.is_ascii_digit()) {
        fail("card.number", "Card number must be 13 to 19 digits");
    } else if !luhn_valid(&number) {
        fail("card.number", "Card number is invalid");
    }

    if card.holder_name.trim().is_empty() {
        fail("card.holder_name", "Card holder name is required");
    }

    if !(1..=12).contains(&card.expiry_month) {
        fail("card.expiry_month", "Expiry month must be between 1 and 12");
    } else if (card.expiry_year, card.expiry_month) < (now.year(), now.month()) {
        fail("card.expiry_year", "Card has expired");
    }

    let cvv = card.cvv.trim();
    if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
        fail("card.cvv", "CVV must be 3 or 4 digits");
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(AppError::invalid_fields(fields))
    }
}

fn payment_reference() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("PAY-{}", &id[..12])
}

pub struct PaymentService {
    pool: SqlitePool,
}

impl PaymentService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn active_subscription(&self, user_id: Uuid) -> anyhow::Result<Option<UserSubscription>> {
        UserRepository::new(&self.pool).active_subscription(user_id).await
    }

    /// Capture a plan payment for `user_id`
    pub async fn process_payment(
        &self,
        user_id: Uuid,
        request: &PaymentRequest,
        now: DateTime<Utc>,
    ) -> AppResult<PaymentReceipt> {
        let amount = request
            .plan
            .price_for(request.billing_period)
            .ok_or_else(|| AppError::invalid_field("plan", "The free plan needs no payment"))?;
        validate_card(&request.card, now)?;

        let number = normalize_card_number(&request.card.number);
        if number == DECLINED_CARD {
            warn!(%user_id, "Simulated processor declined card");
            return Err(AppError::PaymentDeclined("The card was declined".to_string()));
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let user = user_repository::get_by_id_conn(&mut *tx, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        let status = user.status.apply(LifecycleEvent::PaymentCaptured)?;

        let tenant = match user.tenant_id {
            Some(tenant_id) => tenant_repository::get_by_id_conn(&mut *tx, tenant_id).await?,
            None => None,
        };
        let currency = tenant
            .as_ref()
            .map(|t| t.settings.currency.clone())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let base = user.trial_end_date.map_or(now, |end| end.max(now));
        let paid_until = base + request.billing_period.duration();

        let subscription = UserSubscription {
            id: Uuid::new_v4(),
            user_id,
            tenant_id: user.tenant_id,
            plan: request.plan,
            billing_period: request.billing_period,
            amount,
            currency,
            status: SubscriptionStatus::Active,
            payment_reference: payment_reference(),
            card_last4: number[number.len() - 4..].to_string(),
            starts_at: now,
            ends_at: paid_until,
            created_at: now,
        };

        user_repository::replace_active_subscription(&mut *tx, user_id).await?;
        user_repository::insert_subscription(&mut *tx, &subscription).await?;
        user_repository::update_trial(
            &mut *tx,
            user_id,
            paid_until,
            user.extra_trial_days,
            status,
            now,
        )
        .await?;

        if let Some(mut tenant) = tenant {
            tenant.status = TenantStatus::Active;
            tenant.plan = request.plan;
            tenant_repository::save(&mut *tx, &tenant, now).await?;
            user_repository::cascade_tenant_status(
                &mut *tx,
                tenant.id,
                &[UserStatus::TrialExpired, UserStatus::Inactive],
                UserStatus::Active,
                Some(user_id),
                now,
            )
            .await?;
        }

        tx.commit().await.context("Failed to commit payment")?;

        info!(
            %user_id,
            plan = %subscription.plan,
            amount = %subscription.amount,
            reference = %subscription.payment_reference,
            "Payment captured"
        );

        Ok(PaymentReceipt {
            subscription,
            trial_end_date: paid_until,
        })
    }
}
