//! Test fixtures
//!
//! Request bodies shared by the integration tests.

use chrono::{Datelike, Utc};
use serde_json::{json, Value};

/// Satisfies every password rule
pub const STRONG_PASSWORD: &str = "Str0ng!Passw0rd";

/// Luhn-valid card that the simulated gateway accepts
pub const VALID_CARD: &str = "4242424242424242";

/// Luhn-valid card that the simulated gateway always declines
pub const DECLINED_CARD: &str = "4000000000000002";

pub fn register_payload(email: &str) -> Value {
    json!({
        "first_name": "Ada",
        "last_name": "Lovelace",
        "email": email,
        "phone": "+1 555 0100",
        "organization_name": "Lovelace Family Clinic",
        "password": STRONG_PASSWORD
    })
}

pub fn card_payload(number: &str) -> Value {
    json!({
        "number": number,
        "holder_name": "Ada Lovelace",
        "expiry_month": 12,
        "expiry_year": Utc::now().year() + 2,
        "cvv": "123"
    })
}

pub fn payment_payload(plan: &str, billing_period: &str, card: &str) -> Value {
    json!({
        "plan": plan,
        "billing_period": billing_period,
        "card": card_payload(card)
    })
}

pub fn customer_account_payload(name: &str) -> Value {
    json!({
        "name": name,
        "account_type": "CUSTOMER",
        "email": "billing@example.com"
    })
}

pub fn transaction_payload(document_type: &str, debit: &str, credit: &str) -> Value {
    json!({
        "document_type": document_type,
        "description": format!("{} posting", document_type.to_lowercase()),
        "debit_amount": debit,
        "credit_amount": credit
    })
}
