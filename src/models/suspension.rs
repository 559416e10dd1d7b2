//! Suspension records and appeals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

text_enum! {
    pub enum SuspensionDuration {
        Temporary => "TEMPORARY",
        Permanent => "PERMANENT",
    }
}

text_enum! {
    pub enum AppealStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suspension {
    pub id: Uuid,
    pub user_id: Uuid,
    pub suspended_by: Option<Uuid>,
    pub reason: String,
    pub duration_type: SuspensionDuration,
    pub suspended_until: Option<DateTime<Utc>>,
    pub can_appeal: bool,
    pub appeal_deadline: Option<DateTime<Utc>>,
    pub has_appealed: bool,
    pub appeal_status: Option<AppealStatus>,
    pub appeal_reason: Option<String>,
    pub appealed_at: Option<DateTime<Utc>>,
    pub appeal_reviewed_by: Option<Uuid>,
    pub appeal_reviewed_at: Option<DateTime<Utc>>,
    pub appeal_review_note: Option<String>,
    pub is_active: bool,
    pub lifted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Suspension {
    /// A temporary suspension whose end has passed
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.duration_type == SuspensionDuration::Temporary
            && self.suspended_until.is_some_and(|until| until < now)
    }

    /// Whether the suspended user may still file an appeal
    pub fn appeal_open(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.can_appeal
            && !self.has_appealed
            && self.appeal_deadline.map_or(true, |deadline| now <= deadline)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SuspendUserRequest {
    pub reason: String,
    pub duration_type: SuspensionDuration,
    /// Required for temporary suspensions, at most ten years
    #[serde(default)]
    #[validate(range(min = 1, max = 3650, message = "Must be between 1 and 3650 days"))]
    pub duration_days: Option<i64>,
    #[serde(default = "default_can_appeal")]
    pub can_appeal: bool,
}

fn default_can_appeal() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppealRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppealDecisionRequest {
    pub approve: bool,
    #[serde(default)]
    pub note: Option<String>,
}
