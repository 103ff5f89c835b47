//! Distribution output models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One owner's (or an unallocated field's) share of a distributed bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DistributionLineItem {
    pub line_item_id: Uuid,
    pub period_id: Uuid,
    pub field_id: Uuid,
    /// `None` marks money of a field without ownership rows.
    pub owner_id: Option<Uuid>,
    pub basis_duration: Decimal,
    pub basis_area: Option<Decimal>,
    pub basis_weight: Decimal,
    pub share_percentage: Decimal,
    pub amount: Decimal,
    pub debt_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

/// Informational per-event breakdown of a distributed period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UsageSummary {
    pub summary_id: Uuid,
    pub period_id: Uuid,
    pub event_id: Uuid,
    pub overlap_minutes: Decimal,
    pub percentage: Decimal,
    pub amount: Decimal,
    pub created_utc: DateTime<Utc>,
}
