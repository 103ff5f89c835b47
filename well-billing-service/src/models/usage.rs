//! Irrigation usage event model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single metered irrigation run of a well.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageEvent {
    pub event_id: Uuid,
    pub well_id: Uuid,
    pub start_utc: DateTime<Utc>,
    pub duration_minutes: i32,
    #[sqlx(skip)]
    pub shares: Vec<FieldShare>,
}

/// Portion of a usage event's water attributed to one field.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FieldShare {
    pub event_id: Uuid,
    pub field_id: Uuid,
    /// 0-100.
    pub percentage: Decimal,
    pub actual_area: Option<Decimal>,
}

/// Input for recording a usage event together with its field shares.
#[derive(Debug, Clone)]
pub struct RecordUsageEvent {
    pub well_id: Uuid,
    pub start_utc: DateTime<Utc>,
    pub duration_minutes: i32,
    /// `(field_id, percentage, actual_area)`
    pub shares: Vec<(Uuid, Decimal, Option<Decimal>)>,
}
