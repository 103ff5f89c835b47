//! Well model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A metered well whose electricity/water bill is apportioned per period.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Well {
    pub well_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}
