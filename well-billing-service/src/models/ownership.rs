//! Field ownership model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Fractional ownership of a field. Rows of one field are expected, not
/// required, to sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FieldOwnership {
    pub field_id: Uuid,
    pub owner_id: Uuid,
    pub percentage: Decimal,
}
