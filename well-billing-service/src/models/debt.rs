//! Owner debt model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Debt status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    Pending,
    Paid,
}

impl DebtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtStatus::Pending => "pending",
            DebtStatus::Paid => "paid",
        }
    }
}

/// Why a debt exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtReason {
    /// Owner's share of a distributed well bill.
    WellBill,
    /// Owner reimbursing the co-owner who paid the whole bill.
    WellBillPayment,
}

impl DebtReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtReason::WellBill => "well_bill",
            DebtReason::WellBillPayment => "well_bill_payment",
        }
    }
}

/// Debt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Debt {
    pub debt_id: Uuid,
    pub tenant_id: Uuid,
    pub period_id: Uuid,
    pub debtor_id: Uuid,
    pub creditor_id: Uuid,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub status: String,
    pub reason: String,
    pub paid_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}
