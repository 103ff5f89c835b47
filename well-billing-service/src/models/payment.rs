//! Billing period payment model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Debt;

/// Payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Card,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Card => "card",
            PaymentMethod::Other => "other",
        }
    }
}

/// A payment settling a whole distributed period.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub tenant_id: Uuid,
    pub period_id: Uuid,
    pub payer_id: Uuid,
    pub recorded_by: Uuid,
    pub amount: Decimal,
    pub payment_utc: DateTime<Utc>,
    pub payment_method: String,
    pub notes: Option<String>,
    pub reversed_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub tenant_id: Uuid,
    pub period_id: Uuid,
    pub payer_id: Uuid,
    pub recorded_by: Uuid,
    pub amount: Decimal,
    pub payment_utc: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

/// Result of recording a payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub settled_debts: u64,
    pub reimbursement_debts: Vec<Debt>,
}
