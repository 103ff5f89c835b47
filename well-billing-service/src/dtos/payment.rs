use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{validate_positive, BillingPeriodResponse};
use crate::models::{Debt, Payment, PaymentMethod, PaymentReceipt};

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub payer_id: Uuid,
    #[validate(custom(function = "validate_positive"))]
    pub amount: Decimal,
    pub payment_utc: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    #[validate(length(max = 1000, message = "Notes are too long"))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub message: String,
    pub payment: Payment,
    pub settled_debts: u64,
    pub reimbursement_debts: Vec<Debt>,
}

impl From<PaymentReceipt> for PaymentResponse {
    fn from(receipt: PaymentReceipt) -> Self {
        Self {
            message: "Payment recorded and debts updated".to_string(),
            payment: receipt.payment,
            settled_debts: receipt.settled_debts,
            reimbursement_debts: receipt.reimbursement_debts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReversePaymentResponse {
    pub message: String,
    pub period: BillingPeriodResponse,
}
