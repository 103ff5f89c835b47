//! Billing period model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Billing period status.
///
/// `Distributing` is the persisted claim held while a distribution run is in
/// flight; it is released back to `Pending` when the run does not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriodStatus {
    Pending,
    Distributing,
    Distributed,
    Paid,
}

impl BillingPeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriodStatus::Pending => "pending",
            BillingPeriodStatus::Distributing => "distributing",
            BillingPeriodStatus::Distributed => "distributed",
            BillingPeriodStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "distributing" => BillingPeriodStatus::Distributing,
            "distributed" => BillingPeriodStatus::Distributed,
            "paid" => BillingPeriodStatus::Paid,
            _ => BillingPeriodStatus::Pending,
        }
    }
}

/// Billing period of a well. `end_utc` is exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BillingPeriod {
    pub period_id: Uuid,
    pub tenant_id: Uuid,
    pub well_id: Uuid,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub total_amount: Option<Decimal>,
    pub status: String,
    pub payment_due_date: Option<NaiveDate>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub version: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl BillingPeriod {
    pub fn status(&self) -> BillingPeriodStatus {
        BillingPeriodStatus::from_string(&self.status)
    }

    pub fn invoice_meta(&self) -> InvoiceMeta {
        InvoiceMeta {
            invoice_number: self.invoice_number.clone(),
            invoice_date: self.invoice_date,
        }
    }
}

/// Externally supplied invoice metadata, stored and echoed back as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceMeta {
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
}

/// Input for creating a billing period.
#[derive(Debug, Clone)]
pub struct CreateBillingPeriod {
    pub tenant_id: Uuid,
    pub well_id: Uuid,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub payment_due_date: Option<NaiveDate>,
}

/// Filter parameters for listing billing periods.
#[derive(Debug, Clone, Default)]
pub struct ListBillingPeriodsFilter {
    pub status: Option<BillingPeriodStatus>,
    pub page_size: i32,
}
