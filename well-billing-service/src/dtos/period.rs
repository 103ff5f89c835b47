use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{BillingPeriod, Debt, DistributionLineItem, InvoiceMeta, UsageSummary};

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_window"))]
pub struct CreateBillingPeriodRequest {
    pub start_utc: DateTime<Utc>,
    /// Exclusive.
    pub end_utc: DateTime<Utc>,
    pub payment_due_date: Option<NaiveDate>,
}

fn validate_window(request: &CreateBillingPeriodRequest) -> Result<(), ValidationError> {
    if request.start_utc >= request.end_utc {
        let mut err = ValidationError::new("window");
        err.message = Some("start_utc must be before end_utc".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct ListBillingPeriodsQuery {
    pub status: Option<String>,
    pub page_size: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct BillingPeriodResponse {
    pub period_id: Uuid,
    pub well_id: Uuid,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub total_amount: Option<Decimal>,
    pub status: String,
    pub payment_due_date: Option<NaiveDate>,
    pub invoice_meta: InvoiceMeta,
    pub version: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl From<BillingPeriod> for BillingPeriodResponse {
    fn from(period: BillingPeriod) -> Self {
        let invoice_meta = period.invoice_meta();
        Self {
            period_id: period.period_id,
            well_id: period.well_id,
            start_utc: period.start_utc,
            end_utc: period.end_utc,
            total_amount: period.total_amount,
            status: period.status,
            payment_due_date: period.payment_due_date,
            invoice_meta,
            version: period.version,
            created_utc: period.created_utc,
            updated_utc: period.updated_utc,
        }
    }
}

/// A period with everything its distribution produced.
#[derive(Debug, Serialize)]
pub struct BillingPeriodDetailResponse {
    #[serde(flatten)]
    pub period: BillingPeriodResponse,
    pub line_items: Vec<DistributionLineItem>,
    pub usage_summaries: Vec<UsageSummary>,
    pub debts: Vec<Debt>,
}
