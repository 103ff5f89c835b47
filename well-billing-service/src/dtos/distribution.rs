use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{validate_non_negative, BillingPeriodResponse};
use crate::models::{Debt, DistributionLineItem, UsageSummary};
use crate::services::{DistributionOutcome, UnownedField};

#[derive(Debug, Deserialize, Validate)]
pub struct DistributeBillRequest {
    #[validate(custom(function = "validate_non_negative"))]
    pub total_amount: Decimal,
    /// Checked against the period's well when present.
    pub well_id: Option<Uuid>,
    #[validate(length(max = 100, message = "Invoice number is too long"))]
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct DistributionResponse {
    pub message: String,
    pub distributed: bool,
    pub period: BillingPeriodResponse,
    pub line_items: Vec<DistributionLineItem>,
    pub usage_summaries: Vec<UsageSummary>,
    pub debts: Vec<Debt>,
    pub unallocated_fields: Vec<UnownedField>,
}

impl From<DistributionOutcome> for DistributionResponse {
    fn from(outcome: DistributionOutcome) -> Self {
        match outcome {
            DistributionOutcome::Distributed(report) => Self {
                message: format!(
                    "Bill distributed across {} line items",
                    report.line_items.len()
                ),
                distributed: true,
                period: report.period.into(),
                line_items: report.line_items,
                usage_summaries: report.usage_summaries,
                debts: report.debts,
                unallocated_fields: report.unowned_fields,
            },
            DistributionOutcome::NoOverlappingUsage { period } => Self {
                message: "No usage overlaps the billing period; nothing was distributed"
                    .to_string(),
                distributed: false,
                period: period.into(),
                line_items: Vec::new(),
                usage_summaries: Vec::new(),
                debts: Vec::new(),
                unallocated_fields: Vec::new(),
            },
        }
    }
}
