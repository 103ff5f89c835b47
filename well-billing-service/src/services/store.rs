//! Persistence seam of the distribution orchestrator.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    BillingPeriod, Debt, DistributionLineItem, FieldOwnership, UsageEvent, UsageSummary,
};

/// Compare-and-swap claim of a pending period.
#[derive(Debug, Clone)]
pub struct PeriodClaim {
    pub period_id: Uuid,
    /// Version read before claiming; the claim fails if it moved.
    pub expected_version: i32,
    pub total_amount: Decimal,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
}

/// Everything written when a distribution completes.
#[derive(Debug, Clone)]
pub struct DistributionCommit {
    pub period_id: Uuid,
    pub debts: Vec<Debt>,
    pub line_items: Vec<DistributionLineItem>,
    pub usage_summaries: Vec<UsageSummary>,
}

/// Storage operations needed to run a distribution.
#[async_trait]
pub trait DistributionStore: Send + Sync {
    /// Tenant-scoped period lookup.
    async fn get_period(
        &self,
        tenant_id: Uuid,
        period_id: Uuid,
    ) -> Result<Option<BillingPeriod>, AppError>;

    async fn count_line_items(&self, period_id: Uuid) -> Result<i64, AppError>;

    /// Move a pending period at `expected_version` to distributing and store
    /// the committed amount. `None` when another run got there first.
    async fn claim_period(&self, claim: &PeriodClaim) -> Result<Option<BillingPeriod>, AppError>;

    /// Return a claimed period to pending, keeping its committed amount.
    async fn release_period(&self, period_id: Uuid) -> Result<BillingPeriod, AppError>;

    /// Usage events of a well starting at or before `until`, with shares.
    async fn list_usage_events(
        &self,
        well_id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, AppError>;

    async fn list_field_ownerships(
        &self,
        field_ids: &[Uuid],
    ) -> Result<Vec<FieldOwnership>, AppError>;

    /// Atomically write debts, line items and summaries and mark the period
    /// distributed. Nothing is written on failure.
    async fn commit_distribution(
        &self,
        commit: &DistributionCommit,
    ) -> Result<BillingPeriod, AppError>;
}
