//! Well bill distribution: apportions a period's bill across irrigated
//! fields by overlapping usage, then across each field's owners.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::allocation::{
    compute_field_weights, distribute, overlap_minutes, round_currency, total_weight,
    BillingWindow, FieldWeight, Share,
};
use crate::config::{DistributionConfig, UnownedFieldPolicy};
use crate::models::{
    BillingPeriod, BillingPeriodStatus, Debt, DebtReason, DebtStatus, DistributionLineItem,
    FieldOwnership, UsageEvent, UsageSummary,
};
use crate::services::metrics::{
    record_distributed_amount, record_distribution, record_error, record_unowned_field,
};
use crate::services::store::{DistributionCommit, DistributionStore, PeriodClaim};

const PERCENT_SCALE: u32 = 4;

/// Input for a distribution run.
#[derive(Debug, Clone)]
pub struct DistributeBill {
    pub tenant_id: Uuid,
    /// Becomes the creditor of the generated debts.
    pub requested_by: Uuid,
    pub period_id: Uuid,
    /// When given, must match the period's well.
    pub well_id: Option<Uuid>,
    pub total_amount: Decimal,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
}

/// A field whose share of the bill had no owner to land on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnownedField {
    pub field_id: Uuid,
    pub basis_weight: Decimal,
    pub amount: Decimal,
    /// Whether an owner-less line item was persisted for it.
    pub persisted: bool,
}

#[derive(Debug, Clone)]
pub struct DistributionReport {
    pub period: BillingPeriod,
    pub line_items: Vec<DistributionLineItem>,
    pub usage_summaries: Vec<UsageSummary>,
    pub debts: Vec<Debt>,
    pub unowned_fields: Vec<UnownedField>,
}

#[derive(Debug, Clone)]
pub enum DistributionOutcome {
    Distributed(DistributionReport),
    /// Nothing overlapped the period; the period stays pending.
    NoOverlappingUsage { period: BillingPeriod },
}

/// Line items of one run before debts are attached.
#[derive(Debug, Clone, Default)]
pub struct FieldAllocation {
    pub line_items: Vec<DistributionLineItem>,
    pub unowned_fields: Vec<UnownedField>,
}

/// Orchestrates a distribution run against a [`DistributionStore`].
pub struct DistributionService<S> {
    store: Arc<S>,
    config: DistributionConfig,
}

impl<S> Clone for DistributionService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: DistributionStore> DistributionService<S> {
    pub fn new(store: Arc<S>, config: DistributionConfig) -> Self {
        Self { store, config }
    }

    /// Run a distribution for a pending period.
    ///
    /// The period is claimed with a version-checked status transition before
    /// any weight is computed; the claim is released when the run ends
    /// without committing.
    #[instrument(
        skip(self, request),
        fields(tenant_id = %request.tenant_id, period_id = %request.period_id)
    )]
    pub async fn run_distribution(
        &self,
        request: &DistributeBill,
    ) -> Result<DistributionOutcome, AppError> {
        if request.total_amount < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Total amount must not be negative"
            )));
        }

        let period = self
            .store
            .get_period(request.tenant_id, request.period_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Billing period not found")))?;

        if let Some(well_id) = request.well_id {
            if well_id != period.well_id {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Billing period does not belong to well {}",
                    well_id
                )));
            }
        }

        if self.store.count_line_items(period.period_id).await? > 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Billing period has already been distributed"
            )));
        }

        if period.status() != BillingPeriodStatus::Pending {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Billing period is {} and cannot be distributed",
                period.status
            )));
        }

        let claim = PeriodClaim {
            period_id: period.period_id,
            expected_version: period.version,
            total_amount: round_currency(request.total_amount),
            invoice_number: request.invoice_number.clone(),
            invoice_date: request.invoice_date,
        };

        let claimed = self.store.claim_period(&claim).await?.ok_or_else(|| {
            AppError::Conflict(anyhow::anyhow!(
                "Billing period is already being distributed"
            ))
        })?;

        let tenant = request.tenant_id.to_string();

        match self.allocate(request, &claimed).await {
            Ok(Some(report)) => {
                record_distribution(&tenant, "distributed");
                Ok(DistributionOutcome::Distributed(report))
            }
            Ok(None) => {
                let period = self.store.release_period(claimed.period_id).await?;
                record_distribution(&tenant, "no_overlapping_usage");
                Ok(DistributionOutcome::NoOverlappingUsage { period })
            }
            Err(e) => {
                record_distribution(&tenant, "failed");
                record_error("distribution", "run_distribution");
                if let Err(release_err) = self.store.release_period(claimed.period_id).await {
                    warn!(
                        period_id = %claimed.period_id,
                        error = %release_err,
                        "Failed to release distribution claim"
                    );
                }
                Err(e)
            }
        }
    }

    async fn allocate(
        &self,
        request: &DistributeBill,
        period: &BillingPeriod,
    ) -> Result<Option<DistributionReport>, AppError> {
        let window = BillingWindow::new(period.start_utc, period.end_utc);
        let events = self
            .store
            .list_usage_events(period.well_id, period.end_utc)
            .await?;

        let weights = compute_field_weights(&window, &events);
        if total_weight(&weights).is_zero() {
            info!(
                period_id = %period.period_id,
                events = events.len(),
                "No usage overlaps the billing period"
            );
            return Ok(None);
        }

        let total = round_currency(request.total_amount);
        let field_ids: Vec<Uuid> = weights.keys().copied().collect();
        let ownerships = self.store.list_field_ownerships(&field_ids).await?;

        let mut allocation = allocate_fields(
            period.period_id,
            total,
            &weights,
            &ownerships,
            self.config.unowned_field_policy,
        );

        let tenant = request.tenant_id.to_string();
        let policy = self.config.unowned_field_policy.as_str();
        for unowned in &allocation.unowned_fields {
            record_unowned_field(&tenant, policy);
            warn!(
                period_id = %period.period_id,
                field_id = %unowned.field_id,
                amount = %unowned.amount,
                policy = policy,
                "Field has irrigation weight but no owners"
            );
        }

        if self.config.unowned_field_policy == UnownedFieldPolicy::Reject
            && !allocation.unowned_fields.is_empty()
        {
            let fields: Vec<String> = allocation
                .unowned_fields
                .iter()
                .map(|f| f.field_id.to_string())
                .collect();
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Fields without ownership data: {}",
                fields.join(", ")
            )));
        }

        let due_date = period.payment_due_date.unwrap_or_else(|| {
            Utc::now().date_naive() + Duration::days(self.config.payment_terms_days)
        });
        let debts = attach_debts(
            &mut allocation.line_items,
            period,
            request.requested_by,
            due_date,
        );
        let usage_summaries = summarize_usage(period.period_id, &window, &events, total);

        let commit = DistributionCommit {
            period_id: period.period_id,
            debts,
            line_items: allocation.line_items,
            usage_summaries,
        };
        let committed = self.store.commit_distribution(&commit).await?;

        let owned_amount: Decimal = commit
            .line_items
            .iter()
            .filter(|item| item.owner_id.is_some())
            .map(|item| item.amount)
            .sum();
        record_distributed_amount(&tenant, owned_amount.to_f64().unwrap_or_default());

        info!(
            period_id = %period.period_id,
            total_amount = %total,
            fields = weights.len(),
            line_items = commit.line_items.len(),
            unowned_fields = allocation.unowned_fields.len(),
            "Billing period distributed"
        );

        Ok(Some(DistributionReport {
            period: committed,
            line_items: commit.line_items,
            usage_summaries: commit.usage_summaries,
            debts: commit.debts,
            unowned_fields: allocation.unowned_fields,
        }))
    }
}

/// Split `total` across fields by weight, then each field's amount across
/// its owners by `weight * ownership%`. Owners whose share rounds to zero get
/// no line item.
pub fn allocate_fields(
    period_id: Uuid,
    total: Decimal,
    weights: &BTreeMap<Uuid, FieldWeight>,
    ownerships: &[FieldOwnership],
    policy: UnownedFieldPolicy,
) -> FieldAllocation {
    let now = Utc::now();
    let mut owners_by_field: BTreeMap<Uuid, Vec<&FieldOwnership>> = BTreeMap::new();
    for ownership in ownerships {
        if ownership.percentage > Decimal::ZERO {
            owners_by_field
                .entry(ownership.field_id)
                .or_default()
                .push(ownership);
        }
    }
    for owners in owners_by_field.values_mut() {
        owners.sort_by_key(|o| o.owner_id);
    }

    let field_shares: Vec<Share<Uuid>> = weights
        .iter()
        .map(|(field_id, weight)| Share::new(*field_id, weight.weight_minutes))
        .collect();

    let mut allocation = FieldAllocation::default();

    for field in distribute(total, &field_shares) {
        let weight = weights[&field.key];

        let Some(owners) = owners_by_field.get(&field.key) else {
            let persisted = policy == UnownedFieldPolicy::Unallocated;
            if persisted {
                allocation.line_items.push(DistributionLineItem {
                    line_item_id: Uuid::new_v4(),
                    period_id,
                    field_id: field.key,
                    owner_id: None,
                    basis_duration: weight.duration_minutes,
                    basis_area: non_zero(weight.area),
                    basis_weight: weight.weight_minutes,
                    share_percentage: percent_of(field.amount, total),
                    amount: field.amount,
                    debt_id: None,
                    created_utc: now,
                });
            }
            allocation.unowned_fields.push(UnownedField {
                field_id: field.key,
                basis_weight: weight.weight_minutes,
                amount: field.amount,
                persisted,
            });
            continue;
        };

        let ownership_total: Decimal = owners.iter().map(|o| o.percentage).sum();
        if ownership_total != Decimal::ONE_HUNDRED {
            warn!(
                field_id = %field.key,
                ownership_total = %ownership_total,
                "Field ownership does not sum to 100, splitting proportionally"
            );
        }

        let owner_shares: Vec<Share<&FieldOwnership>> = owners
            .iter()
            .map(|o| Share::new(*o, weight.weight_minutes * fraction(o.percentage)))
            .collect();

        for (owner, share) in distribute(field.amount, &owner_shares)
            .into_iter()
            .zip(owner_shares.iter())
        {
            if owner.amount <= Decimal::ZERO {
                continue;
            }
            let factor = fraction(owner.key.percentage);
            allocation.line_items.push(DistributionLineItem {
                line_item_id: Uuid::new_v4(),
                period_id,
                field_id: field.key,
                owner_id: Some(owner.key.owner_id),
                basis_duration: weight.duration_minutes * factor,
                basis_area: non_zero(weight.area * factor),
                basis_weight: share.weight,
                share_percentage: percent_of(owner.amount, total),
                amount: owner.amount,
                debt_id: None,
                created_utc: now,
            });
        }
    }

    allocation
}

/// One pending debt per owner line item with a positive amount, linked
/// back from the line item.
pub fn attach_debts(
    line_items: &mut [DistributionLineItem],
    period: &BillingPeriod,
    creditor_id: Uuid,
    due_date: NaiveDate,
) -> Vec<Debt> {
    let now = Utc::now();
    let mut debts = Vec::new();

    for item in line_items.iter_mut() {
        let Some(owner_id) = item.owner_id else {
            continue;
        };
        if item.amount <= Decimal::ZERO {
            continue;
        }

        let debt = Debt {
            debt_id: Uuid::new_v4(),
            tenant_id: period.tenant_id,
            period_id: period.period_id,
            debtor_id: owner_id,
            creditor_id,
            amount: item.amount,
            due_date,
            status: DebtStatus::Pending.as_str().to_string(),
            reason: DebtReason::WellBill.as_str().to_string(),
            paid_utc: None,
            created_utc: now,
        };
        item.debt_id = Some(debt.debt_id);
        debts.push(debt);
    }

    debts
}

/// Per-event share of the bill by overlapping minutes.
pub fn summarize_usage(
    period_id: Uuid,
    window: &BillingWindow,
    events: &[UsageEvent],
    total: Decimal,
) -> Vec<UsageSummary> {
    let now = Utc::now();
    let overlaps: Vec<Share<Uuid>> = events
        .iter()
        .map(|e| {
            Share::new(
                e.event_id,
                overlap_minutes(window, e.start_utc, e.duration_minutes),
            )
        })
        .filter(|s| s.weight > Decimal::ZERO)
        .collect();
    let total_minutes: Decimal = overlaps.iter().map(|s| s.weight).sum();

    distribute(total, &overlaps)
        .into_iter()
        .zip(overlaps.iter())
        .map(|(allocation, overlap)| UsageSummary {
            summary_id: Uuid::new_v4(),
            period_id,
            event_id: allocation.key,
            overlap_minutes: overlap.weight,
            percentage: percent_of(overlap.weight, total_minutes),
            amount: allocation.amount,
            created_utc: now,
        })
        .collect()
}

fn fraction(percentage: Decimal) -> Decimal {
    percentage / Decimal::ONE_HUNDRED
}

fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    (part / whole * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(PERCENT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn non_zero(value: Decimal) -> Option<Decimal> {
    if value.is_zero() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldShare;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        periods: Vec<BillingPeriod>,
        events: Vec<UsageEvent>,
        ownerships: Vec<FieldOwnership>,
        line_items: Vec<DistributionLineItem>,
        summaries: Vec<UsageSummary>,
        debts: Vec<Debt>,
        fail_commit: bool,
        lose_claim: bool,
    }

    #[derive(Default)]
    struct MemoryStore {
        state: Mutex<State>,
    }

    impl MemoryStore {
        fn period(&self, period_id: Uuid) -> BillingPeriod {
            let state = self.state.lock().unwrap();
            state
                .periods
                .iter()
                .find(|p| p.period_id == period_id)
                .cloned()
                .unwrap()
        }

        fn with_state(&self, f: impl FnOnce(&mut State)) {
            f(&mut self.state.lock().unwrap());
        }
    }

    #[async_trait]
    impl DistributionStore for MemoryStore {
        async fn get_period(
            &self,
            tenant_id: Uuid,
            period_id: Uuid,
        ) -> Result<Option<BillingPeriod>, AppError> {
            let state = self.state.lock().unwrap();
            Ok(state
                .periods
                .iter()
                .find(|p| p.tenant_id == tenant_id && p.period_id == period_id)
                .cloned())
        }

        async fn count_line_items(&self, period_id: Uuid) -> Result<i64, AppError> {
            let state = self.state.lock().unwrap();
            Ok(state
                .line_items
                .iter()
                .filter(|l| l.period_id == period_id)
                .count() as i64)
        }

        async fn claim_period(
            &self,
            claim: &PeriodClaim,
        ) -> Result<Option<BillingPeriod>, AppError> {
            let mut state = self.state.lock().unwrap();
            if state.lose_claim {
                return Ok(None);
            }
            let Some(period) = state.periods.iter_mut().find(|p| {
                p.period_id == claim.period_id
                    && p.version == claim.expected_version
                    && p.status == "pending"
            }) else {
                return Ok(None);
            };
            period.status = BillingPeriodStatus::Distributing.as_str().to_string();
            period.version += 1;
            period.total_amount = Some(claim.total_amount);
            period.invoice_number = claim.invoice_number.clone();
            period.invoice_date = claim.invoice_date;
            Ok(Some(period.clone()))
        }

        async fn release_period(&self, period_id: Uuid) -> Result<BillingPeriod, AppError> {
            let mut state = self.state.lock().unwrap();
            let period = state
                .periods
                .iter_mut()
                .find(|p| p.period_id == period_id)
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("missing")))?;
            period.status = BillingPeriodStatus::Pending.as_str().to_string();
            period.version += 1;
            Ok(period.clone())
        }

        async fn list_usage_events(
            &self,
            well_id: Uuid,
            until: DateTime<Utc>,
        ) -> Result<Vec<UsageEvent>, AppError> {
            let state = self.state.lock().unwrap();
            Ok(state
                .events
                .iter()
                .filter(|e| e.well_id == well_id && e.start_utc <= until)
                .cloned()
                .collect())
        }

        async fn list_field_ownerships(
            &self,
            field_ids: &[Uuid],
        ) -> Result<Vec<FieldOwnership>, AppError> {
            let state = self.state.lock().unwrap();
            Ok(state
                .ownerships
                .iter()
                .filter(|o| field_ids.contains(&o.field_id))
                .cloned()
                .collect())
        }

        async fn commit_distribution(
            &self,
            commit: &DistributionCommit,
        ) -> Result<BillingPeriod, AppError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_commit {
                return Err(AppError::DatabaseError(anyhow::anyhow!("disk full")));
            }
            state.debts.extend(commit.debts.iter().cloned());
            state.line_items.extend(commit.line_items.iter().cloned());
            state.summaries.extend(commit.usage_summaries.iter().cloned());
            let period = state
                .periods
                .iter_mut()
                .find(|p| p.period_id == commit.period_id)
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("missing")))?;
            period.status = BillingPeriodStatus::Distributed.as_str().to_string();
            period.version += 1;
            Ok(period.clone())
        }
    }

    const TENANT: Uuid = Uuid::from_u128(0x1111);
    const ADMIN: Uuid = Uuid::from_u128(0xad);
    const WELL: Uuid = Uuid::from_u128(0x3e11);

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    fn field(n: u128) -> Uuid {
        Uuid::from_u128(0xf000 + n)
    }

    fn owner(n: u128) -> Uuid {
        Uuid::from_u128(0x0a00 + n)
    }

    fn pending_period() -> BillingPeriod {
        BillingPeriod {
            period_id: Uuid::new_v4(),
            tenant_id: TENANT,
            well_id: WELL,
            start_utc: at(1, 0),
            end_utc: at(8, 0),
            total_amount: None,
            status: "pending".to_string(),
            payment_due_date: NaiveDate::from_ymd_opt(2024, 2, 15),
            invoice_number: None,
            invoice_date: None,
            version: 0,
            created_utc: at(1, 0),
            updated_utc: at(1, 0),
        }
    }

    fn usage(start: DateTime<Utc>, minutes: i32, shares: &[(Uuid, Decimal)]) -> UsageEvent {
        let event_id = Uuid::new_v4();
        UsageEvent {
            event_id,
            well_id: WELL,
            start_utc: start,
            duration_minutes: minutes,
            shares: shares
                .iter()
                .map(|(field_id, percentage)| FieldShare {
                    event_id,
                    field_id: *field_id,
                    percentage: *percentage,
                    actual_area: Some(dec!(10)),
                })
                .collect(),
        }
    }

    fn owns(field_id: Uuid, owner_id: Uuid, percentage: Decimal) -> FieldOwnership {
        FieldOwnership {
            field_id,
            owner_id,
            percentage,
        }
    }

    fn service(
        store: &Arc<MemoryStore>,
        policy: UnownedFieldPolicy,
    ) -> DistributionService<MemoryStore> {
        DistributionService::new(
            store.clone(),
            DistributionConfig {
                unowned_field_policy: policy,
                payment_terms_days: 30,
            },
        )
    }

    fn request(period: &BillingPeriod, total: Decimal) -> DistributeBill {
        DistributeBill {
            tenant_id: TENANT,
            requested_by: ADMIN,
            period_id: period.period_id,
            well_id: None,
            total_amount: total,
            invoice_number: Some("INV-2024-001".to_string()),
            invoice_date: NaiveDate::from_ymd_opt(2024, 1, 9),
        }
    }

    fn seeded(
        period: &BillingPeriod,
        events: Vec<UsageEvent>,
        ownerships: Vec<FieldOwnership>,
    ) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.with_state(|s| {
            s.periods.push(period.clone());
            s.events = events;
            s.ownerships = ownerships;
        });
        store
    }

    fn expect_report(outcome: DistributionOutcome) -> DistributionReport {
        match outcome {
            DistributionOutcome::Distributed(report) => report,
            DistributionOutcome::NoOverlappingUsage { .. } => {
                panic!("expected a distribution")
            }
        }
    }

    #[tokio::test]
    async fn splits_field_amount_between_owners() {
        let period = pending_period();
        let store = seeded(
            &period,
            vec![usage(at(2, 6), 500, &[(field(1), dec!(100))])],
            vec![
                owns(field(1), owner(1), dec!(60)),
                owns(field(1), owner(2), dec!(40)),
            ],
        );

        let report = expect_report(
            service(&store, UnownedFieldPolicy::Skip)
                .run_distribution(&request(&period, dec!(300.00)))
                .await
                .unwrap(),
        );

        let amounts: Vec<(Option<Uuid>, Decimal)> = report
            .line_items
            .iter()
            .map(|l| (l.owner_id, l.amount))
            .collect();
        assert_eq!(
            amounts,
            vec![
                (Some(owner(1)), dec!(180.00)),
                (Some(owner(2)), dec!(120.00))
            ]
        );
        assert_eq!(report.line_items[0].basis_weight, dec!(300));
        assert_eq!(report.line_items[0].basis_duration, dec!(300));
        assert_eq!(report.line_items[0].basis_area, Some(dec!(6)));
        assert_eq!(report.line_items[0].share_percentage, dec!(60));
        assert_eq!(report.period.status(), BillingPeriodStatus::Distributed);
        assert_eq!(report.period.total_amount, Some(dec!(300.00)));
        assert_eq!(
            report.period.invoice_number.as_deref(),
            Some("INV-2024-001")
        );
    }

    #[tokio::test]
    async fn amounts_sum_to_bill_across_fields_and_owners() {
        let period = pending_period();
        let store = seeded(
            &period,
            vec![
                usage(at(2, 6), 90, &[(field(1), dec!(70)), (field(2), dec!(30))]),
                usage(at(4, 6), 45, &[(field(2), dec!(100))]),
                usage(at(6, 22), 37, &[(field(3), dec!(100))]),
            ],
            vec![
                owns(field(1), owner(1), dec!(33.3)),
                owns(field(1), owner(2), dec!(33.3)),
                owns(field(1), owner(3), dec!(33.4)),
                owns(field(2), owner(2), dec!(100)),
                owns(field(3), owner(1), dec!(50)),
                owns(field(3), owner(3), dec!(50)),
            ],
        );

        let report = expect_report(
            service(&store, UnownedFieldPolicy::Skip)
                .run_distribution(&request(&period, dec!(1234.57)))
                .await
                .unwrap(),
        );

        let distributed: Decimal = report.line_items.iter().map(|l| l.amount).sum();
        assert_eq!(distributed, dec!(1234.57));
        assert_eq!(report.line_items.len(), 6);
        assert!(report.unowned_fields.is_empty());

        let summarized: Decimal = report.usage_summaries.iter().map(|s| s.amount).sum();
        assert_eq!(summarized, dec!(1234.57));
        assert_eq!(report.usage_summaries.len(), 3);
    }

    #[tokio::test]
    async fn no_overlap_keeps_period_pending() {
        let period = pending_period();
        let store = seeded(
            &period,
            vec![usage(at(1, 0) - Duration::days(3), 60, &[(field(1), dec!(100))])],
            vec![owns(field(1), owner(1), dec!(100))],
        );

        let outcome = service(&store, UnownedFieldPolicy::Skip)
            .run_distribution(&request(&period, dec!(75.00)))
            .await
            .unwrap();

        let DistributionOutcome::NoOverlappingUsage { period: released } = outcome else {
            panic!("expected no overlapping usage");
        };
        assert_eq!(released.status(), BillingPeriodStatus::Pending);
        assert_eq!(released.total_amount, Some(dec!(75.00)));
        assert_eq!(store.count_line_items(period.period_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn skip_policy_drops_unowned_field_money() {
        let period = pending_period();
        let store = seeded(
            &period,
            vec![usage(
                at(3, 6),
                100,
                &[(field(1), dec!(50)), (field(2), dec!(50))],
            )],
            vec![owns(field(1), owner(1), dec!(100))],
        );

        let report = expect_report(
            service(&store, UnownedFieldPolicy::Skip)
                .run_distribution(&request(&period, dec!(200.00)))
                .await
                .unwrap(),
        );

        assert_eq!(report.line_items.len(), 1);
        assert_eq!(report.line_items[0].field_id, field(1));
        assert_eq!(report.line_items[0].amount, dec!(100.00));
        assert_eq!(
            report.unowned_fields,
            vec![UnownedField {
                field_id: field(2),
                basis_weight: dec!(50),
                amount: dec!(100.00),
                persisted: false,
            }]
        );
    }

    #[tokio::test]
    async fn unallocated_policy_keeps_every_cent() {
        let period = pending_period();
        let store = seeded(
            &period,
            vec![usage(
                at(3, 6),
                100,
                &[(field(1), dec!(50)), (field(2), dec!(50))],
            )],
            vec![owns(field(1), owner(1), dec!(100))],
        );

        let report = expect_report(
            service(&store, UnownedFieldPolicy::Unallocated)
                .run_distribution(&request(&period, dec!(200.00)))
                .await
                .unwrap(),
        );

        assert_eq!(report.line_items.len(), 2);
        let unallocated = report
            .line_items
            .iter()
            .find(|l| l.owner_id.is_none())
            .unwrap();
        assert_eq!(unallocated.field_id, field(2));
        assert_eq!(unallocated.amount, dec!(100.00));
        assert_eq!(unallocated.debt_id, None);
        assert!(report.unowned_fields[0].persisted);

        let total: Decimal = report.line_items.iter().map(|l| l.amount).sum();
        assert_eq!(total, dec!(200.00));
        assert_eq!(report.debts.len(), 1);
    }

    #[tokio::test]
    async fn reject_policy_fails_and_releases_claim() {
        let period = pending_period();
        let store = seeded(
            &period,
            vec![usage(at(3, 6), 100, &[(field(2), dec!(100))])],
            vec![],
        );

        let result = service(&store, UnownedFieldPolicy::Reject)
            .run_distribution(&request(&period, dec!(50.00)))
            .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(
            store.period(period.period_id).status(),
            BillingPeriodStatus::Pending
        );
        assert_eq!(store.count_line_items(period.period_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn owners_receive_pending_debts() {
        let period = pending_period();
        let store = seeded(
            &period,
            vec![usage(at(2, 6), 60, &[(field(1), dec!(100))])],
            vec![
                owns(field(1), owner(1), dec!(50)),
                owns(field(1), owner(2), dec!(50)),
            ],
        );

        let report = expect_report(
            service(&store, UnownedFieldPolicy::Skip)
                .run_distribution(&request(&period, dec!(90.00)))
                .await
                .unwrap(),
        );

        assert_eq!(report.debts.len(), 2);
        for (item, debt) in report.line_items.iter().zip(report.debts.iter()) {
            assert_eq!(item.debt_id, Some(debt.debt_id));
            assert_eq!(Some(debt.debtor_id), item.owner_id);
            assert_eq!(debt.creditor_id, ADMIN);
            assert_eq!(debt.amount, dec!(45.00));
            assert_eq!(debt.due_date, NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
            assert_eq!(debt.status, "pending");
            assert_eq!(debt.reason, "well_bill");
        }
    }

    #[tokio::test]
    async fn refuses_second_distribution() {
        let period = pending_period();
        let store = seeded(
            &period,
            vec![usage(at(2, 6), 60, &[(field(1), dec!(100))])],
            vec![owns(field(1), owner(1), dec!(100))],
        );
        let service = service(&store, UnownedFieldPolicy::Skip);

        service
            .run_distribution(&request(&period, dec!(10.00)))
            .await
            .unwrap();
        let second = service
            .run_distribution(&request(&period, dec!(10.00)))
            .await;

        assert!(matches!(second, Err(AppError::Conflict(_))));
        assert_eq!(store.count_line_items(period.period_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lost_claim_is_a_conflict() {
        let period = pending_period();
        let store = seeded(
            &period,
            vec![usage(at(2, 6), 60, &[(field(1), dec!(100))])],
            vec![owns(field(1), owner(1), dec!(100))],
        );
        store.with_state(|s| s.lose_claim = true);

        let result = service(&store, UnownedFieldPolicy::Skip)
            .run_distribution(&request(&period, dec!(10.00)))
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn failed_commit_writes_nothing_and_releases_claim() {
        let period = pending_period();
        let store = seeded(
            &period,
            vec![usage(at(2, 6), 60, &[(field(1), dec!(100))])],
            vec![owns(field(1), owner(1), dec!(100))],
        );
        store.with_state(|s| s.fail_commit = true);

        let result = service(&store, UnownedFieldPolicy::Skip)
            .run_distribution(&request(&period, dec!(10.00)))
            .await;

        assert!(matches!(result, Err(AppError::DatabaseError(_))));
        assert_eq!(
            store.period(period.period_id).status(),
            BillingPeriodStatus::Pending
        );
        store.with_state(|s| {
            assert!(s.line_items.is_empty());
            assert!(s.debts.is_empty());
            assert!(s.summaries.is_empty());
        });
    }

    #[tokio::test]
    async fn validates_request_before_claiming() {
        let period = pending_period();
        let store = seeded(&period, vec![], vec![]);
        let service = service(&store, UnownedFieldPolicy::Skip);

        let negative = service
            .run_distribution(&request(&period, dec!(-1.00)))
            .await;
        assert!(matches!(negative, Err(AppError::BadRequest(_))));

        let mut wrong_well = request(&period, dec!(1.00));
        wrong_well.well_id = Some(Uuid::new_v4());
        assert!(matches!(
            service.run_distribution(&wrong_well).await,
            Err(AppError::BadRequest(_))
        ));

        let mut other_tenant = request(&period, dec!(1.00));
        other_tenant.tenant_id = Uuid::new_v4();
        assert!(matches!(
            service.run_distribution(&other_tenant).await,
            Err(AppError::NotFound(_))
        ));

        assert_eq!(store.period(period.period_id).version, 0);
    }

    #[test]
    fn uneven_ownership_is_split_proportionally() {
        let mut weights = BTreeMap::new();
        weights.insert(
            field(1),
            FieldWeight {
                weight_minutes: dec!(120),
                duration_minutes: dec!(120),
                area: Decimal::ZERO,
            },
        );
        let ownerships = vec![
            owns(field(1), owner(1), dec!(30)),
            owns(field(1), owner(2), dec!(20)),
        ];

        let allocation = allocate_fields(
            Uuid::nil(),
            dec!(100.00),
            &weights,
            &ownerships,
            UnownedFieldPolicy::Skip,
        );

        assert_eq!(allocation.line_items[0].amount, dec!(60.00));
        assert_eq!(allocation.line_items[1].amount, dec!(40.00));
        assert_eq!(allocation.line_items[0].basis_area, None);
    }

    #[test]
    fn usage_summary_percentages_follow_overlap() {
        let window = BillingWindow::new(at(1, 0), at(8, 0));
        let events = vec![
            usage(at(2, 6), 30, &[(field(1), dec!(100))]),
            usage(at(3, 6), 90, &[(field(1), dec!(100))]),
            usage(at(9, 6), 90, &[(field(1), dec!(100))]),
        ];

        let summaries = summarize_usage(Uuid::nil(), &window, &events, dec!(40.00));

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].percentage, dec!(25));
        assert_eq!(summaries[0].amount, dec!(10.00));
        assert_eq!(summaries[1].percentage, dec!(75));
        assert_eq!(summaries[1].amount, dec!(30.00));
    }

    fn single_field(weight: Decimal) -> BTreeMap<Uuid, FieldWeight> {
        BTreeMap::from([(
            field(1),
            FieldWeight {
                weight_minutes: weight,
                duration_minutes: weight,
                area: Decimal::ZERO,
            },
        )])
    }

    #[test]
    fn owners_with_nothing_to_pay_get_no_line_item() {
        let ownerships = vec![
            owns(field(1), owner(1), dec!(60)),
            owns(field(1), owner(2), dec!(40)),
        ];

        let nothing = allocate_fields(
            Uuid::nil(),
            Decimal::ZERO,
            &single_field(dec!(500)),
            &ownerships,
            UnownedFieldPolicy::Unallocated,
        );
        assert!(nothing.line_items.is_empty());

        // 0.006 rounds up, 0.004 rounds to zero
        let one_cent = allocate_fields(
            Uuid::nil(),
            dec!(0.01),
            &single_field(dec!(500)),
            &ownerships,
            UnownedFieldPolicy::Unallocated,
        );
        assert_eq!(one_cent.line_items.len(), 1);
        assert_eq!(one_cent.line_items[0].owner_id, Some(owner(1)));
        assert_eq!(one_cent.line_items[0].amount, dec!(0.01));
    }

    #[test]
    fn percentages_round_half_away_from_zero() {
        assert_eq!(percent_of(dec!(0.25), dec!(100000)), dec!(0.0003));
        assert_eq!(percent_of(dec!(1), dec!(3)), dec!(33.3333));
        assert_eq!(percent_of(dec!(5), Decimal::ZERO), Decimal::ZERO);
    }
}
