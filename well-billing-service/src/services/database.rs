//! Database service for well-billing-service.

use crate::models::{
    BillingPeriod, BillingPeriodStatus, CreateBillingPeriod, Debt, DebtReason, DebtStatus,
    DistributionLineItem, FieldOwnership, FieldShare, ListBillingPeriodsFilter, Payment,
    PaymentReceipt, RecordPayment, RecordUsageEvent, UsageEvent, UsageSummary, Well,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{DistributionCommit, DistributionStore, PeriodClaim};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "well-billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Well and Usage Operations
    // =========================================================================

    /// Register a well.
    #[instrument(skip(self, name), fields(tenant_id = %tenant_id))]
    pub async fn create_well(&self, tenant_id: Uuid, name: &str) -> Result<Well, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_well"])
            .start_timer();

        let well = sqlx::query_as::<_, Well>(
            r#"
            INSERT INTO wells (well_id, tenant_id, name)
            VALUES ($1, $2, $3)
            RETURNING well_id, tenant_id, name, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create well: {}", e)))?;

        timer.observe_duration();
        info!(well_id = %well.well_id, "Well created");

        Ok(well)
    }

    /// Get a well by ID.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, well_id = %well_id))]
    pub async fn get_well(
        &self,
        tenant_id: Uuid,
        well_id: Uuid,
    ) -> Result<Option<Well>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_well"])
            .start_timer();

        let well = sqlx::query_as::<_, Well>(
            r#"
            SELECT well_id, tenant_id, name, created_utc
            FROM wells
            WHERE tenant_id = $1 AND well_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(well_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get well: {}", e)))?;

        timer.observe_duration();

        Ok(well)
    }

    /// Record a usage event with its per-field shares.
    #[instrument(skip(self, input), fields(well_id = %input.well_id))]
    pub async fn record_usage_event(
        &self,
        input: &RecordUsageEvent,
    ) -> Result<UsageEvent, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_usage_event"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let mut event = sqlx::query_as::<_, UsageEvent>(
            r#"
            INSERT INTO usage_events (event_id, well_id, start_utc, duration_minutes)
            VALUES ($1, $2, $3, $4)
            RETURNING event_id, well_id, start_utc, duration_minutes
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.well_id)
        .bind(input.start_utc)
        .bind(input.duration_minutes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record usage event: {}", e))
        })?;

        for (field_id, percentage, actual_area) in &input.shares {
            let share = sqlx::query_as::<_, FieldShare>(
                r#"
                INSERT INTO usage_event_fields (event_id, field_id, percentage, actual_area)
                VALUES ($1, $2, $3, $4)
                RETURNING event_id, field_id, percentage, actual_area
                "#,
            )
            .bind(event.event_id)
            .bind(field_id)
            .bind(percentage)
            .bind(actual_area)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to record field share: {}", e))
            })?;
            event.shares.push(share);
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit usage event: {}", e))
        })?;

        timer.observe_duration();

        Ok(event)
    }

    /// Set (or replace) an owner's percentage of a field.
    #[instrument(skip(self), fields(field_id = %field_id, owner_id = %owner_id))]
    pub async fn set_field_ownership(
        &self,
        field_id: Uuid,
        owner_id: Uuid,
        percentage: Decimal,
    ) -> Result<FieldOwnership, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_field_ownership"])
            .start_timer();

        let ownership = sqlx::query_as::<_, FieldOwnership>(
            r#"
            INSERT INTO field_ownerships (field_id, owner_id, percentage)
            VALUES ($1, $2, $3)
            ON CONFLICT (field_id, owner_id) DO UPDATE SET percentage = EXCLUDED.percentage
            RETURNING field_id, owner_id, percentage
            "#,
        )
        .bind(field_id)
        .bind(owner_id)
        .bind(percentage)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to set field ownership: {}", e))
        })?;

        timer.observe_duration();

        Ok(ownership)
    }

    // =========================================================================
    // Billing Period Operations
    // =========================================================================

    /// Create a pending billing period.
    #[instrument(
        skip(self, input),
        fields(tenant_id = %input.tenant_id, well_id = %input.well_id)
    )]
    pub async fn create_billing_period(
        &self,
        input: &CreateBillingPeriod,
    ) -> Result<BillingPeriod, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_billing_period"])
            .start_timer();

        let period = sqlx::query_as::<_, BillingPeriod>(
            r#"
            INSERT INTO billing_periods (period_id, tenant_id, well_id, start_utc, end_utc,
                payment_due_date, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING period_id, tenant_id, well_id, start_utc, end_utc, total_amount, status,
                payment_due_date, invoice_number, invoice_date, version, created_utc,
                updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.well_id)
        .bind(input.start_utc)
        .bind(input.end_utc)
        .bind(input.payment_due_date)
        .bind(BillingPeriodStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create billing period: {}", e))
        })?;

        timer.observe_duration();
        info!(period_id = %period.period_id, "Billing period created");

        Ok(period)
    }

    /// List billing periods of a well, newest first.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id, well_id = %well_id))]
    pub async fn list_billing_periods(
        &self,
        tenant_id: Uuid,
        well_id: Uuid,
        filter: &ListBillingPeriodsFilter,
    ) -> Result<Vec<BillingPeriod>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_billing_periods"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;

        let periods = sqlx::query_as::<_, BillingPeriod>(
            r#"
            SELECT period_id, tenant_id, well_id, start_utc, end_utc, total_amount, status,
                payment_due_date, invoice_number, invoice_date, version, created_utc,
                updated_utc
            FROM billing_periods
            WHERE tenant_id = $1
              AND well_id = $2
              AND ($3::text IS NULL OR status = $3)
            ORDER BY start_utc DESC, period_id
            LIMIT $4
            "#,
        )
        .bind(tenant_id)
        .bind(well_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list billing periods: {}", e))
        })?;

        timer.observe_duration();

        Ok(periods)
    }

    /// Line items of a period, in allocation order.
    #[instrument(skip(self), fields(period_id = %period_id))]
    pub async fn list_line_items(
        &self,
        period_id: Uuid,
    ) -> Result<Vec<DistributionLineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_line_items"])
            .start_timer();

        let items = sqlx::query_as::<_, DistributionLineItem>(
            r#"
            SELECT line_item_id, period_id, field_id, owner_id, basis_duration, basis_area,
                basis_weight, share_percentage, amount, debt_id, created_utc
            FROM distribution_line_items
            WHERE period_id = $1
            ORDER BY field_id, owner_id NULLS LAST
            "#,
        )
        .bind(period_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list line items: {}", e))
        })?;

        timer.observe_duration();

        Ok(items)
    }

    #[instrument(skip(self), fields(period_id = %period_id))]
    pub async fn list_usage_summaries(
        &self,
        period_id: Uuid,
    ) -> Result<Vec<UsageSummary>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_usage_summaries"])
            .start_timer();

        let summaries = sqlx::query_as::<_, UsageSummary>(
            r#"
            SELECT s.summary_id, s.period_id, s.event_id, s.overlap_minutes, s.percentage,
                s.amount, s.created_utc
            FROM usage_summaries s
            JOIN usage_events e ON e.event_id = s.event_id
            WHERE s.period_id = $1
            ORDER BY e.start_utc, s.event_id
            "#,
        )
        .bind(period_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list usage summaries: {}", e))
        })?;

        timer.observe_duration();

        Ok(summaries)
    }

    #[instrument(skip(self), fields(period_id = %period_id))]
    pub async fn list_debts(&self, period_id: Uuid) -> Result<Vec<Debt>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_debts"])
            .start_timer();

        let debts = sqlx::query_as::<_, Debt>(
            r#"
            SELECT debt_id, tenant_id, period_id, debtor_id, creditor_id, amount, due_date,
                status, reason, paid_utc, created_utc
            FROM debts
            WHERE period_id = $1
            ORDER BY reason, debtor_id
            "#,
        )
        .bind(period_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list debts: {}", e)))?;

        timer.observe_duration();

        Ok(debts)
    }

    // =========================================================================
    // Payment Operations
    // =========================================================================

    /// Settle a distributed period paid in full by one owner.
    ///
    /// The period's pending bill debts become paid and every other owner
    /// now owes the payer their share.
    #[instrument(
        skip(self, input),
        fields(tenant_id = %input.tenant_id, period_id = %input.period_id)
    )]
    pub async fn record_payment(&self, input: &RecordPayment) -> Result<PaymentReceipt, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let period = lock_period(&mut tx, input.tenant_id, input.period_id).await?;
        if period.status() != BillingPeriodStatus::Distributed {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Billing period is {} and cannot take a payment",
                period.status
            )));
        }

        let settled = sqlx::query(
            r#"
            UPDATE debts
            SET status = $2, paid_utc = $3
            WHERE period_id = $1 AND reason = $4 AND status = $5
            "#,
        )
        .bind(input.period_id)
        .bind(DebtStatus::Paid.as_str())
        .bind(input.payment_utc)
        .bind(DebtReason::WellBill.as_str())
        .bind(DebtStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to settle debts: {}", e)))?
        .rows_affected();

        let shares = sqlx::query_as::<_, (Uuid, Decimal)>(
            r#"
            SELECT owner_id, SUM(amount)
            FROM distribution_line_items
            WHERE period_id = $1
              AND owner_id IS NOT NULL
              AND owner_id <> $2
            GROUP BY owner_id
            HAVING SUM(amount) > 0
            ORDER BY owner_id
            "#,
        )
        .bind(input.period_id)
        .bind(input.payer_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load owner shares: {}", e))
        })?;

        let due_date = input.payment_utc.date_naive();
        let mut reimbursement_debts = Vec::with_capacity(shares.len());
        for (debtor_id, amount) in shares {
            let debt = sqlx::query_as::<_, Debt>(
                r#"
                INSERT INTO debts (debt_id, tenant_id, period_id, debtor_id, creditor_id, amount,
                    due_date, status, reason)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING debt_id, tenant_id, period_id, debtor_id, creditor_id, amount,
                    due_date, status, reason, paid_utc, created_utc
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(input.tenant_id)
            .bind(input.period_id)
            .bind(debtor_id)
            .bind(input.payer_id)
            .bind(amount)
            .bind(due_date)
            .bind(DebtStatus::Pending.as_str())
            .bind(DebtReason::WellBillPayment.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to create reimbursement debt: {}",
                    e
                ))
            })?;
            reimbursement_debts.push(debt);
        }

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (payment_id, tenant_id, period_id, payer_id, recorded_by,
                amount, payment_utc, payment_method, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING payment_id, tenant_id, period_id, payer_id, recorded_by, amount,
                payment_utc, payment_method, notes, reversed_utc, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.period_id)
        .bind(input.payer_id)
        .bind(input.recorded_by)
        .bind(input.amount)
        .bind(input.payment_utc)
        .bind(input.payment_method.as_str())
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record payment: {}", e)))?;

        set_period_status(&mut tx, input.period_id, BillingPeriodStatus::Paid).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit payment: {}", e))
        })?;

        timer.observe_duration();
        info!(
            payment_id = %payment.payment_id,
            settled_debts = settled,
            reimbursement_debts = reimbursement_debts.len(),
            "Payment recorded"
        );

        Ok(PaymentReceipt {
            payment,
            settled_debts: settled,
            reimbursement_debts,
        })
    }

    /// Undo the payment of a paid period.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, period_id = %period_id))]
    pub async fn reverse_payment(
        &self,
        tenant_id: Uuid,
        period_id: Uuid,
    ) -> Result<BillingPeriod, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reverse_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let period = lock_period(&mut tx, tenant_id, period_id).await?;
        if period.status() != BillingPeriodStatus::Paid {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Billing period is {} and has no payment to reverse",
                period.status
            )));
        }

        let removed = sqlx::query(
            "DELETE FROM debts WHERE period_id = $1 AND reason = $2 AND status = $3",
        )
        .bind(period_id)
        .bind(DebtReason::WellBillPayment.as_str())
        .bind(DebtStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to remove reimbursement debts: {}", e))
        })?
        .rows_affected();

        sqlx::query(
            r#"
            UPDATE debts
            SET status = $3, paid_utc = NULL
            WHERE period_id = $1 AND reason = $2
            "#,
        )
        .bind(period_id)
        .bind(DebtReason::WellBill.as_str())
        .bind(DebtStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to reopen debts: {}", e)))?;

        sqlx::query(
            r#"
            UPDATE payments SET reversed_utc = NOW()
            WHERE period_id = $1 AND reversed_utc IS NULL
            "#,
        )
        .bind(period_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to reverse payment: {}", e))
        })?;

        let period =
            set_period_status(&mut tx, period_id, BillingPeriodStatus::Distributed).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit payment reversal: {}", e))
        })?;

        timer.observe_duration();
        info!(removed_debts = removed, "Payment reversed");

        Ok(period)
    }
}

async fn lock_period(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    tenant_id: Uuid,
    period_id: Uuid,
) -> Result<BillingPeriod, AppError> {
    sqlx::query_as::<_, BillingPeriod>(
        r#"
        SELECT period_id, tenant_id, well_id, start_utc, end_utc, total_amount, status,
            payment_due_date, invoice_number, invoice_date, version, created_utc, updated_utc
        FROM billing_periods
        WHERE tenant_id = $1 AND period_id = $2
        FOR UPDATE
        "#,
    )
    .bind(tenant_id)
    .bind(period_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock billing period: {}", e)))?
    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Billing period not found")))
}

async fn set_period_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    period_id: Uuid,
    status: BillingPeriodStatus,
) -> Result<BillingPeriod, AppError> {
    sqlx::query_as::<_, BillingPeriod>(
        r#"
        UPDATE billing_periods
        SET status = $2, version = version + 1, updated_utc = NOW()
        WHERE period_id = $1
        RETURNING period_id, tenant_id, well_id, start_utc, end_utc, total_amount, status,
            payment_due_date, invoice_number, invoice_date, version, created_utc, updated_utc
        "#,
    )
    .bind(period_id)
    .bind(status.as_str())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to update period status: {}", e))
    })
}

#[async_trait]
impl DistributionStore for Database {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, period_id = %period_id))]
    async fn get_period(
        &self,
        tenant_id: Uuid,
        period_id: Uuid,
    ) -> Result<Option<BillingPeriod>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_period"])
            .start_timer();

        let period = sqlx::query_as::<_, BillingPeriod>(
            r#"
            SELECT period_id, tenant_id, well_id, start_utc, end_utc, total_amount, status,
                payment_due_date, invoice_number, invoice_date, version, created_utc,
                updated_utc
            FROM billing_periods
            WHERE tenant_id = $1 AND period_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(period_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get billing period: {}", e))
        })?;

        timer.observe_duration();

        Ok(period)
    }

    #[instrument(skip(self), fields(period_id = %period_id))]
    async fn count_line_items(&self, period_id: Uuid) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_line_items"])
            .start_timer();

        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM distribution_line_items WHERE period_id = $1",
        )
        .bind(period_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to count line items: {}", e))
        })?;

        timer.observe_duration();

        Ok(count)
    }

    #[instrument(
        skip(self, claim),
        fields(period_id = %claim.period_id, version = claim.expected_version)
    )]
    async fn claim_period(&self, claim: &PeriodClaim) -> Result<Option<BillingPeriod>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["claim_period"])
            .start_timer();

        let period = sqlx::query_as::<_, BillingPeriod>(
            r#"
            UPDATE billing_periods
            SET status = $3,
                total_amount = $4,
                invoice_number = $5,
                invoice_date = $6,
                version = version + 1,
                updated_utc = NOW()
            WHERE period_id = $1 AND version = $2 AND status = $7
            RETURNING period_id, tenant_id, well_id, start_utc, end_utc, total_amount, status,
                payment_due_date, invoice_number, invoice_date, version, created_utc,
                updated_utc
            "#,
        )
        .bind(claim.period_id)
        .bind(claim.expected_version)
        .bind(BillingPeriodStatus::Distributing.as_str())
        .bind(claim.total_amount)
        .bind(&claim.invoice_number)
        .bind(claim.invoice_date)
        .bind(BillingPeriodStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to claim billing period: {}", e))
        })?;

        timer.observe_duration();

        if period.is_none() {
            warn!("Billing period claim lost to a concurrent update");
        }

        Ok(period)
    }

    #[instrument(skip(self), fields(period_id = %period_id))]
    async fn release_period(&self, period_id: Uuid) -> Result<BillingPeriod, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["release_period"])
            .start_timer();

        let period = sqlx::query_as::<_, BillingPeriod>(
            r#"
            UPDATE billing_periods
            SET status = $2, version = version + 1, updated_utc = NOW()
            WHERE period_id = $1 AND status = $3
            RETURNING period_id, tenant_id, well_id, start_utc, end_utc, total_amount, status,
                payment_due_date, invoice_number, invoice_date, version, created_utc,
                updated_utc
            "#,
        )
        .bind(period_id)
        .bind(BillingPeriodStatus::Pending.as_str())
        .bind(BillingPeriodStatus::Distributing.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to release billing period: {}", e))
        })?
        .ok_or_else(|| {
            AppError::Conflict(anyhow::anyhow!("Billing period is no longer claimed"))
        })?;

        timer.observe_duration();

        Ok(period)
    }

    #[instrument(skip(self), fields(well_id = %well_id))]
    async fn list_usage_events(
        &self,
        well_id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_usage_events"])
            .start_timer();

        let mut events = sqlx::query_as::<_, UsageEvent>(
            r#"
            SELECT event_id, well_id, start_utc, duration_minutes
            FROM usage_events
            WHERE well_id = $1 AND start_utc <= $2
            ORDER BY start_utc, event_id
            "#,
        )
        .bind(well_id)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list usage events: {}", e))
        })?;

        let event_ids: Vec<Uuid> = events.iter().map(|e| e.event_id).collect();
        let shares = sqlx::query_as::<_, FieldShare>(
            r#"
            SELECT event_id, field_id, percentage, actual_area
            FROM usage_event_fields
            WHERE event_id = ANY($1)
            ORDER BY event_id, field_id
            "#,
        )
        .bind(&event_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list field shares: {}", e))
        })?;

        let mut by_event: HashMap<Uuid, Vec<FieldShare>> = HashMap::new();
        for share in shares {
            by_event.entry(share.event_id).or_default().push(share);
        }
        for event in &mut events {
            event.shares = by_event.remove(&event.event_id).unwrap_or_default();
        }

        timer.observe_duration();

        Ok(events)
    }

    #[instrument(skip(self, field_ids), fields(fields = field_ids.len()))]
    async fn list_field_ownerships(
        &self,
        field_ids: &[Uuid],
    ) -> Result<Vec<FieldOwnership>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_field_ownerships"])
            .start_timer();

        let ownerships = sqlx::query_as::<_, FieldOwnership>(
            r#"
            SELECT field_id, owner_id, percentage
            FROM field_ownerships
            WHERE field_id = ANY($1)
            ORDER BY field_id, owner_id
            "#,
        )
        .bind(field_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list field ownerships: {}", e))
        })?;

        timer.observe_duration();

        Ok(ownerships)
    }

    #[instrument(
        skip(self, commit),
        fields(period_id = %commit.period_id, line_items = commit.line_items.len())
    )]
    async fn commit_distribution(
        &self,
        commit: &DistributionCommit,
    ) -> Result<BillingPeriod, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["commit_distribution"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Debts first: line items reference them.
        for debt in &commit.debts {
            sqlx::query(
                r#"
                INSERT INTO debts (debt_id, tenant_id, period_id, debtor_id, creditor_id, amount,
                    due_date, status, reason, paid_utc, created_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(debt.debt_id)
            .bind(debt.tenant_id)
            .bind(debt.period_id)
            .bind(debt.debtor_id)
            .bind(debt.creditor_id)
            .bind(debt.amount)
            .bind(debt.due_date)
            .bind(&debt.status)
            .bind(&debt.reason)
            .bind(debt.paid_utc)
            .bind(debt.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert debt: {}", e))
            })?;
        }

        for item in &commit.line_items {
            sqlx::query(
                r#"
                INSERT INTO distribution_line_items (line_item_id, period_id, field_id, owner_id,
                    basis_duration, basis_area, basis_weight, share_percentage, amount, debt_id,
                    created_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(item.line_item_id)
            .bind(item.period_id)
            .bind(item.field_id)
            .bind(item.owner_id)
            .bind(item.basis_duration)
            .bind(item.basis_area)
            .bind(item.basis_weight)
            .bind(item.share_percentage)
            .bind(item.amount)
            .bind(item.debt_id)
            .bind(item.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert line item: {}", e))
            })?;
        }

        for summary in &commit.usage_summaries {
            sqlx::query(
                r#"
                INSERT INTO usage_summaries (summary_id, period_id, event_id, overlap_minutes,
                    percentage, amount, created_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(summary.summary_id)
            .bind(summary.period_id)
            .bind(summary.event_id)
            .bind(summary.overlap_minutes)
            .bind(summary.percentage)
            .bind(summary.amount)
            .bind(summary.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert usage summary: {}", e))
            })?;
        }

        let period = sqlx::query_as::<_, BillingPeriod>(
            r#"
            UPDATE billing_periods
            SET status = $2, version = version + 1, updated_utc = NOW()
            WHERE period_id = $1 AND status = $3
            RETURNING period_id, tenant_id, well_id, start_utc, end_utc, total_amount, status,
                payment_due_date, invoice_number, invoice_date, version, created_utc,
                updated_utc
            "#,
        )
        .bind(commit.period_id)
        .bind(BillingPeriodStatus::Distributed.as_str())
        .bind(BillingPeriodStatus::Distributing.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark period distributed: {}", e))
        })?
        .ok_or_else(|| {
            AppError::Conflict(anyhow::anyhow!("Billing period is no longer claimed"))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit distribution: {}", e))
        })?;

        timer.observe_duration();

        Ok(period)
    }
}
