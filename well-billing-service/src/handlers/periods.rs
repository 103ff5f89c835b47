//! Billing period handlers. All lookups are scoped to the caller's tenant.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        BillingPeriodDetailResponse, BillingPeriodResponse, CreateBillingPeriodRequest,
        ListBillingPeriodsQuery,
    },
    middleware::TenantContext,
    models::{BillingPeriodStatus, CreateBillingPeriod, ListBillingPeriodsFilter},
    services::{record_period_operation, DistributionStore},
    startup::AppState,
};

const DEFAULT_PAGE_SIZE: i32 = 50;

/// Open a pending billing period for a well.
#[tracing::instrument(skip(state, tenant, request), fields(tenant_id = %tenant.tenant_id))]
pub async fn create_billing_period(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(well_id): Path<Uuid>,
    Json(request): Json<CreateBillingPeriodRequest>,
) -> Result<(StatusCode, Json<BillingPeriodResponse>), AppError> {
    tenant.require_manager()?;
    request.validate()?;

    state
        .db
        .get_well(tenant.tenant_id, well_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Well not found")))?;

    let period = state
        .db
        .create_billing_period(&CreateBillingPeriod {
            tenant_id: tenant.tenant_id,
            well_id,
            start_utc: request.start_utc,
            end_utc: request.end_utc,
            payment_due_date: request.payment_due_date,
        })
        .await?;

    record_period_operation(&tenant.tenant_id.to_string(), "create");

    Ok((StatusCode::CREATED, Json(period.into())))
}

/// List a well's billing periods, newest first.
#[tracing::instrument(skip(state, tenant, query), fields(tenant_id = %tenant.tenant_id))]
pub async fn list_billing_periods(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(well_id): Path<Uuid>,
    Query(query): Query<ListBillingPeriodsQuery>,
) -> Result<Json<Vec<BillingPeriodResponse>>, AppError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;

    state
        .db
        .get_well(tenant.tenant_id, well_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Well not found")))?;

    let filter = ListBillingPeriodsFilter {
        status,
        page_size: query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    };
    let periods = state
        .db
        .list_billing_periods(tenant.tenant_id, well_id, &filter)
        .await?;

    Ok(Json(periods.into_iter().map(Into::into).collect()))
}

/// A period with its line items, usage summaries and debts.
#[tracing::instrument(skip(state, tenant), fields(tenant_id = %tenant.tenant_id))]
pub async fn get_billing_period(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(period_id): Path<Uuid>,
) -> Result<Json<BillingPeriodDetailResponse>, AppError> {
    let period = state
        .db
        .get_period(tenant.tenant_id, period_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Billing period not found")))?;

    let line_items = state.db.list_line_items(period_id).await?;
    let usage_summaries = state.db.list_usage_summaries(period_id).await?;
    let debts = state.db.list_debts(period_id).await?;

    Ok(Json(BillingPeriodDetailResponse {
        period: period.into(),
        line_items,
        usage_summaries,
        debts,
    }))
}

fn parse_status(status: &str) -> Result<BillingPeriodStatus, AppError> {
    match status {
        "pending" => Ok(BillingPeriodStatus::Pending),
        "distributing" => Ok(BillingPeriodStatus::Distributing),
        "distributed" => Ok(BillingPeriodStatus::Distributed),
        "paid" => Ok(BillingPeriodStatus::Paid),
        other => Err(AppError::BadRequest(anyhow::anyhow!(
            "Unknown billing period status: {}",
            other
        ))),
    }
}
