use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{DistributeBillRequest, DistributionResponse},
    middleware::TenantContext,
    services::DistributeBill,
    startup::AppState,
};

/// Distribute a period's bill across field owners.
#[tracing::instrument(
    skip(state, tenant, request),
    fields(tenant_id = %tenant.tenant_id, period_id = %period_id)
)]
pub async fn distribute_bill(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(period_id): Path<Uuid>,
    Json(request): Json<DistributeBillRequest>,
) -> Result<Json<DistributionResponse>, AppError> {
    tenant.require_manager()?;
    request.validate()?;

    let outcome = state
        .distribution
        .run_distribution(&DistributeBill {
            tenant_id: tenant.tenant_id,
            requested_by: tenant.user_id,
            period_id,
            well_id: request.well_id,
            total_amount: request.total_amount,
            invoice_number: request.invoice_number,
            invoice_date: request.invoice_date,
        })
        .await?;

    Ok(Json(outcome.into()))
}
