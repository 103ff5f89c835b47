//! Whole-period payment handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{PaymentResponse, RecordPaymentRequest, ReversePaymentResponse},
    middleware::TenantContext,
    models::RecordPayment,
    services::record_period_operation,
    startup::AppState,
};

#[tracing::instrument(
    skip(state, tenant, request),
    fields(tenant_id = %tenant.tenant_id, period_id = %period_id)
)]
pub async fn record_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(period_id): Path<Uuid>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    tenant.require_manager()?;
    request.validate()?;

    let receipt = state
        .db
        .record_payment(&RecordPayment {
            tenant_id: tenant.tenant_id,
            period_id,
            payer_id: request.payer_id,
            recorded_by: tenant.user_id,
            amount: request.amount,
            payment_utc: request.payment_utc,
            payment_method: request.payment_method,
            notes: request.notes,
        })
        .await?;

    record_period_operation(&tenant.tenant_id.to_string(), "record_payment");

    Ok((StatusCode::CREATED, Json(receipt.into())))
}

#[tracing::instrument(
    skip(state, tenant),
    fields(tenant_id = %tenant.tenant_id, period_id = %period_id)
)]
pub async fn reverse_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(period_id): Path<Uuid>,
) -> Result<Json<ReversePaymentResponse>, AppError> {
    tenant.require_manager()?;

    let period = state.db.reverse_payment(tenant.tenant_id, period_id).await?;

    record_period_operation(&tenant.tenant_id.to_string(), "reverse_payment");

    Ok(Json(ReversePaymentResponse {
        message: "Payment reversed and reimbursement debts cancelled".to_string(),
        period: period.into(),
    }))
}
