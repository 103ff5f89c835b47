//! Request and response bodies of the HTTP API.

mod distribution;
mod payment;
mod period;

pub use distribution::{DistributeBillRequest, DistributionResponse};
pub use payment::{PaymentResponse, RecordPaymentRequest, ReversePaymentResponse};
pub use period::{
    BillingPeriodDetailResponse, BillingPeriodResponse, CreateBillingPeriodRequest,
    ListBillingPeriodsQuery,
};

use rust_decimal::Decimal;
use validator::ValidationError;

pub(crate) fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("Amount must not be negative".into());
        return Err(err);
    }
    Ok(())
}

pub(crate) fn validate_positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut err = ValidationError::new("positive");
        err.message = Some("Amount must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}
