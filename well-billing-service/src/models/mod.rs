//! Domain models for well-billing-service.

mod debt;
mod distribution;
mod ownership;
mod payment;
mod period;
mod usage;
mod well;

pub use debt::{Debt, DebtReason, DebtStatus};
pub use distribution::{DistributionLineItem, UsageSummary};
pub use ownership::FieldOwnership;
pub use payment::{Payment, PaymentMethod, PaymentReceipt, RecordPayment};
pub use period::{
    BillingPeriod, BillingPeriodStatus, CreateBillingPeriod, InvoiceMeta, ListBillingPeriodsFilter,
};
pub use usage::{FieldShare, RecordUsageEvent, UsageEvent};
pub use well::Well;
