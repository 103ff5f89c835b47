//! Services module for well-billing-service.

pub mod database;
pub mod distribution;
pub mod metrics;
pub mod store;

pub use database::Database;
pub use distribution::{
    DistributeBill, DistributionOutcome, DistributionReport, DistributionService, UnownedField,
};
pub use metrics::{
    get_metrics, init_metrics, record_distributed_amount, record_distribution, record_error,
    record_period_operation, record_unowned_field,
};
pub use store::{DistributionCommit, DistributionStore, PeriodClaim};
