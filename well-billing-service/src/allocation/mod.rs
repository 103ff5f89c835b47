//! Pure apportionment engine: interval overlap weights and proportional
//! currency distribution. No I/O happens here.

pub mod distributor;
pub mod overlap;

pub use distributor::{distribute, round_currency, Allocation, Share, CURRENCY_SCALE};
pub use overlap::{
    compute_field_weights, overlap_minutes, total_weight, BillingWindow, FieldWeight,
};
