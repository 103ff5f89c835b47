//! HTTP handlers for well-billing-service.

pub mod distribution;
pub mod payments;
pub mod periods;
