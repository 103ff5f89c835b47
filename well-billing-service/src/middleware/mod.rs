//! Request extractors for well-billing-service.

pub mod tenant;

pub use tenant::{TenantContext, UserRole};
