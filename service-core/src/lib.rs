//! service-core: Shared HTTP infrastructure (errors, configuration,
//! request middleware and logging) for the well billing services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

pub use axum;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use validator;
