//! Tenant context extractor.
//!
//! Extracts tenant, user and role from request headers. These headers are set
//! by the authenticating front end; the service does not verify credentials.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

/// Role of the requesting user within the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Admin,
    Owner,
    Member,
}

impl UserRole {
    pub fn from_header(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "ADMIN" => UserRole::Admin,
            "OWNER" => UserRole::Owner,
            _ => UserRole::Member,
        }
    }

    /// Whether the role may create periods, distribute bills and record payments.
    pub fn can_manage_billing(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Owner)
    }
}

/// Tenant context extracted from request headers.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: UserRole,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid, user_id: Uuid, role: UserRole) -> Self {
        Self {
            tenant_id,
            user_id,
            role,
        }
    }

    /// Reject users that may only read.
    pub fn require_manager(&self) -> Result<(), AppError> {
        if self.role.can_manage_billing() {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "Only admins and owners can manage well billing"
            )))
        }
    }
}

fn uuid_header(parts: &Parts, name: &str) -> Result<Uuid, AppError> {
    let value = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Missing {} header", name)))?;

    Uuid::parse_str(value)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid {} header", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = uuid_header(parts, "X-Tenant-ID")?;
        let user_id = uuid_header(parts, "X-User-ID")?;

        // Missing role means read-only access
        let role = parts
            .headers
            .get("X-User-Role")
            .and_then(|v| v.to_str().ok())
            .map(UserRole::from_header)
            .unwrap_or(UserRole::Member);

        let span = tracing::Span::current();
        span.record("tenant_id", tenant_id.to_string().as_str());
        span.record("user_id", user_id.to_string().as_str());

        Ok(TenantContext::new(tenant_id, user_id, role))
    }
}
