/*!
 * # Tenant context
 *
 * Authentication happens upstream. The gateway forwards the resolved tenant
 * and user as `x-tenant-id` and `x-user-id`; every lineage handler extracts
 * them through [`TenantContext`] and scopes all store access to the tenant.
 */

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

use crate::errors::ServiceError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";

const MAX_ID_LEN: usize = 128;

/// Caller identity forwarded by the authentication middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: Option<String>,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_ID_LEN)
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header_value(parts, TENANT_HEADER).ok_or_else(|| {
            debug!(uri = %parts.uri, "Request without tenant context");
            ServiceError::Unauthorized("missing tenant context".to_string())
        })?;

        Ok(TenantContext {
            tenant_id,
            user_id: header_value(parts, USER_HEADER),
        })
    }
}
