use axum::{extract::State, response::Json};
use tracing::instrument;

use crate::{
    auth::TenantContext,
    dto::lineage::{LineageOperation, OperationResult},
    errors::ServiceError,
    handlers::common::ValidatedJson,
    AppState,
};

/// Execute lineage operation
#[utoipa::path(
    post,
    path = "/api/v1/operations",
    summary = "Execute lineage operation",
    description = "Single entry point taking a tagged body: {\"operation\": \"split\" | \"blend\" | \"package\" | \"complete\" | \"advance\", ...}. Each variant runs the same command as its dedicated route.",
    request_body = LineageOperation,
    responses(
        (status = 200, description = "Operation applied", body = OperationResult),
        (status = 400, description = "Unknown operation or invalid body", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing tenant context", body = crate::errors::ErrorResponse),
        (status = 404, description = "Referenced entity not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invalid state or stale version", body = crate::errors::ErrorResponse),
        (status = 422, description = "Volume or compatibility rule violated", body = crate::errors::ErrorResponse),
    ),
    tag = "operations"
)]
#[instrument(skip(state, operation), fields(tenant_id = %ctx.tenant_id, operation = operation.name()))]
pub async fn execute_operation(
    State(state): State<AppState>,
    ctx: TenantContext,
    ValidatedJson(operation): ValidatedJson<LineageOperation>,
) -> Result<Json<OperationResult>, ServiceError> {
    let result = state
        .lineage
        .execute_operation(&ctx.tenant_id, ctx.user_id(), operation)
        .await?;
    Ok(Json(result))
}
