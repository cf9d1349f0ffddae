use axum::{extract::State, response::Json};
use tracing::instrument;

use crate::{
    auth::TenantContext,
    dto::lineage::{RecordPackagingRequest, RecordPackagingResult},
    errors::ServiceError,
    handlers::common::ValidatedJson,
    AppState,
};

/// Record packaging run
#[utoipa::path(
    post,
    path = "/api/v1/packaging",
    summary = "Record packaging run",
    description = "Package part of a lot. The lot is resolved from lot_id, lot_number or the referenced batches; it completes automatically once its volume is used up.",
    request_body = RecordPackagingRequest,
    responses(
        (status = 200, description = "Packaging recorded", body = RecordPackagingResult,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request or ambiguous lot", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing tenant context", body = crate::errors::ErrorResponse),
        (status = 404, description = "Lot or batch not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Lot completed or batch not ready", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient volume; details carry available_volume and requested_volume", body = crate::errors::ErrorResponse),
    ),
    tag = "packaging"
)]
#[instrument(skip(state, request), fields(tenant_id = %ctx.tenant_id))]
pub async fn record_packaging(
    State(state): State<AppState>,
    ctx: TenantContext,
    ValidatedJson(request): ValidatedJson<RecordPackagingRequest>,
) -> Result<Json<RecordPackagingResult>, ServiceError> {
    let result = state
        .lineage
        .record_packaging(&ctx.tenant_id, ctx.user_id(), request)
        .await?;
    Ok(Json(result))
}
