use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    auth::TenantContext,
    dto::lineage::{
        BatchTimelineResponse, CreateBatchRequest, CreateBatchResult, GravityReadingResult,
        RecordGravityReadingRequest,
    },
    errors::ServiceError,
    handlers::common::ValidatedJson,
    AppState,
};

/// Schedule batch
#[utoipa::path(
    post,
    path = "/api/v1/batches",
    summary = "Schedule batch",
    description = "Create a batch with its initial fermentation lot. With a tank the batch starts FERMENTING; without one it stays PLANNED.",
    request_body = CreateBatchRequest,
    responses(
        (status = 201, description = "Batch scheduled", body = CreateBatchResult),
        (status = 400, description = "Invalid request or duplicate batch number", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing tenant context", body = crate::errors::ErrorResponse),
        (status = 404, description = "Recipe or tank not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Tank not available", body = crate::errors::ErrorResponse),
        (status = 422, description = "Volume exceeds tank capacity", body = crate::errors::ErrorResponse),
    ),
    tag = "batches"
)]
pub async fn create_batch(
    State(state): State<AppState>,
    ctx: TenantContext,
    ValidatedJson(request): ValidatedJson<CreateBatchRequest>,
) -> Result<(StatusCode, Json<CreateBatchResult>), ServiceError> {
    let result = state
        .lineage
        .create_batch(&ctx.tenant_id, ctx.user_id(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// Record gravity reading
#[utoipa::path(
    post,
    path = "/api/v1/batches/{id}/gravity-readings",
    summary = "Record gravity reading",
    description = "Add a reading; the first reading (or one noted OG) sets original gravity, one noted FG sets final gravity",
    params(("id" = Uuid, Path, description = "Batch ID")),
    request_body = RecordGravityReadingRequest,
    responses(
        (status = 201, description = "Reading recorded", body = GravityReadingResult),
        (status = 400, description = "Invalid reading", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing tenant context", body = crate::errors::ErrorResponse),
        (status = 404, description = "Batch not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Batch completed", body = crate::errors::ErrorResponse),
    ),
    tag = "batches"
)]
pub async fn record_gravity_reading(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<RecordGravityReadingRequest>,
) -> Result<(StatusCode, Json<GravityReadingResult>), ServiceError> {
    let result = state
        .lineage
        .record_gravity_reading(&ctx.tenant_id, ctx.user_id(), id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// Batch timeline
#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}/timeline",
    summary = "Batch timeline",
    description = "Audit entries for a batch, oldest first",
    params(("id" = Uuid, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Timeline retrieved", body = BatchTimelineResponse),
        (status = 401, description = "Missing tenant context", body = crate::errors::ErrorResponse),
        (status = 404, description = "Batch not found", body = crate::errors::ErrorResponse),
    ),
    tag = "batches"
)]
pub async fn batch_timeline(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchTimelineResponse>, ServiceError> {
    Ok(Json(state.lineage.batch_timeline(&ctx.tenant_id, id).await?))
}
