use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::TenantContext,
    dto::lineage::{
        AdvanceLotPhaseRequest, AdvanceLotPhaseResult, BlendLotsRequest, BlendLotsResult,
        CompleteLotRequest, CompleteLotResult, ListLotsQuery, LotListResponse, LotView,
        SplitLotRequest, SplitLotResult, VolumeInfo,
    },
    errors::ServiceError,
    handlers::common::{OptionalJson, StrictQuery, ValidatedJson},
    AppState,
};

/// List lots
#[utoipa::path(
    get,
    path = "/api/v1/lots",
    summary = "List lots",
    description = "Active lots with derived lineage, phase progress and aggregate stats. Split parents never appear; COMPLETED lots only with active_only=false or status=COMPLETED. lot_id or lot_number look up any single lot.",
    params(ListLotsQuery),
    responses(
        (status = 200, description = "Lots retrieved", body = LotListResponse,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid query parameters", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing tenant context", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "lots"
)]
#[instrument(skip(state, query), fields(tenant_id = %ctx.tenant_id))]
pub async fn list_lots(
    State(state): State<AppState>,
    ctx: TenantContext,
    StrictQuery(query): StrictQuery<ListLotsQuery>,
) -> Result<Json<LotListResponse>, ServiceError> {
    let lots = state.lineage.list_lots(&ctx.tenant_id, &query).await?;
    Ok(Json(lots))
}

/// Get lot
#[utoipa::path(
    get,
    path = "/api/v1/lots/{id}",
    summary = "Get lot",
    description = "A single lot of the tenant, including consumed and completed ones",
    params(("id" = Uuid, Path, description = "Lot ID")),
    responses(
        (status = 200, description = "Lot retrieved", body = LotView),
        (status = 401, description = "Missing tenant context", body = crate::errors::ErrorResponse),
        (status = 404, description = "Lot not found", body = crate::errors::ErrorResponse),
    ),
    tag = "lots"
)]
pub async fn get_lot(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<Json<LotView>, ServiceError> {
    Ok(Json(state.lineage.get_lot(&ctx.tenant_id, id).await?))
}

/// Lot volume
#[utoipa::path(
    get,
    path = "/api/v1/lots/{id}/volume",
    summary = "Lot volume",
    description = "Total, packaged and remaining volume of a lot in liters",
    params(("id" = Uuid, Path, description = "Lot ID")),
    responses(
        (status = 200, description = "Volume computed", body = VolumeInfo),
        (status = 401, description = "Missing tenant context", body = crate::errors::ErrorResponse),
        (status = 404, description = "Lot not found", body = crate::errors::ErrorResponse),
    ),
    tag = "lots"
)]
pub async fn lot_volume(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<Json<VolumeInfo>, ServiceError> {
    Ok(Json(state.lineage.volume_info(&ctx.tenant_id, id).await?))
}

/// Split lot
#[utoipa::path(
    post,
    path = "/api/v1/lots/split",
    summary = "Split lot",
    description = "Divide an ACTIVE lot into child lots, each in its own tank",
    request_body = SplitLotRequest,
    responses(
        (status = 200, description = "Lot split", body = SplitLotResult),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing tenant context", body = crate::errors::ErrorResponse),
        (status = 404, description = "Lot or tank not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Lot not splittable, tank busy or stale version", body = crate::errors::ErrorResponse),
        (status = 422, description = "Volume exceeds lot or tank capacity", body = crate::errors::ErrorResponse),
    ),
    tag = "lots"
)]
pub async fn split_lot(
    State(state): State<AppState>,
    ctx: TenantContext,
    ValidatedJson(request): ValidatedJson<SplitLotRequest>,
) -> Result<Json<SplitLotResult>, ServiceError> {
    let result = state
        .lineage
        .split_lot(&ctx.tenant_id, ctx.user_id(), request)
        .await?;
    Ok(Json(result))
}

/// Blend lots
#[utoipa::path(
    post,
    path = "/api/v1/lots/blend",
    summary = "Blend lots",
    description = "Combine two or more ACTIVE lots (or the lots of the given batches) into a new lot in the target tank",
    request_body = BlendLotsRequest,
    responses(
        (status = 200, description = "Lots blended", body = BlendLotsResult),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing tenant context", body = crate::errors::ErrorResponse),
        (status = 404, description = "Source or tank not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Sources not blendable or tank busy", body = crate::errors::ErrorResponse),
        (status = 422, description = "Volume exceeded or incompatible blend", body = crate::errors::ErrorResponse),
    ),
    tag = "lots"
)]
pub async fn blend_lots(
    State(state): State<AppState>,
    ctx: TenantContext,
    ValidatedJson(request): ValidatedJson<BlendLotsRequest>,
) -> Result<Json<BlendLotsResult>, ServiceError> {
    let result = state
        .lineage
        .blend_lots(&ctx.tenant_id, ctx.user_id(), request)
        .await?;
    Ok(Json(result))
}

/// Complete lot
#[utoipa::path(
    post,
    path = "/api/v1/lots/{id}/complete",
    summary = "Complete lot",
    description = "Close a lot manually, e.g. after dumping a residual. Frees its tank and completes finished batches.",
    params(("id" = Uuid, Path, description = "Lot ID")),
    request_body = CompleteLotRequest,
    responses(
        (status = 200, description = "Lot completed", body = CompleteLotResult),
        (status = 401, description = "Missing tenant context", body = crate::errors::ErrorResponse),
        (status = 404, description = "Lot not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Lot already completed or split", body = crate::errors::ErrorResponse),
    ),
    tag = "lots"
)]
pub async fn complete_lot(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    OptionalJson(request): OptionalJson<CompleteLotRequest>,
) -> Result<Json<CompleteLotResult>, ServiceError> {
    let result = state
        .lineage
        .complete_lot(&ctx.tenant_id, ctx.user_id(), id, request)
        .await?;
    Ok(Json(result))
}

/// Advance lot phase
#[utoipa::path(
    post,
    path = "/api/v1/lots/{id}/advance",
    summary = "Advance lot phase",
    description = "Move a lot to its next (or a later) phase, optionally transferring it to another tank",
    params(("id" = Uuid, Path, description = "Lot ID")),
    request_body = AdvanceLotPhaseRequest,
    responses(
        (status = 200, description = "Lot advanced", body = AdvanceLotPhaseResult),
        (status = 401, description = "Missing tenant context", body = crate::errors::ErrorResponse),
        (status = 404, description = "Lot or tank not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Lot cannot advance or tank busy", body = crate::errors::ErrorResponse),
        (status = 422, description = "Tank too small", body = crate::errors::ErrorResponse),
    ),
    tag = "lots"
)]
pub async fn advance_lot(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    OptionalJson(request): OptionalJson<AdvanceLotPhaseRequest>,
) -> Result<Json<AdvanceLotPhaseResult>, ServiceError> {
    let result = state
        .lineage
        .advance_lot(&ctx.tenant_id, ctx.user_id(), id, request)
        .await?;
    Ok(Json(result))
}
