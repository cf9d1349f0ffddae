use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lot Lineage API",
        version = "1.0.0",
        description = r#"
# Brewery lot lineage

Tracks batches from fermentation through conditioning and packaging. Lots can
be split into child lots, blended into a new lot and packaged in partial runs;
list endpoints return the current state with consumed intermediates hidden.

## Tenancy

Every endpoint under `/api/v1` requires the `x-tenant-id` header set by the
upstream authentication layer. `x-user-id` is recorded as the actor when present.

## Errors

```json
{
  "error": "Conflict",
  "message": "Conflict: lot BRW-2025-0007 was modified concurrently",
  "code": "CONFLICT",
  "retryable": true,
  "request_id": "req-abc123",
  "timestamp": "2025-03-09T10:30:00Z"
}
```

Capacity errors (`VOLUME_EXCEEDED`, `INSUFFICIENT_VOLUME`) carry
`details.available_volume` and `details.requested_volume`.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "lots", description = "Lot lineage reads, split, blend, completion and phase changes"),
        (name = "packaging", description = "Packaging runs and automatic lot completion"),
        (name = "batches", description = "Batch scheduling, gravity readings and timeline"),
        (name = "operations", description = "Tagged single entry point for lineage operations"),
        (name = "health", description = "Health checks")
    ),
    paths(
        crate::handlers::lots::list_lots,
        crate::handlers::lots::get_lot,
        crate::handlers::lots::lot_volume,
        crate::handlers::lots::split_lot,
        crate::handlers::lots::blend_lots,
        crate::handlers::lots::complete_lot,
        crate::handlers::lots::advance_lot,
        crate::handlers::packaging::record_packaging,
        crate::handlers::batches::create_batch,
        crate::handlers::batches::record_gravity_reading,
        crate::handlers::batches::batch_timeline,
        crate::handlers::operations::execute_operation,
        crate::health::health,
    ),
    components(
        schemas(
            crate::dto::lineage::SplitTarget,
            crate::dto::lineage::SplitLotRequest,
            crate::dto::lineage::SourceVolume,
            crate::dto::lineage::BlendLotsRequest,
            crate::dto::lineage::RecordPackagingRequest,
            crate::dto::lineage::CompleteLotRequest,
            crate::dto::lineage::AdvanceLotPhaseRequest,
            crate::dto::lineage::CreateBatchRequest,
            crate::dto::lineage::RecordGravityReadingRequest,
            crate::dto::lineage::CompleteLotOperation,
            crate::dto::lineage::AdvanceLotOperation,
            crate::dto::lineage::LineageOperation,
            crate::dto::lineage::TankView,
            crate::dto::lineage::LotBatchView,
            crate::dto::lineage::LotView,
            crate::dto::lineage::LotStats,
            crate::dto::lineage::LotListResponse,
            crate::dto::lineage::VolumeInfo,
            crate::dto::lineage::SplitChild,
            crate::dto::lineage::SplitLotResult,
            crate::dto::lineage::BlendLotsResult,
            crate::dto::lineage::PackagingRunView,
            crate::dto::lineage::RecordPackagingResult,
            crate::dto::lineage::CompleteLotResult,
            crate::dto::lineage::AdvanceLotPhaseResult,
            crate::dto::lineage::CreateBatchResult,
            crate::dto::lineage::GravityReadingResult,
            crate::dto::lineage::TimelineEntryView,
            crate::dto::lineage::BatchTimelineResponse,
            crate::dto::lineage::OperationResult,
            crate::entities::LotPhase,
            crate::entities::LotStatus,
            crate::entities::PackageType,
            crate::lineage::LotType,
            crate::lineage::SourceLot,
            crate::lineage::progress::ConditioningProgress,
            crate::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_lineage_routes() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string(&openapi).unwrap();
        assert!(json.contains("Lot Lineage API"));
        for path in [
            "/api/v1/lots",
            "/api/v1/lots/{id}/volume",
            "/api/v1/lots/split",
            "/api/v1/lots/blend",
            "/api/v1/packaging",
            "/api/v1/operations",
            "/api/v1/batches/{id}/timeline",
        ] {
            assert!(json.contains(path), "missing {path}");
        }
        assert!(json.contains("INSUFFICIENT_VOLUME"));
    }
}
