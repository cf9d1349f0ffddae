use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    commands::{
        batches::{CreateBatchCommand, RecordGravityReadingCommand},
        lots::{
            AdvanceLotPhaseCommand, BlendLotsCommand, CompleteLotCommand, RecordPackagingCommand,
            SplitLotCommand,
        },
        Command,
    },
    config::LineageConfig,
    db::DbPool,
    dto::lineage::{
        AdvanceLotPhaseRequest, AdvanceLotPhaseResult, BatchTimelineResponse, BlendLotsRequest,
        BlendLotsResult, CompleteLotRequest, CompleteLotResult, CreateBatchRequest,
        CreateBatchResult, GravityReadingResult, LineageOperation, ListLotsQuery, LotBatchView,
        LotListResponse, LotStats, LotView, OperationResult, RecordGravityReadingRequest,
        RecordPackagingRequest, RecordPackagingResult, SplitLotRequest, SplitLotResult, TankView,
        TimelineEntryView, VolumeInfo,
    },
    entities::{lot, LotStatus},
    errors::ServiceError,
    events::EventSender,
    lineage::{
        progress::{conditioning_for, phase_progress, resolve_tank_id, summarize_gravity},
        resolver::lot_volume,
        round_volume, LineageGraph, LineagePolicy, LotSelection,
    },
    repositories::LineageRepository,
};

/// Lot lineage reads and the entry point for every lineage command.
#[derive(Clone)]
pub struct LineageService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    config: Arc<LineageConfig>,
}

impl LineageService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<LineageConfig>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            config,
        }
    }

    pub fn policy(&self, tenant_id: &str) -> LineagePolicy {
        self.config.policy_for(tenant_id)
    }

    async fn run<C: Command>(&self, command: C) -> Result<C::Result, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Lists lots with derived lineage fields and aggregate stats.
    ///
    /// Without `lot_id` or `lot_number` only visible lots are listed: split
    /// parents never appear, COMPLETED lots only when `active_only=false` or
    /// when filtering on that status. Stats cover every match, the limit only
    /// trims `lots`.
    #[instrument(skip(self, query), fields(tenant_id = %tenant_id))]
    pub async fn list_lots(
        &self,
        tenant_id: &str,
        query: &ListLotsQuery,
    ) -> Result<LotListResponse, ServiceError> {
        let repo = LineageRepository::new(self.db_pool.as_ref(), tenant_id);
        let snapshot = repo.load_snapshot().await?;
        let graph = LineageGraph::new(&snapshot);
        let policy = self.policy(tenant_id);
        let now = Utc::now();

        let selection = match (query.lot_id, query.lot_number.as_ref()) {
            (Some(id), _) => LotSelection::ById(id),
            (None, Some(code)) => LotSelection::ByCode(code.clone()),
            (None, None) => LotSelection::Active {
                include_completed: !query.active_only.unwrap_or(true)
                    || query.status == Some(LotStatus::Completed),
            },
        };

        let mut lots: Vec<&lot::Model> = graph
            .select(&selection)
            .into_iter()
            .filter(|l| query.phase.map_or(true, |p| l.lot_phase() == Some(p)))
            .filter(|l| query.status.map_or(true, |s| l.lot_status() == Some(s)))
            .collect();
        lots.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut stats = LotStats {
            total: lots.len(),
            ..Default::default()
        };
        for l in &lots {
            stats.total_volume += graph.lot_volume(l);
            let phase = l.phase.clone().unwrap_or_else(|| "UNASSIGNED".to_string());
            *stats.by_phase.entry(phase).or_default() += 1;
            *stats
                .by_type
                .entry(graph.lot_type(l).as_str().to_string())
                .or_default() += 1;
        }
        stats.total_volume = round_volume(stats.total_volume);

        let limit = self.config.list_limit(query.limit) as usize;
        let views: Vec<LotView> = lots
            .into_iter()
            .take(limit)
            .map(|l| lot_view(&graph, l, &policy, now))
            .collect();

        debug!(count = views.len(), total = stats.total, "Listed lots");
        metrics::counter!("lot_lineage_lot_queries_total", 1);

        Ok(LotListResponse {
            count: views.len(),
            lots: views,
            stats,
        })
    }

    /// Any lot of the tenant, consumed and completed ones included.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn get_lot(&self, tenant_id: &str, lot_id: Uuid) -> Result<LotView, ServiceError> {
        let repo = LineageRepository::new(self.db_pool.as_ref(), tenant_id);
        let snapshot = repo.load_snapshot().await?;
        let graph = LineageGraph::new(&snapshot);
        let lot = graph
            .lot(lot_id)
            .ok_or_else(|| ServiceError::not_found("Lot", lot_id))?;
        Ok(lot_view(&graph, lot, &self.policy(tenant_id), Utc::now()))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn volume_info(
        &self,
        tenant_id: &str,
        lot_id: Uuid,
    ) -> Result<VolumeInfo, ServiceError> {
        let repo = LineageRepository::new(self.db_pool.as_ref(), tenant_id);
        let lot = repo.find_lot(lot_id).await?;
        let contributions = repo.lot_batches_for_lot(lot.id).await?;
        let used = repo.packaged_volume_for_lot_code(&lot.lot_code).await?;
        Ok(VolumeInfo::new(
            lot_volume(&lot, &contributions),
            round_volume(used),
        ))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn batch_timeline(
        &self,
        tenant_id: &str,
        batch_id: Uuid,
    ) -> Result<BatchTimelineResponse, ServiceError> {
        let repo = LineageRepository::new(self.db_pool.as_ref(), tenant_id);
        let batch = repo.find_batch(batch_id).await?;
        let entries = repo
            .timeline_for_batch(batch.id)
            .await?
            .into_iter()
            .map(TimelineEntryView::from)
            .collect();
        Ok(BatchTimelineResponse {
            batch_id: batch.id,
            batch_number: batch.batch_number,
            status: batch.status,
            entries,
        })
    }

    pub async fn split_lot(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        request: SplitLotRequest,
    ) -> Result<SplitLotResult, ServiceError> {
        self.run(SplitLotCommand {
            tenant_id: tenant_id.to_string(),
            performed_by: user_id.map(str::to_string),
            request,
        })
        .await
    }

    pub async fn blend_lots(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        request: BlendLotsRequest,
    ) -> Result<BlendLotsResult, ServiceError> {
        self.run(BlendLotsCommand {
            tenant_id: tenant_id.to_string(),
            performed_by: user_id.map(str::to_string),
            policy: self.policy(tenant_id),
            request,
        })
        .await
    }

    pub async fn record_packaging(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        request: RecordPackagingRequest,
    ) -> Result<RecordPackagingResult, ServiceError> {
        self.run(RecordPackagingCommand {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.map(str::to_string),
            policy: self.policy(tenant_id),
            request,
        })
        .await
    }

    pub async fn complete_lot(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        lot_id: Uuid,
        request: CompleteLotRequest,
    ) -> Result<CompleteLotResult, ServiceError> {
        self.run(CompleteLotCommand {
            tenant_id: tenant_id.to_string(),
            lot_id,
            performed_by: user_id.map(str::to_string),
            reason: request.reason,
        })
        .await
    }

    pub async fn advance_lot(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        lot_id: Uuid,
        request: AdvanceLotPhaseRequest,
    ) -> Result<AdvanceLotPhaseResult, ServiceError> {
        self.run(AdvanceLotPhaseCommand {
            tenant_id: tenant_id.to_string(),
            lot_id,
            performed_by: user_id.map(str::to_string),
            request,
        })
        .await
    }

    pub async fn create_batch(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        request: CreateBatchRequest,
    ) -> Result<CreateBatchResult, ServiceError> {
        self.run(CreateBatchCommand {
            tenant_id: tenant_id.to_string(),
            performed_by: user_id.map(str::to_string),
            request,
        })
        .await
    }

    pub async fn record_gravity_reading(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        batch_id: Uuid,
        request: RecordGravityReadingRequest,
    ) -> Result<GravityReadingResult, ServiceError> {
        self.run(RecordGravityReadingCommand {
            tenant_id: tenant_id.to_string(),
            batch_id,
            recorded_by: user_id.map(str::to_string),
            request,
        })
        .await
    }

    /// Dispatches a tagged operation to the matching command.
    #[instrument(skip(self, operation), fields(tenant_id = %tenant_id, operation = operation.name()))]
    pub async fn execute_operation(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        operation: LineageOperation,
    ) -> Result<OperationResult, ServiceError> {
        Ok(match operation {
            LineageOperation::Split(req) => {
                OperationResult::Split(self.split_lot(tenant_id, user_id, req).await?)
            }
            LineageOperation::Blend(req) => {
                OperationResult::Blend(self.blend_lots(tenant_id, user_id, req).await?)
            }
            LineageOperation::Package(req) => {
                OperationResult::Package(self.record_packaging(tenant_id, user_id, req).await?)
            }
            LineageOperation::Complete(op) => OperationResult::Complete(
                self.complete_lot(
                    tenant_id,
                    user_id,
                    op.lot_id,
                    CompleteLotRequest { reason: op.reason },
                )
                .await?,
            ),
            LineageOperation::Advance(op) => OperationResult::Advance(
                self.advance_lot(
                    tenant_id,
                    user_id,
                    op.lot_id,
                    AdvanceLotPhaseRequest {
                        target_phase: op.target_phase,
                        tank_id: op.tank_id,
                    },
                )
                .await?,
            ),
        })
    }
}

/// Projects one lot of the graph into its API view.
pub fn lot_view(
    graph: &LineageGraph<'_>,
    lot: &lot::Model,
    policy: &LineagePolicy,
    now: DateTime<Utc>,
) -> LotView {
    let total_volume = graph.lot_volume(lot);
    let packaged_volume = graph.packaged_volume(lot);
    let primary = graph.primary_batch(lot);
    let assignments = graph.assignments(lot.id);

    let tank = resolve_tank_id(lot, assignments, primary)
        .and_then(|id| graph.tank(id))
        .map(|t| TankView {
            id: t.id,
            name: t.name.clone(),
            tank_type: t.tank_type.clone(),
            capacity_liters: t.capacity_liters,
        });
    let readings = primary.map(|b| graph.readings(b.id)).unwrap_or(&[]);
    let gravity = summarize_gravity(primary, readings);
    let recipe = primary.and_then(|b| graph.recipe_for(b));

    let batches = graph
        .contributions(lot.id)
        .iter()
        .map(|c| {
            let batch = graph.batch(c.batch_id);
            LotBatchView {
                batch_id: c.batch_id,
                batch_number: batch.map(|b| b.batch_number.clone()),
                status: batch.map(|b| b.status.clone()),
                volume_contribution: c.volume_contribution,
                batch_percentage: c.batch_percentage,
            }
        })
        .collect();

    LotView {
        id: lot.id,
        lot_code: lot.lot_code.clone(),
        lot_type: graph.lot_type(lot),
        phase: lot.phase.clone(),
        status: lot.status.clone(),
        progress: phase_progress(lot, total_volume, packaged_volume),
        source_batch_number: graph.source_batch_number(lot),
        source_lots: graph.source_lots(lot),
        recipe_name: recipe.map(|r| r.name.clone()),
        recipe_style: recipe.and_then(|r| r.style.clone()),
        total_volume,
        packaged_volume,
        remaining_volume: round_volume((total_volume - packaged_volume).max(0.0)),
        original_gravity: gravity.original_gravity,
        current_gravity: gravity.current_gravity,
        temperature: gravity.temperature,
        tank,
        batches,
        parent_lot_id: lot.parent_lot_id,
        is_blend_result: lot.is_blend_result,
        split_at: lot.split_at,
        blended_at: lot.blended_at,
        completed_at: lot.completed_at,
        conditioning: conditioning_for(lot, assignments, now, policy.conditioning_duration_days),
        version: lot.version,
        created_at: lot.created_at,
    }
}
