use chrono::{DateTime, Utc};
use sea_orm::ConnectionTrait;
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::lifecycle::{
    advance_batch, close_assignments, ensure_capacity, occupy_tank, phase_or_default,
    release_tanks_of, start_assignment,
};
use crate::{
    commands::{publish, Command},
    db::{with_transaction, DbPool},
    dto::lineage::{BlendLotsRequest, BlendLotsResult},
    entities::{lot, lot_batch, LotPhase, LotStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    lineage::{
        lot_code, resolver::lot_volume, round_volume, LineageGraph, LineagePolicy, LotSelection,
        SourceLot, VOLUME_EPSILON,
    },
    repositories::LineageRepository,
};

/// Combines two or more ACTIVE lots into a new blend lot.
#[derive(Debug, Clone)]
pub struct BlendLotsCommand {
    pub tenant_id: String,
    pub performed_by: Option<String>,
    pub policy: LineagePolicy,
    pub request: BlendLotsRequest,
}

struct BlendSource {
    lot: lot::Model,
    contributions: Vec<lot_batch::Model>,
    draw: f64,
}

struct BlendOutcome {
    result: BlendLotsResult,
    released: Vec<(Uuid, Uuid)>,
}

#[async_trait::async_trait]
impl Command for BlendLotsCommand {
    type Result = BlendLotsResult;

    #[instrument(skip(self, db_pool, event_sender), fields(tenant_id = %self.tenant_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.request.validate().map_err(|e| {
            metrics::counter!("lot_lineage_blend_failures_total", 1, "reason" => "validation");
            ServiceError::from(e)
        })?;

        let tenant_id = self.tenant_id.clone();
        let actor = self.performed_by.clone();
        let policy = self.policy;
        let request = self.request.clone();

        let outcome = with_transaction(db_pool.as_ref(), move |txn| {
            Box::pin(async move {
                let repo = LineageRepository::new(txn, &tenant_id);
                blend_in_txn(&repo, &request, &policy, actor.as_deref(), Utc::now()).await
            })
        })
        .await?;

        let result = outcome.result;
        info!(
            lot_id = %result.lot_id,
            lot_code = %result.lot_code,
            volume = result.volume,
            sources = result.source_lot_ids.len(),
            "Lots blended"
        );

        let mut events = vec![Event::LotsBlended {
            tenant_id: self.tenant_id.clone(),
            result_lot_id: result.lot_id,
            source_lot_ids: result.source_lot_ids.clone(),
            volume: result.volume,
        }];
        events.extend(
            outcome
                .released
                .into_iter()
                .map(|(tank_id, lot_id)| Event::TankReleased {
                    tenant_id: self.tenant_id.clone(),
                    tank_id,
                    lot_id,
                }),
        );
        publish(&event_sender, events).await;

        metrics::counter!("lot_lineage_blends_total", 1);
        Ok(result)
    }
}

/// Source lots named directly, or the visible ACTIVE lots of each batch.
async fn resolve_sources<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    request: &BlendLotsRequest,
) -> Result<(Vec<lot::Model>, HashMap<Uuid, Uuid>), ServiceError> {
    let mut lots = Vec::new();
    // batch id -> lot id, for volumes keyed by batch
    let mut by_batch = HashMap::new();

    match (
        request.source_lot_ids.is_empty(),
        request.source_batch_ids.is_empty(),
    ) {
        (false, true) => {
            let mut seen = HashSet::new();
            for id in request.source_lot_ids.iter().filter(|id| seen.insert(**id)) {
                lots.push(repo.find_lot(*id).await?);
            }
        }
        (true, false) => {
            let snapshot = repo.load_snapshot().await?;
            let graph = LineageGraph::new(&snapshot);
            let active: HashSet<Uuid> = graph
                .select(&LotSelection::Active {
                    include_completed: false,
                })
                .iter()
                .filter(|l| l.lot_status() == Some(LotStatus::Active))
                .map(|l| l.id)
                .collect();

            let mut seen = HashSet::new();
            for batch_id in &request.source_batch_ids {
                if graph.batch(*batch_id).is_none() {
                    return Err(ServiceError::not_found("Batch", batch_id));
                }
                let batch_lots: Vec<&lot::Model> = graph
                    .lots_descending_from_batch(*batch_id)
                    .into_iter()
                    .filter(|l| active.contains(&l.id))
                    .collect();
                if batch_lots.is_empty() {
                    return Err(ServiceError::InvalidState(format!(
                        "batch {} has no active lot to blend",
                        batch_id
                    )));
                }
                if let [only] = batch_lots.as_slice() {
                    by_batch.insert(*batch_id, only.id);
                }
                for l in batch_lots {
                    if seen.insert(l.id) {
                        lots.push(l.clone());
                    }
                }
            }
        }
        _ => {
            return Err(ServiceError::ValidationError(
                "provide either source_lot_ids or source_batch_ids".to_string(),
            ))
        }
    }

    if lots.len() < 2 {
        return Err(ServiceError::ValidationError(
            "a blend needs at least two distinct source lots".to_string(),
        ));
    }
    Ok((lots, by_batch))
}

async fn blend_in_txn<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    request: &BlendLotsRequest,
    policy: &LineagePolicy,
    actor: Option<&str>,
    now: DateTime<Utc>,
) -> Result<BlendOutcome, ServiceError> {
    let (lots, by_batch) = resolve_sources(repo, request).await?;

    for l in &lots {
        if l.lot_status() != Some(LotStatus::Active) {
            return Err(ServiceError::InvalidState(format!(
                "lot {} is {}; only ACTIVE lots can be blended",
                l.lot_code, l.status
            )));
        }
        if repo.is_split_parent(l).await? {
            return Err(ServiceError::InvalidState(format!(
                "lot {} has been split; blend its child lots instead",
                l.lot_code
            )));
        }
    }

    let phases: BTreeSet<LotPhase> = lots.iter().map(phase_or_default).collect();
    if phases.len() > 1 && !request.allow_phase_override {
        let names: Vec<&str> = phases.iter().map(LotPhase::as_str).collect();
        return Err(ServiceError::InvalidState(format!(
            "source lots are in different phases ({}); set allow_phase_override to blend them",
            names.join(", ")
        )));
    }
    let latest = phases.iter().copied().max().unwrap_or(LotPhase::Fermentation);
    let phase = match request.target_phase {
        Some(target) if target < latest => {
            return Err(ServiceError::InvalidState(format!(
                "a blend cannot move lots back from {} to {}",
                latest, target
            )))
        }
        Some(target) => target,
        None => latest,
    };

    let mut explicit: HashMap<Uuid, f64> = HashMap::new();
    for sv in &request.source_volumes {
        let lot_id = if lots.iter().any(|l| l.id == sv.source_id) {
            sv.source_id
        } else if let Some(lot_id) = by_batch.get(&sv.source_id) {
            *lot_id
        } else {
            return Err(ServiceError::ValidationError(format!(
                "source volume {} does not match a blend source",
                sv.source_id
            )));
        };
        explicit.insert(lot_id, sv.volume);
    }

    let mut sources = Vec::with_capacity(lots.len());
    for l in lots {
        let contributions = repo.lot_batches_for_lot(l.id).await?;
        if contributions.is_empty() {
            return Err(ServiceError::InvalidState(format!(
                "lot {} has no batch contributions to blend",
                l.lot_code
            )));
        }
        let total = lot_volume(&l, &contributions);
        let packaged = repo.packaged_volume_for_lot_code(&l.lot_code).await?;
        let remaining = round_volume((total - packaged).max(0.0));
        let draw = match explicit.get(&l.id) {
            Some(v) if *v > remaining + VOLUME_EPSILON => {
                return Err(ServiceError::VolumeExceeded {
                    requested: *v,
                    available: remaining,
                })
            }
            Some(v) => round_volume(*v),
            None => remaining,
        };
        if draw <= VOLUME_EPSILON {
            return Err(ServiceError::InvalidState(format!(
                "lot {} has no remaining volume",
                l.lot_code
            )));
        }
        sources.push(BlendSource {
            lot: l,
            contributions,
            draw,
        });
    }

    // Per-batch volumes, in first-seen order.
    let mut per_batch: Vec<(Uuid, f64)> = Vec::new();
    for source in &sources {
        let source_total: f64 = source.contributions.iter().map(|c| c.volume_contribution).sum();
        for c in &source.contributions {
            let share = if source_total > 0.0 {
                c.volume_contribution / source_total
            } else {
                1.0 / source.contributions.len() as f64
            };
            let amount = source.draw * share;
            match per_batch.iter_mut().find(|(id, _)| *id == c.batch_id) {
                Some((_, v)) => *v += amount,
                None => per_batch.push((c.batch_id, amount)),
            }
        }
    }
    let total_volume = round_volume(sources.iter().map(|s| s.draw).sum());

    let batch_ids: Vec<Uuid> = per_batch.iter().map(|(id, _)| *id).collect();
    let batches = repo.find_batches(&batch_ids).await?;
    let recipe_ids: Vec<Uuid> = batches.iter().filter_map(|b| b.recipe_id).collect();
    let recipes = repo.find_recipes(&recipe_ids).await?;
    policy.check_blend_compatibility(&batches, &recipes)?;

    let target = repo.find_tank(request.target_tank_id).await?;
    if !sources.iter().any(|s| target.can_hold(s.lot.id)) {
        return Err(ServiceError::InvalidState(format!(
            "tank {} is {} and holds none of the source lots",
            target.name, target.status
        )));
    }
    ensure_capacity(&target, total_volume)?;

    let code = match request.lot_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => {
            if repo.lot_code_exists(code).await? {
                return Err(ServiceError::ValidationError(format!(
                    "lot code {} already exists",
                    code
                )));
            }
            if let Some(parent_code) = lot_code::split_parent_code(code) {
                if repo.lot_code_exists(parent_code).await? {
                    return Err(ServiceError::ValidationError(format!(
                        "lot code {} reads as a split of lot {}",
                        code, parent_code
                    )));
                }
            }
            if repo.has_legacy_split_children(code).await? {
                return Err(ServiceError::ValidationError(format!(
                    "lot code {} would read as the parent of existing lots {}-*",
                    code, code
                )));
            }
            code.to_string()
        }
        _ => repo.next_code("BLD").await?,
    };

    let blend = repo
        .insert_lot(lot::Model {
            id: Uuid::new_v4(),
            tenant_id: repo.tenant_id().to_string(),
            lot_code: code,
            phase: Some(phase.as_str().to_string()),
            status: LotStatus::Active.as_str().to_string(),
            planned_volume: Some(total_volume),
            actual_volume: Some(total_volume),
            parent_lot_id: None,
            is_blend_result: true,
            blended_at: Some(now),
            split_at: None,
            completed_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
        .await?;

    let mut contributions = Vec::with_capacity(per_batch.len());
    for (batch_id, amount) in &per_batch {
        let volume = round_volume(*amount);
        let percentage = if total_volume > 0.0 {
            (amount / total_volume * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        repo.insert_lot_batch(blend.id, *batch_id, volume, percentage)
            .await?;
        contributions.push(SourceLot {
            batch_id: *batch_id,
            batch_number: batches
                .iter()
                .find(|b| b.id == *batch_id)
                .map(|b| b.batch_number.clone()),
            volume_contribution: volume,
            batch_percentage: percentage,
        });
    }

    let mut released = Vec::new();
    let mut source_lot_ids = Vec::with_capacity(sources.len());
    for source in sources {
        let lot_id = source.lot.id;
        close_assignments(repo, lot_id, now).await?;
        repo.save_lot(lot::Model {
            status: LotStatus::Completed.as_str().to_string(),
            completed_at: Some(now),
            ..source.lot
        })
        .await?;
        for tank_id in release_tanks_of(repo, lot_id, Some(target.id)).await? {
            released.push((tank_id, lot_id));
        }
        source_lot_ids.push(lot_id);
    }

    // Reload: the target may have been saved while holding a source.
    let target = repo.find_tank(target.id).await?;
    start_assignment(repo, target.id, blend.id, phase, Some(total_volume), now).await?;
    occupy_tank(repo, target, blend.id, phase).await?;

    for batch in batches {
        let batch_id = batch.id;
        advance_batch(repo, batch, phase).await?;
        repo.insert_timeline(
            batch_id,
            "LOTS_BLENDED",
            format!("Blended into lot {} ({:.3} L)", blend.lot_code, total_volume),
            Some(json!({
                "lot_id": blend.id,
                "source_lot_ids": source_lot_ids,
            })),
            actor.map(str::to_string),
        )
        .await?;
    }

    Ok(BlendOutcome {
        result: BlendLotsResult {
            lot_id: blend.id,
            lot_code: blend.lot_code,
            volume: total_volume,
            phase,
            tank_id: request.target_tank_id,
            source_lot_ids,
            contributions,
        },
        released,
    })
}
