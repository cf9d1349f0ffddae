use chrono::{DateTime, Utc};
use sea_orm::ConnectionTrait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::lifecycle::{complete_lot, CompletionOutcome};
use crate::{
    commands::{publish, Command},
    db::{with_transaction, DbPool},
    dto::lineage::{RecordPackagingRequest, RecordPackagingResult, VolumeInfo},
    entities::{batch, lot, packaging_run, BatchStatus, LotPhase, LotStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    lineage::{
        resolver::{lot_volume, primary_contribution},
        round_volume, LineageGraph, LineagePolicy, LotSelection,
    },
    repositories::LineageRepository,
};

/// Records a packaging run against a lot and completes the lot once it is
/// fully packaged.
#[derive(Debug, Clone)]
pub struct RecordPackagingCommand {
    pub tenant_id: String,
    /// Calling user; used when the request names no operator.
    pub user_id: Option<String>,
    pub policy: LineagePolicy,
    pub request: RecordPackagingRequest,
}

struct PackagingOutcome {
    result: RecordPackagingResult,
    completion: Option<CompletionOutcome>,
}

#[async_trait::async_trait]
impl Command for RecordPackagingCommand {
    type Result = RecordPackagingResult;

    #[instrument(skip(self, db_pool, event_sender), fields(tenant_id = %self.tenant_id, package_type = %self.request.package_type))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.request.validate()?;

        let performed_by = self
            .request
            .performed_by
            .clone()
            .or_else(|| self.user_id.clone())
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "performed_by is required when no user is authenticated".to_string(),
                )
            })?;

        let tenant_id = self.tenant_id.clone();
        let policy = self.policy;
        let request = self.request.clone();

        let outcome = with_transaction(db_pool.as_ref(), move |txn| {
            Box::pin(async move {
                let repo = LineageRepository::new(txn, &tenant_id);
                package_in_txn(&repo, &request, &policy, &performed_by, Utc::now()).await
            })
        })
        .await
        .map_err(|e| {
            let reason = e.error_code();
            metrics::counter!("lot_lineage_packaging_failures_total", 1, "reason" => reason);
            e
        })?;

        let result = outcome.result;
        info!(
            lot_id = %result.lot_id,
            run_id = %result.packaging_run.id,
            volume = result.packaging_run.volume_total,
            remaining = result.volume_info.remaining_volume,
            lot_completed = result.lot_completed,
            "Packaging run recorded"
        );

        let mut events = vec![Event::PackagingRecorded {
            tenant_id: self.tenant_id.clone(),
            lot_id: result.lot_id,
            packaging_run_id: result.packaging_run.id,
            volume: result.packaging_run.volume_total,
        }];
        if let Some(completion) = &outcome.completion {
            events.extend(completion.events(&self.tenant_id));
        }
        publish(&event_sender, events).await;

        metrics::counter!("lot_lineage_packaging_runs_total", 1);
        if result.lot_completed {
            metrics::counter!("lot_lineage_lots_completed_total", 1, "trigger" => "packaging");
        }
        Ok(result)
    }
}

/// Explicit lot id, else explicit lot code, else the single visible lot
/// holding every referenced batch.
async fn resolve_lot<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    request: &RecordPackagingRequest,
    batch_ids: &[Uuid],
) -> Result<lot::Model, ServiceError> {
    if let Some(lot_id) = request.lot_id {
        return repo.find_lot(lot_id).await;
    }
    if let Some(code) = request.lot_number.as_deref() {
        return repo
            .find_lot_by_code(code)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lot", code));
    }
    if batch_ids.is_empty() {
        return Err(ServiceError::ValidationError(
            "lot_id, lot_number or batch_id is required".to_string(),
        ));
    }

    let snapshot = repo.load_snapshot().await?;
    let graph = LineageGraph::new(&snapshot);
    let candidates: Vec<&lot::Model> = graph
        .select(&LotSelection::Active {
            include_completed: false,
        })
        .into_iter()
        .filter(|l| {
            batch_ids.iter().all(|b| {
                graph
                    .contributions(l.id)
                    .iter()
                    .any(|c| c.batch_id == *b)
            })
        })
        .collect();

    match candidates.as_slice() {
        [] => Err(ServiceError::NotFound(
            "no active lot holds all of the referenced batches".to_string(),
        )),
        [only] => Ok((*only).clone()),
        many => {
            let codes: Vec<&str> = many.iter().map(|l| l.lot_code.as_str()).collect();
            Err(ServiceError::ValidationError(format!(
                "batches are held by several lots ({}); pass lot_id or lot_number",
                codes.join(", ")
            )))
        }
    }
}

async fn package_in_txn<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    request: &RecordPackagingRequest,
    policy: &LineagePolicy,
    performed_by: &str,
    now: DateTime<Utc>,
) -> Result<PackagingOutcome, ServiceError> {
    let referenced = request.referenced_batch_ids();
    let lot = resolve_lot(repo, request, &referenced).await?;

    if lot.is_completed() {
        return Err(ServiceError::InvalidState(format!(
            "lot {} is already completed",
            lot.lot_code
        )));
    }
    if repo.is_split_parent(&lot).await? {
        return Err(ServiceError::InvalidState(format!(
            "lot {} has been split; package its child lots",
            lot.lot_code
        )));
    }

    let contributions = repo.lot_batches_for_lot(lot.id).await?;
    for batch_id in &referenced {
        if !contributions.iter().any(|c| c.batch_id == *batch_id) {
            return Err(ServiceError::ValidationError(format!(
                "batch {} does not belong to lot {}",
                batch_id, lot.lot_code
            )));
        }
    }
    let checked_ids: Vec<Uuid> = if referenced.is_empty() {
        let mut seen = HashSet::new();
        contributions
            .iter()
            .map(|c| c.batch_id)
            .filter(|id| seen.insert(*id))
            .collect()
    } else {
        referenced
    };

    let mut batches: HashMap<Uuid, batch::Model> = HashMap::new();
    for batch_id in &checked_ids {
        let b = repo.find_batch(*batch_id).await?;
        let packageable = b.batch_status().is_some_and(|s| s.is_packageable());
        if !packageable {
            return Err(ServiceError::InvalidBatchStatus(format!(
                "batch {} is {}; packaging needs READY or PACKAGING",
                b.batch_number, b.status
            )));
        }
        batches.insert(b.id, b);
    }

    let total = lot_volume(&lot, &contributions);
    let used = repo.packaged_volume_for_lot_code(&lot.lot_code).await?;
    let available = round_volume((total - used).max(0.0));
    let requested = round_volume(f64::from(request.quantity) * request.package_type.size_liters());
    if requested > available + policy.packaging_tolerance_liters {
        return Err(ServiceError::InsufficientVolume {
            requested,
            available,
        });
    }

    let billed_batch = primary_contribution(&contributions)
        .map(|c| c.batch_id)
        .or_else(|| checked_ids.first().copied())
        .ok_or_else(|| {
            ServiceError::InvalidState(format!("lot {} has no batch to bill", lot.lot_code))
        })?;

    let run = repo
        .insert_packaging_run(packaging_run::Model {
            id: Uuid::new_v4(),
            tenant_id: repo.tenant_id().to_string(),
            batch_id: billed_batch,
            lot_id: Some(lot.id),
            lot_number: lot.lot_code.clone(),
            package_type: request.package_type.as_str().to_string(),
            quantity: request.quantity,
            volume_total: requested,
            performed_by: performed_by.to_string(),
            performed_at: now,
            notes: request.notes.clone(),
        })
        .await?;

    for batch_id in &checked_ids {
        if let Some(b) = batches.remove(batch_id) {
            let b = if b.batch_status() == Some(BatchStatus::Ready) {
                repo.save_batch(batch::Model {
                    status: BatchStatus::Packaging.as_str().to_string(),
                    ..b
                })
                .await?
            } else {
                b
            };
            batches.insert(b.id, b);
        }
    }

    // Every run bumps the lot version; a concurrent run on the same lot
    // fails its save with Conflict.
    let lot = repo
        .save_lot(lot::Model {
            phase: Some(LotPhase::Packaging.as_str().to_string()),
            status: LotStatus::Active.as_str().to_string(),
            ..lot
        })
        .await?;

    let billed = match batches.remove(&billed_batch) {
        Some(b) => b,
        None => repo.find_batch(billed_batch).await?,
    };
    let billed_total = repo.packaged_volume_for_batch(billed_batch).await?;
    if billed_total > billed.packaged_volume {
        repo.save_batch(batch::Model {
            packaged_volume: round_volume(billed_total),
            ..billed
        })
        .await?;
    }

    repo.insert_timeline(
        billed_batch,
        "PACKAGING_RECORDED",
        format!(
            "Packaged {} x {} ({:.3} L) from lot {}",
            request.quantity,
            request.package_type.as_str(),
            requested,
            lot.lot_code
        ),
        Some(json!({
            "packaging_run_id": run.id,
            "lot_id": lot.id,
            "volume_total": requested,
        })),
        Some(performed_by.to_string()),
    )
    .await?;

    let used_after = round_volume(used + requested);
    let completion = if used_after >= total - policy.packaging_tolerance_liters {
        Some(complete_lot(repo, lot.clone(), Some(performed_by), "fully packaged").await?)
    } else {
        None
    };

    Ok(PackagingOutcome {
        result: RecordPackagingResult {
            packaging_run: run.into(),
            volume_info: VolumeInfo::new(total, used_after),
            lot_id: lot.id,
            lot_completed: completion.is_some(),
            completed_batch_ids: completion
                .as_ref()
                .map(|c| c.completed_batch_ids.clone())
                .unwrap_or_default(),
        },
        completion,
    })
}
