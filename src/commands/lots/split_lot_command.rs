use chrono::{DateTime, Utc};
use sea_orm::ConnectionTrait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::lifecycle::{
    close_assignments, ensure_can_hold, ensure_capacity, occupy_tank, phase_or_default,
    release_tanks_of, start_assignment,
};
use crate::{
    commands::{publish, Command},
    db::{with_transaction, DbPool},
    dto::lineage::{SplitChild, SplitLotRequest, SplitLotResult},
    entities::{lot, LotStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    lineage::{lot_code, resolver::lot_volume, round_volume, VOLUME_EPSILON},
    repositories::LineageRepository,
};

/// Divides an ACTIVE lot into child lots, one per target tank.
#[derive(Debug, Clone)]
pub struct SplitLotCommand {
    pub tenant_id: String,
    pub performed_by: Option<String>,
    pub request: SplitLotRequest,
}

struct SplitOutcome {
    result: SplitLotResult,
    released_tank_ids: Vec<Uuid>,
}

#[async_trait::async_trait]
impl Command for SplitLotCommand {
    type Result = SplitLotResult;

    #[instrument(skip(self, db_pool, event_sender), fields(tenant_id = %self.tenant_id, lot_id = %self.request.source_lot_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.request.validate().map_err(|e| {
            metrics::counter!("lot_lineage_split_failures_total", 1, "reason" => "validation");
            ServiceError::from(e)
        })?;

        let tenant_id = self.tenant_id.clone();
        let actor = self.performed_by.clone();
        let request = self.request.clone();

        let outcome = with_transaction(db_pool.as_ref(), move |txn| {
            Box::pin(async move {
                let repo = LineageRepository::new(txn, &tenant_id);
                split_in_txn(&repo, &request, actor.as_deref(), Utc::now()).await
            })
        })
        .await?;

        let result = outcome.result;
        info!(
            parent_lot_id = %result.parent_lot_id,
            parent_lot_code = %result.parent_lot_code,
            children = result.children.len(),
            "Lot split"
        );

        let mut events = vec![Event::LotSplit {
            tenant_id: self.tenant_id.clone(),
            parent_lot_id: result.parent_lot_id,
            child_lot_ids: result.children.iter().map(|c| c.id).collect(),
        }];
        events.extend(outcome.released_tank_ids.into_iter().map(|tank_id| Event::TankReleased {
            tenant_id: self.tenant_id.clone(),
            tank_id,
            lot_id: result.parent_lot_id,
        }));
        publish(&event_sender, events).await;

        metrics::counter!("lot_lineage_splits_total", 1);
        Ok(result)
    }
}

async fn split_in_txn<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    request: &SplitLotRequest,
    actor: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SplitOutcome, ServiceError> {
    let parent = repo.find_lot(request.source_lot_id).await?;

    if let Some(expected) = request.expected_version {
        if parent.version != expected {
            return Err(ServiceError::Conflict(format!(
                "lot {} is at version {}, expected {}",
                parent.lot_code, parent.version, expected
            )));
        }
    }
    if parent.lot_status() != Some(LotStatus::Active) {
        return Err(ServiceError::InvalidState(format!(
            "lot {} is {}; only ACTIVE lots can be split",
            parent.lot_code, parent.status
        )));
    }
    if repo.is_split_parent(&parent).await? {
        return Err(ServiceError::InvalidState(format!(
            "lot {} has already been split",
            parent.lot_code
        )));
    }

    let contributions = repo.lot_batches_for_lot(parent.id).await?;
    let parent_total = lot_volume(&parent, &contributions);
    let packaged = repo.packaged_volume_for_lot_code(&parent.lot_code).await?;
    let available = round_volume((parent_total - packaged).max(0.0));
    let requested: f64 = request.targets.iter().map(|t| t.volume).sum();
    if requested > available + VOLUME_EPSILON {
        return Err(ServiceError::VolumeExceeded {
            requested: round_volume(requested),
            available,
        });
    }

    let codes: Vec<String> = request
        .targets
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let suffix = t
                .suffix
                .clone()
                .unwrap_or_else(|| lot_code::default_suffix(i));
            lot_code::child_code(&parent.lot_code, &suffix)
        })
        .collect();
    let mut unique = HashSet::new();
    for code in &codes {
        if !unique.insert(code.as_str()) {
            return Err(ServiceError::ValidationError(format!(
                "child lot code {} would be used twice",
                code
            )));
        }
        if repo.lot_code_exists(code).await? {
            return Err(ServiceError::ValidationError(format!(
                "lot code {} already exists",
                code
            )));
        }
    }

    let mut tanks = Vec::with_capacity(request.targets.len());
    for target in &request.targets {
        let tank = repo.find_tank(target.tank_id).await?;
        ensure_can_hold(&tank, &parent)?;
        ensure_capacity(&tank, target.volume)?;
        tanks.push(tank);
    }

    let phase = phase_or_default(&parent);
    close_assignments(repo, parent.id, now).await?;
    let parent = repo
        .save_lot(lot::Model {
            split_at: Some(now),
            ..parent
        })
        .await?;

    let mut children = Vec::with_capacity(tanks.len());
    for ((target, tank), code) in request.targets.iter().zip(tanks).zip(codes) {
        let volume = round_volume(target.volume);
        let child = repo
            .insert_lot(lot::Model {
                id: Uuid::new_v4(),
                tenant_id: repo.tenant_id().to_string(),
                lot_code: code,
                phase: parent.phase.clone(),
                status: LotStatus::Active.as_str().to_string(),
                planned_volume: Some(volume),
                actual_volume: Some(volume),
                parent_lot_id: Some(parent.id),
                is_blend_result: false,
                blended_at: None,
                split_at: None,
                completed_at: None,
                version: 1,
                created_at: now,
                updated_at: now,
            })
            .await?;

        for c in &contributions {
            let share = if parent_total > 0.0 {
                c.volume_contribution / parent_total
            } else {
                1.0 / contributions.len() as f64
            };
            repo.insert_lot_batch(child.id, c.batch_id, round_volume(volume * share), c.batch_percentage)
                .await?;
        }

        start_assignment(repo, tank.id, child.id, phase, Some(volume), now).await?;
        occupy_tank(repo, tank, child.id, phase).await?;

        children.push(SplitChild {
            id: child.id,
            lot_code: child.lot_code,
            volume,
            tank_id: target.tank_id,
        });
    }

    // Tanks re-occupied by a child no longer point at the parent.
    let released_tank_ids = release_tanks_of(repo, parent.id, None).await?;

    let child_codes: Vec<&str> = children.iter().map(|c| c.lot_code.as_str()).collect();
    let batch_ids: HashSet<Uuid> = contributions.iter().map(|c| c.batch_id).collect();
    for batch_id in batch_ids {
        repo.insert_timeline(
            batch_id,
            "LOT_SPLIT",
            format!("Lot {} split into {}", parent.lot_code, child_codes.join(", ")),
            Some(json!({
                "parent_lot_id": parent.id,
                "children": children,
            })),
            actor.map(str::to_string),
        )
        .await?;
    }

    Ok(SplitOutcome {
        result: SplitLotResult {
            parent_lot_id: parent.id,
            parent_lot_code: parent.lot_code,
            children,
        },
        released_tank_ids,
    })
}
