//! Steps shared by the lot commands. Every function runs on the caller's
//! transaction and goes through guarded writes.

use chrono::{DateTime, Utc};
use sea_orm::ConnectionTrait;
use serde_json::json;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use crate::entities::{
    batch, lot, tank, tank_assignment, AssignmentStatus, BatchStatus, LotPhase, LotStatus,
    TankStatus,
};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::lineage::resolver::consumed_lot_ids;
use crate::lineage::VOLUME_EPSILON;
use crate::repositories::LineageRepository;

/// What completing a lot touched.
#[derive(Debug, Clone)]
pub(crate) struct CompletionOutcome {
    pub lot: lot::Model,
    pub released_tank_ids: Vec<Uuid>,
    pub completed_batch_ids: Vec<Uuid>,
}

impl CompletionOutcome {
    pub fn events(&self, tenant_id: &str) -> Vec<Event> {
        let mut events = vec![Event::LotCompleted {
            tenant_id: tenant_id.to_string(),
            lot_id: self.lot.id,
        }];
        events.extend(self.released_tank_ids.iter().map(|tank_id| Event::TankReleased {
            tenant_id: tenant_id.to_string(),
            tank_id: *tank_id,
            lot_id: self.lot.id,
        }));
        events.extend(self.completed_batch_ids.iter().map(|batch_id| Event::BatchCompleted {
            tenant_id: tenant_id.to_string(),
            batch_id: *batch_id,
        }));
        events
    }
}

/// Phase stored on assignments; lots created before phases existed count as fermenting.
pub(crate) fn phase_or_default(lot: &lot::Model) -> LotPhase {
    lot.lot_phase().unwrap_or(LotPhase::Fermentation)
}

pub(crate) fn ensure_capacity(tank: &tank::Model, volume: f64) -> Result<(), ServiceError> {
    match tank.capacity_liters {
        Some(capacity) if volume > capacity + VOLUME_EPSILON => Err(ServiceError::VolumeExceeded {
            requested: volume,
            available: capacity,
        }),
        _ => Ok(()),
    }
}

pub(crate) fn ensure_can_hold(tank: &tank::Model, lot: &lot::Model) -> Result<(), ServiceError> {
    if tank.can_hold(lot.id) {
        Ok(())
    } else {
        Err(ServiceError::InvalidState(format!(
            "tank {} is {} and cannot take lot {}",
            tank.name, tank.status, lot.lot_code
        )))
    }
}

/// Completes every open assignment of `lot_id`.
pub(crate) async fn close_assignments<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    lot_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<tank_assignment::Model>, ServiceError> {
    let mut closed = Vec::new();
    for assignment in repo.open_assignments_for_lot(lot_id).await? {
        let saved = repo
            .save_assignment(tank_assignment::Model {
                status: AssignmentStatus::Completed.as_str().to_string(),
                actual_start: assignment.actual_start.or(Some(now)),
                actual_end: Some(now),
                ..assignment
            })
            .await?;
        closed.push(saved);
    }
    Ok(closed)
}

/// Frees `tank` if it still holds `lot_id` and flags it for cleaning.
pub(crate) async fn release_tank<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    tank: tank::Model,
    lot_id: Uuid,
) -> Result<Option<tank::Model>, ServiceError> {
    if tank.current_lot_id != Some(lot_id) {
        return Ok(None);
    }
    debug!(tank_id = %tank.id, %lot_id, "Releasing tank");
    let saved = repo
        .save_tank(tank::Model {
            status: TankStatus::Available.as_str().to_string(),
            current_lot_id: None,
            current_phase: None,
            needs_cleaning: true,
            ..tank
        })
        .await?;
    Ok(Some(saved))
}

/// Releases every tank holding `lot_id` except `keep`.
pub(crate) async fn release_tanks_of<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    lot_id: Uuid,
    keep: Option<Uuid>,
) -> Result<Vec<Uuid>, ServiceError> {
    let mut released = Vec::new();
    for tank in repo.tanks_held_by(lot_id).await? {
        if Some(tank.id) == keep {
            continue;
        }
        if let Some(freed) = release_tank(repo, tank, lot_id).await? {
            released.push(freed.id);
        }
    }
    Ok(released)
}

pub(crate) async fn occupy_tank<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    tank: tank::Model,
    lot_id: Uuid,
    phase: LotPhase,
) -> Result<tank::Model, ServiceError> {
    repo.save_tank(tank::Model {
        status: TankStatus::InUse.as_str().to_string(),
        current_lot_id: Some(lot_id),
        current_phase: Some(phase.as_str().to_string()),
        ..tank
    })
    .await
}

/// New ACTIVE assignment of `lot_id` to `tank_id`, started now.
pub(crate) async fn start_assignment<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    tank_id: Uuid,
    lot_id: Uuid,
    phase: LotPhase,
    volume: Option<f64>,
    now: DateTime<Utc>,
) -> Result<tank_assignment::Model, ServiceError> {
    repo.insert_assignment(tank_assignment::Model {
        id: Uuid::new_v4(),
        tenant_id: repo.tenant_id().to_string(),
        tank_id,
        lot_id,
        phase: phase.as_str().to_string(),
        status: AssignmentStatus::Active.as_str().to_string(),
        planned_start: Some(now),
        planned_end: None,
        actual_start: Some(now),
        actual_end: None,
        planned_volume: volume,
        actual_volume: volume,
        version: 1,
        created_at: now,
        updated_at: now,
    })
    .await
}

/// Moves a batch forward to the status matching `phase`. Never moves it
/// backwards or out of COMPLETED.
pub(crate) async fn advance_batch<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    batch: batch::Model,
    phase: LotPhase,
) -> Result<batch::Model, ServiceError> {
    let wanted = BatchStatus::for_phase(phase);
    match batch.batch_status() {
        Some(BatchStatus::Completed) => Ok(batch),
        Some(current) if current >= wanted => Ok(batch),
        _ => {
            repo.save_batch(batch::Model {
                status: wanted.as_str().to_string(),
                ..batch
            })
            .await
        }
    }
}

/// Completes each batch whose lots, consumed parents aside, are all COMPLETED.
pub(crate) async fn complete_finished_batches<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    batch_ids: &[Uuid],
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, ServiceError> {
    let mut completed = Vec::new();
    let mut seen = HashSet::new();

    for batch_id in batch_ids.iter().copied().filter(|id| seen.insert(*id)) {
        let batch = repo.find_batch(batch_id).await?;
        if batch.batch_status() == Some(BatchStatus::Completed) {
            continue;
        }

        let lots = repo.lots_for_batch(batch_id).await?;
        let consumed = consumed_lot_ids(&lots);
        let all_done = lots
            .iter()
            .filter(|l| !consumed.contains(&l.id))
            .all(|l| l.is_completed());
        if !all_done {
            continue;
        }

        let number = batch.batch_number.clone();
        repo.save_batch(batch::Model {
            status: BatchStatus::Completed.as_str().to_string(),
            completed_at: Some(now),
            ..batch
        })
        .await?;
        repo.insert_timeline(
            batch_id,
            "BATCH_COMPLETED",
            format!("Batch {} completed; all of its lots are finished", number),
            None,
            None,
        )
        .await?;
        completed.push(batch_id);
    }

    Ok(completed)
}

/// Terminal step shared by packaging auto-completion and manual completion.
///
/// The lot keeps its phase. Its open assignments close, the tanks it holds
/// are released, and batches left with only completed lots complete.
pub(crate) async fn complete_lot<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    lot: lot::Model,
    actor: Option<&str>,
    reason: &str,
) -> Result<CompletionOutcome, ServiceError> {
    if lot.is_completed() {
        return Err(ServiceError::InvalidState(format!(
            "lot {} is already completed",
            lot.lot_code
        )));
    }

    let now = Utc::now();
    let lot = repo
        .save_lot(lot::Model {
            status: LotStatus::Completed.as_str().to_string(),
            completed_at: Some(now),
            ..lot
        })
        .await?;

    close_assignments(repo, lot.id, now).await?;
    let released_tank_ids = release_tanks_of(repo, lot.id, None).await?;

    let batch_ids: Vec<Uuid> = repo
        .lot_batches_for_lot(lot.id)
        .await?
        .iter()
        .map(|lb| lb.batch_id)
        .collect();

    for batch_id in batch_ids.iter().collect::<HashSet<_>>() {
        repo.insert_timeline(
            *batch_id,
            "LOT_COMPLETED",
            format!("Lot {} completed: {}", lot.lot_code, reason),
            Some(json!({ "lot_id": lot.id, "released_tank_ids": released_tank_ids })),
            actor.map(str::to_string),
        )
        .await?;
    }

    let completed_batch_ids = complete_finished_batches(repo, &batch_ids, now).await?;

    Ok(CompletionOutcome {
        lot,
        released_tank_ids,
        completed_batch_ids,
    })
}
