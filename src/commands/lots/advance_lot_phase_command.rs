use chrono::{DateTime, Utc};
use sea_orm::ConnectionTrait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::lifecycle::{
    advance_batch, close_assignments, ensure_can_hold, ensure_capacity, occupy_tank,
    release_tanks_of, start_assignment,
};
use crate::{
    commands::{publish, Command},
    db::{with_transaction, DbPool},
    dto::lineage::{AdvanceLotPhaseRequest, AdvanceLotPhaseResult},
    entities::{lot, LotPhase, LotStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    lineage::resolver::lot_volume,
    repositories::LineageRepository,
};

/// Moves a lot to a later phase, optionally transferring it to another tank.
///
/// A PLANNED lot is activated; without a target phase it stays in its
/// current phase, so activating a scheduled brew is an advance with a tank.
#[derive(Debug, Clone)]
pub struct AdvanceLotPhaseCommand {
    pub tenant_id: String,
    pub lot_id: Uuid,
    pub performed_by: Option<String>,
    pub request: AdvanceLotPhaseRequest,
}

struct AdvanceOutcome {
    result: AdvanceLotPhaseResult,
    released_tank_ids: Vec<Uuid>,
}

#[async_trait::async_trait]
impl Command for AdvanceLotPhaseCommand {
    type Result = AdvanceLotPhaseResult;

    #[instrument(skip(self, db_pool, event_sender), fields(tenant_id = %self.tenant_id, lot_id = %self.lot_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.request.validate()?;

        let tenant_id = self.tenant_id.clone();
        let lot_id = self.lot_id;
        let actor = self.performed_by.clone();
        let request = self.request.clone();

        let outcome = with_transaction(db_pool.as_ref(), move |txn| {
            Box::pin(async move {
                let repo = LineageRepository::new(txn, &tenant_id);
                advance_in_txn(&repo, lot_id, &request, actor.as_deref(), Utc::now()).await
            })
        })
        .await?;

        let result = outcome.result;
        info!(
            lot_code = %result.lot_code,
            from = ?result.from_phase,
            to = %result.to_phase,
            tank_id = ?result.tank_id,
            "Lot phase advanced"
        );

        let mut events = vec![Event::LotPhaseAdvanced {
            tenant_id: self.tenant_id.clone(),
            lot_id: result.lot_id,
            from_phase: result.from_phase.map(|p| p.as_str().to_string()),
            to_phase: result.to_phase.as_str().to_string(),
            tank_id: result.tank_id,
        }];
        events.extend(outcome.released_tank_ids.into_iter().map(|tank_id| Event::TankReleased {
            tenant_id: self.tenant_id.clone(),
            tank_id,
            lot_id: result.lot_id,
        }));
        publish(&event_sender, events).await;

        metrics::counter!("lot_lineage_phase_advances_total", 1, "phase" => result.to_phase.as_str());
        Ok(result)
    }
}

/// Phase the lot moves to, checked against its current phase.
fn target_phase(lot: &lot::Model, requested: Option<LotPhase>) -> Result<LotPhase, ServiceError> {
    let status = lot.lot_status();
    let current = lot.lot_phase();

    let target = match (requested, status, current) {
        (Some(target), _, _) => target,
        (None, Some(LotStatus::Planned), current) => current.unwrap_or(LotPhase::Fermentation),
        (None, _, None) => LotPhase::Fermentation,
        (None, _, Some(current)) => current.next().ok_or_else(|| {
            ServiceError::InvalidState(format!(
                "lot {} is already in its final phase",
                lot.lot_code
            ))
        })?,
    };

    match (status, current) {
        (Some(LotStatus::Planned), Some(current)) if target < current => {
            Err(ServiceError::InvalidState(format!(
                "lot {} cannot move back from {} to {}",
                lot.lot_code, current, target
            )))
        }
        (Some(LotStatus::Active), Some(current)) if target <= current => {
            Err(ServiceError::InvalidState(format!(
                "lot {} is in {}; it can only move forward",
                lot.lot_code, current
            )))
        }
        _ => Ok(target),
    }
}

async fn advance_in_txn<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    lot_id: Uuid,
    request: &AdvanceLotPhaseRequest,
    actor: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AdvanceOutcome, ServiceError> {
    let lot = repo.find_lot(lot_id).await?;
    if !lot.lot_status().is_some_and(|s| s.is_live()) {
        return Err(ServiceError::InvalidState(format!(
            "lot {} is {}; only PLANNED or ACTIVE lots can advance",
            lot.lot_code, lot.status
        )));
    }
    if repo.is_split_parent(&lot).await? {
        return Err(ServiceError::InvalidState(format!(
            "lot {} has been split; advance its child lots",
            lot.lot_code
        )));
    }

    let from_phase = lot.lot_phase();
    let phase = target_phase(&lot, request.target_phase)?;
    let contributions = repo.lot_batches_for_lot(lot.id).await?;
    let volume = lot_volume(&lot, &contributions);

    let open = repo.open_assignments_for_lot(lot.id).await?;
    let held = repo.tanks_held_by(lot.id).await?;
    let tank_id = request
        .tank_id
        .or_else(|| open.first().map(|a| a.tank_id))
        .or_else(|| held.first().map(|t| t.id));

    let tank = match tank_id {
        Some(id) => {
            let tank = repo.find_tank(id).await?;
            ensure_can_hold(&tank, &lot)?;
            ensure_capacity(&tank, volume)?;
            Some(tank)
        }
        None => None,
    };

    close_assignments(repo, lot.id, now).await?;
    let released_tank_ids = release_tanks_of(repo, lot.id, tank_id).await?;

    if let Some(tank) = tank {
        start_assignment(repo, tank.id, lot.id, phase, Some(volume), now).await?;
        occupy_tank(repo, tank, lot.id, phase).await?;
    }

    let lot = repo
        .save_lot(lot::Model {
            phase: Some(phase.as_str().to_string()),
            status: LotStatus::Active.as_str().to_string(),
            ..lot
        })
        .await?;

    let batch_ids: HashSet<Uuid> = contributions.iter().map(|c| c.batch_id).collect();
    for batch_id in batch_ids {
        let batch = repo.find_batch(batch_id).await?;
        advance_batch(repo, batch, phase).await?;
        repo.insert_timeline(
            batch_id,
            "PHASE_ADVANCED",
            format!(
                "Lot {} moved to {}",
                lot.lot_code,
                phase.as_str()
            ),
            Some(json!({
                "lot_id": lot.id,
                "from_phase": from_phase,
                "to_phase": phase,
                "tank_id": tank_id,
            })),
            actor.map(str::to_string),
        )
        .await?;
    }

    Ok(AdvanceOutcome {
        result: AdvanceLotPhaseResult {
            lot_id: lot.id,
            lot_code: lot.lot_code,
            from_phase,
            to_phase: phase,
            status: LotStatus::Active,
            tank_id,
            version: lot.version,
        },
        released_tank_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineage::resolver::tests::sample_lot;
    use assert_matches::assert_matches;

    #[test]
    fn active_lot_defaults_to_next_phase() {
        let l = sample_lot("BRW-1", "ACTIVE");
        assert_eq!(target_phase(&l, None).unwrap(), LotPhase::Bright);
    }

    #[test]
    fn planned_lot_activates_in_place() {
        let mut l = sample_lot("BRW-1", "PLANNED");
        l.phase = Some("FERMENTATION".into());
        assert_eq!(target_phase(&l, None).unwrap(), LotPhase::Fermentation);
    }

    #[test]
    fn backwards_and_sideways_moves_are_rejected() {
        let l = sample_lot("BRW-1", "ACTIVE");
        assert_matches!(
            target_phase(&l, Some(LotPhase::Fermentation)),
            Err(ServiceError::InvalidState(_))
        );
        assert_matches!(
            target_phase(&l, Some(LotPhase::Conditioning)),
            Err(ServiceError::InvalidState(_))
        );
        assert_eq!(
            target_phase(&l, Some(LotPhase::Packaging)).unwrap(),
            LotPhase::Packaging
        );
    }

    #[test]
    fn packaging_has_no_next_phase() {
        let mut l = sample_lot("BRW-1", "ACTIVE");
        l.phase = Some("PACKAGING".into());
        assert_matches!(target_phase(&l, None), Err(ServiceError::InvalidState(_)));
    }
}
