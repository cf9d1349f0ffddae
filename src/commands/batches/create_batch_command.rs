use chrono::{DateTime, Utc};
use sea_orm::ConnectionTrait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    commands::{
        lots::lifecycle::{ensure_capacity, occupy_tank, start_assignment},
        publish, Command,
    },
    db::{with_transaction, DbPool},
    dto::lineage::{CreateBatchRequest, CreateBatchResult},
    entities::{batch, lot, BatchStatus, LotPhase, LotStatus, TankStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    lineage::{lot_code, round_volume},
    repositories::LineageRepository,
};

/// Schedules a brew: the batch plus its initial fermentation lot.
#[derive(Debug, Clone)]
pub struct CreateBatchCommand {
    pub tenant_id: String,
    pub performed_by: Option<String>,
    pub request: CreateBatchRequest,
}

#[async_trait::async_trait]
impl Command for CreateBatchCommand {
    type Result = CreateBatchResult;

    #[instrument(skip(self, db_pool, event_sender), fields(tenant_id = %self.tenant_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.request.validate()?;

        let tenant_id = self.tenant_id.clone();
        let actor = self.performed_by.clone();
        let request = self.request.clone();

        let result = with_transaction(db_pool.as_ref(), move |txn| {
            Box::pin(async move {
                let repo = LineageRepository::new(txn, &tenant_id);
                create_in_txn(&repo, &request, actor.as_deref(), Utc::now()).await
            })
        })
        .await?;

        info!(
            batch_id = %result.batch_id,
            batch_number = %result.batch_number,
            status = %result.status,
            "Batch scheduled"
        );

        publish(
            &event_sender,
            vec![Event::BatchScheduled {
                tenant_id: self.tenant_id.clone(),
                batch_id: result.batch_id,
                lot_id: result.lot_id,
                tank_id: result.tank_id,
            }],
        )
        .await;

        metrics::counter!("lot_lineage_batches_created_total", 1);
        Ok(result)
    }
}

async fn batch_number<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    requested: Option<&str>,
) -> Result<String, ServiceError> {
    let number = match requested.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => return repo.next_code("BRW").await,
    };

    if repo.batch_number_exists(&number).await? || repo.lot_code_exists(&number).await? {
        return Err(ServiceError::ValidationError(format!(
            "batch number {} already exists",
            number
        )));
    }
    if let Some(parent_code) = lot_code::split_parent_code(&number) {
        if repo.lot_code_exists(parent_code).await? {
            return Err(ServiceError::ValidationError(format!(
                "batch number {} reads as a split of lot {}",
                number, parent_code
            )));
        }
    }
    if repo.has_legacy_split_children(&number).await? {
        return Err(ServiceError::ValidationError(format!(
            "batch number {} would read as the parent of existing lots {}-*",
            number, number
        )));
    }
    Ok(number)
}

async fn create_in_txn<C: ConnectionTrait>(
    repo: &LineageRepository<'_, C>,
    request: &CreateBatchRequest,
    actor: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CreateBatchResult, ServiceError> {
    let number = batch_number(repo, request.batch_number.as_deref()).await?;
    let volume = round_volume(request.volume);

    if let Some(recipe_id) = request.recipe_id {
        repo.find_recipe(recipe_id).await?;
    }

    let tank = match request.tank_id {
        Some(tank_id) => {
            let tank = repo.find_tank(tank_id).await?;
            if tank.tank_status() != Some(TankStatus::Available) || tank.current_lot_id.is_some() {
                return Err(ServiceError::InvalidState(format!(
                    "tank {} is {} and cannot start a new batch",
                    tank.name, tank.status
                )));
            }
            ensure_capacity(&tank, volume)?;
            Some(tank)
        }
        None => None,
    };

    let (batch_status, lot_status) = if tank.is_some() {
        (BatchStatus::Fermenting, LotStatus::Active)
    } else {
        (BatchStatus::Planned, LotStatus::Planned)
    };

    let batch = repo
        .insert_batch(batch::Model {
            id: Uuid::new_v4(),
            tenant_id: repo.tenant_id().to_string(),
            batch_number: number.clone(),
            recipe_id: request.recipe_id,
            status: batch_status.as_str().to_string(),
            volume,
            packaged_volume: 0.0,
            original_gravity: None,
            current_gravity: None,
            final_gravity: None,
            tank_id: request.tank_id,
            brew_date: request.brew_date.or_else(|| tank.as_ref().map(|_| now)),
            completed_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
        .await?;

    let lot = repo
        .insert_lot(lot::Model {
            id: Uuid::new_v4(),
            tenant_id: repo.tenant_id().to_string(),
            lot_code: number.clone(),
            phase: Some(LotPhase::Fermentation.as_str().to_string()),
            status: lot_status.as_str().to_string(),
            planned_volume: Some(volume),
            actual_volume: tank.as_ref().map(|_| volume),
            parent_lot_id: None,
            is_blend_result: false,
            blended_at: None,
            split_at: None,
            completed_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
        .await?;
    repo.insert_lot_batch(lot.id, batch.id, volume, 100.0).await?;

    if let Some(tank) = tank {
        start_assignment(repo, tank.id, lot.id, LotPhase::Fermentation, Some(volume), now).await?;
        occupy_tank(repo, tank, lot.id, LotPhase::Fermentation).await?;
    }

    repo.insert_timeline(
        batch.id,
        "BATCH_CREATED",
        format!("Batch {} scheduled ({:.3} L)", number, volume),
        Some(json!({ "lot_id": lot.id, "tank_id": request.tank_id })),
        actor.map(str::to_string),
    )
    .await?;

    Ok(CreateBatchResult {
        batch_id: batch.id,
        batch_number: number,
        status: batch.status,
        lot_id: lot.id,
        lot_code: lot.lot_code,
        tank_id: request.tank_id,
    })
}
