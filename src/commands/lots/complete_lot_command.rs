use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::lifecycle::complete_lot;
use crate::{
    commands::{publish, Command},
    db::{with_transaction, DbPool},
    dto::lineage::CompleteLotResult,
    errors::ServiceError,
    events::EventSender,
    repositories::LineageRepository,
};

/// Closes a lot by hand, e.g. when a residual is dumped.
#[derive(Debug, Clone, Validate)]
pub struct CompleteLotCommand {
    pub tenant_id: String,
    pub lot_id: Uuid,
    pub performed_by: Option<String>,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[async_trait::async_trait]
impl Command for CompleteLotCommand {
    type Result = CompleteLotResult;

    #[instrument(skip(self, db_pool, event_sender), fields(tenant_id = %self.tenant_id, lot_id = %self.lot_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;

        let tenant_id = self.tenant_id.clone();
        let lot_id = self.lot_id;
        let actor = self.performed_by.clone();
        let reason = self
            .reason
            .clone()
            .unwrap_or_else(|| "completed manually".to_string());

        let outcome = with_transaction(db_pool.as_ref(), move |txn| {
            Box::pin(async move {
                let repo = LineageRepository::new(txn, &tenant_id);
                let lot = repo.find_lot(lot_id).await?;
                if repo.is_split_parent(&lot).await? {
                    return Err(ServiceError::InvalidState(format!(
                        "lot {} has been split; complete its child lots",
                        lot.lot_code
                    )));
                }
                complete_lot(&repo, lot, actor.as_deref(), &reason).await
            })
        })
        .await?;

        let completed_at: DateTime<Utc> = outcome.lot.completed_at.unwrap_or_else(Utc::now);
        info!(
            lot_code = %outcome.lot.lot_code,
            released_tanks = outcome.released_tank_ids.len(),
            completed_batches = outcome.completed_batch_ids.len(),
            "Lot completed"
        );

        publish(&event_sender, outcome.events(&self.tenant_id)).await;
        metrics::counter!("lot_lineage_lots_completed_total", 1, "trigger" => "manual");

        Ok(CompleteLotResult {
            lot_id: outcome.lot.id,
            lot_code: outcome.lot.lot_code,
            completed_at,
            released_tank_ids: outcome.released_tank_ids,
            completed_batch_ids: outcome.completed_batch_ids,
        })
    }
}
