use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    commands::{publish, Command},
    db::{with_transaction, DbPool},
    dto::lineage::{GravityReadingResult, RecordGravityReadingRequest},
    entities::{batch, gravity_reading, BatchStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    lineage::progress::notes_mention,
    repositories::LineageRepository,
};

#[derive(Debug, Clone)]
pub struct RecordGravityReadingCommand {
    pub tenant_id: String,
    pub batch_id: Uuid,
    pub recorded_by: Option<String>,
    pub request: RecordGravityReadingRequest,
}

#[async_trait::async_trait]
impl Command for RecordGravityReadingCommand {
    type Result = GravityReadingResult;

    #[instrument(skip(self, db_pool, event_sender), fields(tenant_id = %self.tenant_id, batch_id = %self.batch_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.request.validate()?;

        let tenant_id = self.tenant_id.clone();
        let batch_id = self.batch_id;
        let recorded_by = self.recorded_by.clone();
        let request = self.request.clone();

        let result = with_transaction(db_pool.as_ref(), move |txn| {
            Box::pin(async move {
                let repo = LineageRepository::new(txn, &tenant_id);
                let batch = repo.find_batch(batch_id).await?;
                if batch.batch_status() == Some(BatchStatus::Completed) {
                    return Err(ServiceError::InvalidState(format!(
                        "batch {} is completed",
                        batch.batch_number
                    )));
                }

                let first = repo.reading_count(batch.id).await? == 0;
                let now = Utc::now();
                let reading = repo
                    .insert_reading(gravity_reading::Model {
                        id: Uuid::new_v4(),
                        tenant_id: tenant_id.clone(),
                        batch_id: batch.id,
                        gravity: request.gravity,
                        temperature: request.temperature,
                        notes: request.notes.clone(),
                        recorded_by: recorded_by.clone(),
                        recorded_at: request.recorded_at.unwrap_or(now),
                    })
                    .await?;

                let original_gravity = match batch.original_gravity {
                    None if first || notes_mention(&reading, "OG") => Some(reading.gravity),
                    og => og,
                };
                let final_gravity = if notes_mention(&reading, "FG") {
                    Some(reading.gravity)
                } else {
                    batch.final_gravity
                };

                let batch = repo
                    .save_batch(batch::Model {
                        original_gravity,
                        current_gravity: Some(reading.gravity),
                        final_gravity,
                        ..batch
                    })
                    .await?;

                repo.insert_timeline(
                    batch.id,
                    "GRAVITY_READING",
                    format!("Gravity {:.3}", reading.gravity),
                    Some(serde_json::json!({
                        "reading_id": reading.id,
                        "temperature": reading.temperature,
                        "notes": reading.notes,
                    })),
                    recorded_by,
                )
                .await?;

                Ok(GravityReadingResult {
                    reading_id: reading.id,
                    batch_id: batch.id,
                    gravity: reading.gravity,
                    original_gravity: batch.original_gravity,
                    current_gravity: batch.current_gravity,
                    final_gravity: batch.final_gravity,
                })
            })
        })
        .await?;

        info!(gravity = result.gravity, "Gravity reading recorded");
        publish(
            &event_sender,
            vec![Event::GravityRecorded {
                tenant_id: self.tenant_id.clone(),
                batch_id: result.batch_id,
                gravity: result.gravity,
            }],
        )
        .await;
        metrics::counter!("lot_lineage_gravity_readings_total", 1);

        Ok(result)
    }
}
