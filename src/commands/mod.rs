use crate::{
    db::DbPool,
    errors::ServiceError,
    events::{Event, EventSender},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub mod batches;
pub mod lots;

/// Command trait for implementing the Command Pattern
///
/// Each command validates its input, performs its writes inside a single
/// transaction, then publishes the resulting domain events.
#[async_trait]
pub trait Command: Send + Sync {
    /// The return type of the command when executed successfully
    type Result;

    /// Execute the command with the given dependencies
    ///
    /// # Arguments
    /// * `db_pool` - Database connection pool for persistence operations
    /// * `event_sender` - Channel to publish domain events
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError>;
}

/// Sends events after commit. A send failure never undoes the committed
/// change, so it is logged and counted.
pub(crate) async fn publish(event_sender: &EventSender, events: Vec<Event>) {
    for event in events {
        let name = event.name();
        if let Err(e) = event_sender.send(event).await {
            warn!(event = name, error = %e, "Failed to publish event");
            metrics::counter!("lot_lineage_event_publish_failures_total", 1, "event" => name);
        }
    }
}
