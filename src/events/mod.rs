use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("Failed to send event: {}", e)))
    }
}

/// Domain events published after a lineage change commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    BatchScheduled {
        tenant_id: String,
        batch_id: Uuid,
        lot_id: Uuid,
        tank_id: Option<Uuid>,
    },
    GravityRecorded {
        tenant_id: String,
        batch_id: Uuid,
        gravity: f64,
    },
    LotPhaseAdvanced {
        tenant_id: String,
        lot_id: Uuid,
        from_phase: Option<String>,
        to_phase: String,
        tank_id: Option<Uuid>,
    },
    LotSplit {
        tenant_id: String,
        parent_lot_id: Uuid,
        child_lot_ids: Vec<Uuid>,
    },
    LotsBlended {
        tenant_id: String,
        result_lot_id: Uuid,
        source_lot_ids: Vec<Uuid>,
        volume: f64,
    },
    PackagingRecorded {
        tenant_id: String,
        lot_id: Uuid,
        packaging_run_id: Uuid,
        volume: f64,
    },
    LotCompleted {
        tenant_id: String,
        lot_id: Uuid,
    },
    BatchCompleted {
        tenant_id: String,
        batch_id: Uuid,
    },
    TankReleased {
        tenant_id: String,
        tank_id: Uuid,
        lot_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::BatchScheduled { .. } => "batch_scheduled",
            Event::GravityRecorded { .. } => "gravity_recorded",
            Event::LotPhaseAdvanced { .. } => "lot_phase_advanced",
            Event::LotSplit { .. } => "lot_split",
            Event::LotsBlended { .. } => "lots_blended",
            Event::PackagingRecorded { .. } => "packaging_recorded",
            Event::LotCompleted { .. } => "lot_completed",
            Event::BatchCompleted { .. } => "batch_completed",
            Event::TankReleased { .. } => "tank_released",
        }
    }
}

/// Drains the event channel. Delivery to downstream consumers is handled
/// elsewhere; this loop records what happened.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("lot_lineage_events_processed_total", 1, "event" => event.name());

        match &event {
            Event::LotSplit {
                tenant_id,
                parent_lot_id,
                child_lot_ids,
            } => {
                info!(%tenant_id, %parent_lot_id, children = child_lot_ids.len(), "Lot split");
            }
            Event::LotsBlended {
                tenant_id,
                result_lot_id,
                source_lot_ids,
                volume,
            } => {
                info!(%tenant_id, %result_lot_id, sources = source_lot_ids.len(), volume, "Lots blended");
            }
            Event::TankReleased {
                tenant_id,
                tank_id,
                lot_id,
            } => {
                info!(%tenant_id, %tank_id, %lot_id, "Tank released; cleaning required");
            }
            _ => {
                info!(event = event.name(), "Received event: {:?}", event);
            }
        }
    }

    warn!("Event channel closed; event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let event = Event::LotCompleted {
            tenant_id: "t".into(),
            lot_id: Uuid::new_v4(),
        };
        sender.send(event.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        let result = sender
            .send(Event::BatchCompleted {
                tenant_id: "t".into(),
                batch_id: Uuid::new_v4(),
            })
            .await;
        assert!(matches!(result, Err(ServiceError::EventError(_))));
    }
}
