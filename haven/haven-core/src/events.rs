use crate::model::{ApprovalStatus, ModerationStatus, TransactionStatus};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    Registered { user: Uuid },
    ApprovalChanged { user: Uuid, approval: ApprovalStatus },
    RoleChanged { user: Uuid },
    KycSubmitted { user: Uuid },
    AssetSubmitted { asset: Uuid },
    ModerationChanged { asset: Uuid, moderation: ModerationStatus },
    RentalStarted { transaction: Uuid, asset: Uuid },
    Purchased { transaction: Uuid, asset: Uuid },
    TransactionAdvanced { transaction: Uuid, status: TransactionStatus },
    EscalationRaised { message: Uuid },
    TicketOpened { ticket: Uuid },
    TicketResolved { ticket: Uuid },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
