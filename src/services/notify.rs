//! In-process fan-out of ride request changes to connected drivers.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RideRequestEvent {
    /// A new pending request was offered to the driver.
    Created {
        request_id: Uuid,
        booking_id: Uuid,
        driver_id: Uuid,
    },
    /// The request was closed by another driver's acceptance or a cancellation.
    Expired {
        request_id: Uuid,
        booking_id: Uuid,
        driver_id: Uuid,
    },
}

impl RideRequestEvent {
    pub fn driver_id(&self) -> Uuid {
        match self {
            RideRequestEvent::Created { driver_id, .. }
            | RideRequestEvent::Expired { driver_id, .. } => *driver_id,
        }
    }
}

#[derive(Clone)]
pub struct RideRequestHub {
    sender: broadcast::Sender<RideRequestEvent>,
}

impl RideRequestHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: RideRequestEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No ride request subscribers connected");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RideRequestEvent> {
        self.sender.subscribe()
    }
}

impl Default for RideRequestHub {
    fn default() -> Self {
        Self::new()
    }
}
