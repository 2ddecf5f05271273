//! Typed publish/subscribe event bus (`spec.md` §6 "Event hooks").
//!
//! Process-wide singletons are restated per `spec.md` §9 as: a handle
//! passed into the constructor, never created implicitly. The core never
//! spins one up on its own; tests construct their own [`EventBus`] and pass
//! it in, so they stay independent of one another.

use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum Event {
    NeuronCreated(Uuid),
    NeuronUpdated(Uuid),
    NeuronDeleted(Uuid),
    SynapseFormed(Uuid),
    SynapseUpdated(Uuid),
    SynapseRemoved(Uuid),
    MerkleRootChanged { neuron_id: Uuid },
    MerkleVerified { neuron_id: Uuid, valid: bool },
    AttractorCreated(Uuid),
    AttractorDecayed(Uuid),
    AttractorActivated(Uuid),
}

/// Broadcast-backed event bus. Handlers are advisory: a full or closed
/// channel is logged, never propagated to the operation that published it.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event. Never fails the caller: if there are no
    /// subscribers, or the channel lags, the outcome is logged and dropped.
    pub fn publish(&self, event: Event) {
        if let Err(e) = self.sender.send(event) {
            warn!(error = %e, "event bus: no active subscribers for published event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();
        bus.publish(Event::NeuronCreated(id));

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::NeuronCreated(received) if received == id));
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(Event::NeuronCreated(Uuid::new_v4()));
    }
}
