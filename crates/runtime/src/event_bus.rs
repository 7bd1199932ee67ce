//! In-process event bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use domo_domain::event::{Event, EventType};
use domo_domain::id::ItemId;

/// Default channel capacity used by [`EventBus::default`].
pub const DEFAULT_CAPACITY: usize = 256;

/// In-process event bus using a tokio [`broadcast`] channel.
///
/// The bus is cheap to clone; all clones publish into the same channel.
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped), and never blocks: slow subscribers lag
/// and lose the oldest events instead of stalling publishers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: Event) {
        // send only fails with zero receivers
        let _ = self.sender.send(event);
    }

    /// Build and publish an event in one go.
    pub fn emit(&self, event_type: EventType, item: Option<ItemId>, data: serde_json::Value) {
        self.publish(Event::new(event_type, item, data));
    }

    /// Subscribe to events on this bus.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_deliver_event_to_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let event = Event::new(
            EventType::StateChange,
            Some(ItemId::from("desk_lamp")),
            serde_json::json!({"states": {"on": true}}),
        );
        let event_id = event.id;

        bus.publish(event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, event_id);
    }

    #[tokio::test]
    async fn should_deliver_event_to_all_clones_subscribers() {
        let bus = EventBus::new(16);
        let clone = bus.clone();
        let mut rx1 = bus.subscribe();
        let mut rx2 = clone.subscribe();

        let event = Event::new(EventType::ItemCreated, None, serde_json::json!({}));
        let event_id = event.id;

        clone.publish(event);

        assert_eq!(rx1.recv().await.unwrap().id, event_id);
        assert_eq!(rx2.recv().await.unwrap().id, event_id);
    }

    #[tokio::test]
    async fn should_succeed_when_no_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(EventType::StateChange, None, serde_json::json!({}));
    }

    #[tokio::test]
    async fn should_not_deliver_events_published_before_subscription() {
        let bus = EventBus::new(16);

        bus.emit(EventType::StateChange, None, serde_json::json!({}));

        let mut rx = bus.subscribe();

        let later = Event::new(EventType::ItemCreated, None, serde_json::json!({}));
        let later_id = later.id;
        bus.publish(later);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, later_id);
    }
}
