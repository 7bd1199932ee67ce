//! Event — an immutable record of something that happened.
//!
//! Events are produced when items are created or removed, when state slots
//! change and when an item stops working. Subscribers receive them through
//! the runtime's event bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{EventId, ItemId};
use crate::time::{self, Timestamp};

/// The kinds of event the runtime publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// An item was registered and constructed.
    ItemCreated,
    /// An item was removed from the registry.
    ItemRemoved,
    /// One or more state slots of an item changed value.
    StateChange,
    /// An item transitioned away from online outside of a normal stop.
    ItemNotWorking,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ItemCreated => "item_created",
            Self::ItemRemoved => "item_removed",
            Self::StateChange => "state_change",
            Self::ItemNotWorking => "item_not_working",
        };
        f.write_str(name)
    }
}

/// An immutable record of something that happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    /// The item the event concerns, when there is one.
    pub item: Option<ItemId>,
    /// Event-type specific payload.
    pub data: Value,
    pub timestamp: Timestamp,
}

impl Event {
    /// A new event stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(event_type: EventType, item: Option<ItemId>, data: Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            item,
            data,
            timestamp: time::now(),
        }
    }
}
