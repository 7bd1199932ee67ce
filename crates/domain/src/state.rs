//! Declarative state slot definitions.
//!
//! An item type lists its state slots as data. Each [`StateDef`] names one
//! slot and carries its default, an optional validation schema and an
//! optional poll interval. The runtime materializes the declared slots when
//! an item is constructed; nothing here holds a live value.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::schema::StateSchema;

/// A batch of slot updates keyed by slot name, as produced by setters and
/// applied by `bulk_update`.
pub type StateDelta = HashMap<String, Value>;

/// How a slot obtains its initial value.
#[derive(Debug, Clone)]
pub enum StateDefault {
    /// A fixed value, cloned into the slot.
    Fixed(Value),
    /// Computed at construction time, for defaults that must be fresh per
    /// item (timestamps, generated tokens).
    Factory(fn() -> Value),
}

impl StateDefault {
    /// Produce the initial value.
    #[must_use]
    pub fn materialize(&self) -> Value {
        match self {
            Self::Fixed(value) => value.clone(),
            Self::Factory(factory) => factory(),
        }
    }
}

/// Definition of a single state slot.
#[derive(Debug, Clone)]
pub struct StateDef {
    name: String,
    default: StateDefault,
    schema: Option<StateSchema>,
    poll_interval: Option<Duration>,
    log_state: bool,
}

impl StateDef {
    /// A slot named `name` with a fixed default value.
    #[must_use]
    pub fn new(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            default: StateDefault::Fixed(default),
            schema: None,
            poll_interval: None,
            log_state: true,
        }
    }

    /// A slot whose default is computed at construction time.
    #[must_use]
    pub fn computed(name: impl Into<String>, factory: fn() -> Value) -> Self {
        Self {
            name: name.into(),
            default: StateDefault::Factory(factory),
            schema: None,
            poll_interval: None,
            log_state: true,
        }
    }

    /// Attach a validation schema checked on every write.
    #[must_use]
    pub fn schema(mut self, schema: StateSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Refresh the slot through its getter at this interval while the item
    /// is online.
    #[must_use]
    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Keep the slot's values out of tracing output. The slot still exists
    /// and still emits change events; only the logged value is redacted.
    #[must_use]
    pub fn redacted(mut self) -> Self {
        self.log_state = false;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn default(&self) -> &StateDefault {
        &self.default
    }

    #[must_use]
    pub fn state_schema(&self) -> Option<&StateSchema> {
        self.schema.as_ref()
    }

    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval
    }

    /// Whether values of this slot may appear in logs.
    #[must_use]
    pub fn log_state(&self) -> bool {
        self.log_state
    }
}
