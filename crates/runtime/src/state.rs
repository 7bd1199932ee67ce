//! State layer — the declared slots of one item.
//!
//! Every item owns a [`StateRegistry`] materialized from its type's ordered
//! slot declarations. Slots cache a JSON value and may be bound to an async
//! getter (live reads, polling) and an async setter (pushes to the backing
//! device). All change paths funnel into a single `state_change` event per
//! logical mutation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use domo_domain::error::DomoError;
use domo_domain::event::EventType;
use domo_domain::id::ItemId;
use domo_domain::schema::StateSchema;
use domo_domain::state::{StateDef, StateDelta};

use crate::event_bus::EventBus;
use crate::item::StatusCell;

/// Async closure reading a slot's live value from the backing device.
pub type Getter = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, DomoError>> + Send + Sync>;

/// Async closure pushing a requested value to the backing device. Returns
/// the full delta the write caused, which may touch other slots.
pub type Setter =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<StateDelta, DomoError>> + Send + Sync>;

/// Wrap a plain async closure into a [`Getter`].
pub fn getter<F, Fut>(f: F) -> Getter
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DomoError>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Wrap a plain async closure into a [`Setter`].
pub fn setter<F, Fut>(f: F) -> Setter
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateDelta, DomoError>> + Send + 'static,
{
    Arc::new(move |value| Box::pin(f(value)))
}

/// Getter and setter closures a constructor binds to declared slots.
#[derive(Default)]
pub struct StateBindings {
    getters: HashMap<String, Getter>,
    setters: HashMap<String, Setter>,
}

impl StateBindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a getter to the named slot.
    #[must_use]
    pub fn getter(mut self, slot: impl Into<String>, getter: Getter) -> Self {
        self.getters.insert(slot.into(), getter);
        self
    }

    /// Bind a setter to the named slot.
    #[must_use]
    pub fn setter(mut self, slot: impl Into<String>, setter: Setter) -> Self {
        self.setters.insert(slot.into(), setter);
        self
    }
}

struct Slot {
    value: RwLock<Value>,
    getter: Option<Getter>,
    setter: Option<Setter>,
    schema: Option<StateSchema>,
    poll_interval: Option<Duration>,
    log_state: bool,
}

/// The state slots of one item.
pub struct StateRegistry {
    item: ItemId,
    status: StatusCell,
    bus: EventBus,
    slots: HashMap<String, Slot>,
    /// Serializes the validate → setter → apply → publish sequence of
    /// [`StateRegistry::set`] so two sets on the same item never interleave.
    set_lock: Mutex<()>,
}

impl StateRegistry {
    /// Materialize the slot map from the type's declarations.
    ///
    /// `overrides` are the entry's persisted initial values; an override for
    /// an unknown slot, or one its schema rejects, is logged and ignored in
    /// favor of the declared default. Bindings naming undeclared slots are
    /// dropped with a warning.
    #[must_use]
    pub fn build(
        item: ItemId,
        status: StatusCell,
        bus: EventBus,
        defs: &[StateDef],
        overrides: &HashMap<String, Value>,
        mut bindings: StateBindings,
    ) -> Self {
        let mut slots = HashMap::with_capacity(defs.len());
        for def in defs {
            let mut value = def.default().materialize();
            if let Some(initial) = overrides.get(def.name()) {
                match def.state_schema().map_or(Ok(()), |s| s.check(def.name(), initial)) {
                    Ok(()) => value = initial.clone(),
                    Err(error) => tracing::warn!(
                        item = %item,
                        slot = def.name(),
                        %error,
                        "ignoring invalid state default",
                    ),
                }
            }
            slots.insert(
                def.name().to_string(),
                Slot {
                    value: RwLock::new(value),
                    getter: bindings.getters.remove(def.name()),
                    setter: bindings.setters.remove(def.name()),
                    schema: def.state_schema().cloned(),
                    poll_interval: def.poll_interval(),
                    log_state: def.log_state(),
                },
            );
        }
        for slot in bindings.getters.keys().chain(bindings.setters.keys()) {
            tracing::warn!(item = %item, slot = %slot, "binding for undeclared slot dropped");
        }
        Self {
            item,
            status,
            bus,
            slots,
            set_lock: Mutex::new(()),
        }
    }

    /// Slot names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Read a slot.
    ///
    /// Returns `None` while the item is not online, regardless of the cached
    /// value. A slot bound to a getter without a poll interval is read live
    /// through the getter on every call; polled and unbound slots return the
    /// cache.
    ///
    /// # Errors
    ///
    /// Returns [`DomoError::NotFound`] for an unknown slot, or the getter's
    /// error on a live read.
    pub async fn get(&self, name: &str) -> Result<Option<Value>, DomoError> {
        let slot = self.slot(name)?;
        if !self.status.get().is_online() {
            return Ok(None);
        }
        if slot.poll_interval.is_none() {
            if let Some(read) = &slot.getter {
                return Ok(Some(read().await?));
            }
        }
        Ok(Some(slot.value.read().await.clone()))
    }

    /// Write a slot through its setter.
    ///
    /// The requested value is checked against the slot's schema, the setter
    /// is invoked, every entry of the delta it returns overwrites the
    /// matching slot cache and one combined `state_change` event is
    /// published. A slot without a setter is a no-op returning an empty
    /// delta. The whole sequence holds the item's set lock.
    ///
    /// # Errors
    ///
    /// Returns [`DomoError::NotFound`] for an unknown slot,
    /// [`DomoError::NotOnline`] while the item is not online,
    /// [`DomoError::Validation`] when the schema rejects the value, or the
    /// setter's own error. On error nothing has been applied or published.
    pub async fn set(&self, name: &str, value: Value) -> Result<StateDelta, DomoError> {
        let slot = self.slot(name)?;
        let _guard = self.set_lock.lock().await;

        let status = self.status.get();
        if !status.is_online() {
            return Err(DomoError::NotOnline {
                item: self.item.clone(),
                status,
            });
        }
        if let Some(schema) = &slot.schema {
            schema.check(name, &value)?;
        }
        let Some(write) = &slot.setter else {
            tracing::debug!(item = %self.item, slot = name, "no setter bound, ignoring set");
            return Ok(StateDelta::new());
        };

        tracing::debug!(
            item = %self.item,
            slot = name,
            value = %self.printable(slot, &value),
            "applying set",
        );
        let delta = write(value).await?;
        let applied = self.apply(&delta).await;
        if !applied.is_empty() {
            self.publish(&applied);
        }
        Ok(applied)
    }

    /// Push a value into a slot, bypassing setter and status gate.
    ///
    /// This is the internal path pollers and handlers use to report what the
    /// device already did. Equal values short-circuit: no write, no event,
    /// `false`. A changed value overwrites the cache, publishes a
    /// `state_change` event with that single entry and returns `true`.
    ///
    /// # Errors
    ///
    /// Returns [`DomoError::NotFound`] for an unknown slot.
    pub async fn update(&self, name: &str, value: Value) -> Result<bool, DomoError> {
        let slot = self.slot(name)?;
        {
            let mut cached = slot.value.write().await;
            if *cached == value {
                return Ok(false);
            }
            *cached = value.clone();
        }
        tracing::debug!(
            item = %self.item,
            slot = name,
            value = %self.printable(slot, &value),
            "state updated",
        );
        let mut changes = StateDelta::new();
        changes.insert(name.to_string(), value);
        self.publish(&changes);
        Ok(true)
    }

    /// Push several values at once, with the same equality filter as
    /// [`StateRegistry::update`]. At most one combined `state_change` event
    /// is published, containing exactly the entries that changed, which are
    /// also returned. Unknown slot names are logged and skipped.
    pub async fn bulk_update(&self, values: StateDelta) -> StateDelta {
        let mut changes = StateDelta::new();
        for (name, value) in values {
            let Some(slot) = self.slots.get(&name) else {
                tracing::warn!(item = %self.item, slot = %name, "update for unknown slot skipped");
                continue;
            };
            let mut cached = slot.value.write().await;
            if *cached != value {
                *cached = value.clone();
                changes.insert(name, value);
            }
        }
        if !changes.is_empty() {
            self.publish(&changes);
        }
        changes
    }

    /// Dry-run a schema check without touching the slot.
    ///
    /// # Errors
    ///
    /// Returns [`DomoError::NotFound`] for an unknown slot or
    /// [`DomoError::Validation`] when the schema rejects the value. Slots
    /// without a schema accept anything.
    pub fn check_value(&self, name: &str, value: &Value) -> Result<(), DomoError> {
        let slot = self.slot(name)?;
        if let Some(schema) = &slot.schema {
            schema.check(name, value)?;
        }
        Ok(())
    }

    /// Snapshot every slot through the [`StateRegistry::get`] rules.
    ///
    /// # Errors
    ///
    /// Propagates the first live-read failure.
    pub async fn dump(&self) -> Result<HashMap<String, Option<Value>>, DomoError> {
        let mut snapshot = HashMap::with_capacity(self.slots.len());
        for name in self.slots.keys() {
            snapshot.insert(name.clone(), self.get(name).await?);
        }
        Ok(snapshot)
    }

    /// Spawn one background task per slot that declares a poll interval.
    ///
    /// Each task ticks on its interval, skips ticks while the item is not
    /// online, reads through the getter and pushes the result via
    /// [`StateRegistry::update`], so a value-stable poll emits nothing.
    /// Getter failures are logged and polling continues. Tasks end when
    /// `cancel` fires; the returned handles are joined during item stop.
    pub fn spawn_poll_tasks(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for (name, slot) in &self.slots {
            let Some(period) = slot.poll_interval else {
                continue;
            };
            let Some(read) = slot.getter.clone() else {
                tracing::warn!(
                    item = %self.item,
                    slot = %name,
                    "poll interval declared without a getter, not polling",
                );
                continue;
            };
            let states = Arc::clone(self);
            let name = name.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            if !states.status.get().is_online() {
                                continue;
                            }
                            match read().await {
                                Ok(value) => {
                                    if let Err(error) = states.update(&name, value).await {
                                        tracing::warn!(
                                            item = %states.item,
                                            slot = %name,
                                            %error,
                                            "poll update failed",
                                        );
                                    }
                                }
                                Err(error) => tracing::warn!(
                                    item = %states.item,
                                    slot = %name,
                                    %error,
                                    "poll getter failed",
                                ),
                            }
                        }
                    }
                }
            }));
        }
        handles
    }

    fn slot(&self, name: &str) -> Result<&Slot, DomoError> {
        self.slots
            .get(name)
            .ok_or_else(|| DomoError::not_found("state", name))
    }

    /// Overwrite the caches named by `delta`, returning what was applied.
    /// Entries for undeclared slots are logged and dropped.
    async fn apply(&self, delta: &StateDelta) -> StateDelta {
        let mut applied = StateDelta::new();
        for (name, value) in delta {
            let Some(slot) = self.slots.get(name) else {
                tracing::warn!(
                    item = %self.item,
                    slot = %name,
                    "setter delta names undeclared slot, dropped",
                );
                continue;
            };
            *slot.value.write().await = value.clone();
            applied.insert(name.clone(), value.clone());
        }
        applied
    }

    fn publish(&self, changes: &StateDelta) {
        self.bus.emit(
            EventType::StateChange,
            Some(self.item.clone()),
            json!({ "changes": changes }),
        );
    }

    fn printable(&self, slot: &Slot, value: &Value) -> String {
        if slot.log_state {
            value.to_string()
        } else {
            "<redacted>".to_string()
        }
    }
}

impl std::fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRegistry")
            .field("item", &self.item)
            .field("slots", &self.slots.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
