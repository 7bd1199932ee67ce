//! Item — a live, addressable resource instance.
//!
//! An item bundles the state and action layers with the handler supplied by
//! its type's constructor, a shared status cell and the background tasks
//! (pollers, status watcher) tied to its cancellation token. The registry
//! owns the map of live items; everything here is per instance.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use domo_domain::error::DomoError;
use domo_domain::event::EventType;
use domo_domain::id::{ItemId, UniqueId};
use domo_domain::schema::ConfigMap;
use domo_domain::status::ItemStatus;

use crate::actions::ActionRegistry;
use crate::event_bus::EventBus;
use crate::state::StateRegistry;

/// Shared, watchable status of one item.
///
/// The cell is cloned into the item's state layer, its handler and its
/// background tasks; all observe the same value. `Stopped` is terminal:
/// once set, no later write changes the cell again.
#[derive(Debug, Clone)]
pub struct StatusCell {
    tx: std::sync::Arc<watch::Sender<ItemStatus>>,
}

impl StatusCell {
    #[must_use]
    pub fn new(initial: ItemStatus) -> Self {
        Self {
            tx: std::sync::Arc::new(watch::Sender::new(initial)),
        }
    }

    /// Current status.
    #[must_use]
    pub fn get(&self) -> ItemStatus {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.get().is_online()
    }

    /// Transition to `status`. Returns whether the value changed; writes on
    /// a stopped cell never do.
    pub fn set(&self, status: ItemStatus) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_stopped() || *current == status {
                false
            } else {
                *current = status;
                true
            }
        })
    }

    /// Watch for status transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ItemStatus> {
        self.tx.subscribe()
    }
}

/// Capability hook implemented by an item type's per-instance handler.
///
/// Both hooks default to no-ops so purely virtual types can skip them.
/// `init` acquires whatever the item needs (connections, native handles)
/// and reports the starting status; `stop` releases it all and must be safe
/// to call after a failed `init`.
#[async_trait]
pub trait ItemHandler: Send + Sync {
    /// Bring the backing resource up.
    ///
    /// # Errors
    ///
    /// An error is logged by the registry and leaves the item offline; it
    /// never propagates to the caller that created the item.
    async fn init(&self) -> Result<ItemStatus, DomoError> {
        Ok(ItemStatus::Online)
    }

    /// Release the backing resource.
    ///
    /// # Errors
    ///
    /// An error is logged during teardown; the item stops regardless.
    async fn stop(&self) -> Result<(), DomoError> {
        Ok(())
    }
}

/// Handler for item types with no backing resource.
pub struct NoopHandler;

#[async_trait]
impl ItemHandler for NoopHandler {}

/// A live, addressable resource instance.
pub struct Item {
    pub(crate) identifier: ItemId,
    pub(crate) unique_id: UniqueId,
    pub(crate) item_type: String,
    pub(crate) name: String,
    pub(crate) cfg: ConfigMap,
    pub(crate) status: StatusCell,
    pub(crate) bus: EventBus,
    pub(crate) states: std::sync::Arc<StateRegistry>,
    pub(crate) actions: ActionRegistry,
    pub(crate) handler: Box<dyn ItemHandler>,
    pub(crate) cancel: CancellationToken,
    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) depends_on: RwLock<HashSet<UniqueId>>,
    pub(crate) dependants: RwLock<HashSet<UniqueId>>,
}

impl Item {
    /// Process-local name, unique among live items.
    #[must_use]
    pub fn identifier(&self) -> &ItemId {
        &self.identifier
    }

    /// Stable identity used for persistence and cross-references.
    #[must_use]
    pub fn unique_id(&self) -> &UniqueId {
        &self.unique_id
    }

    /// The `<module>.<type>` string this item was constructed from.
    #[must_use]
    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    /// Human-readable display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The validated, type-specific configuration.
    #[must_use]
    pub fn cfg(&self) -> &ConfigMap {
        &self.cfg
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> ItemStatus {
        self.status.get()
    }

    /// The shared status cell, for handlers that flip their item between
    /// online and offline.
    #[must_use]
    pub fn status_cell(&self) -> &StatusCell {
        &self.status
    }

    /// The item's state slots.
    #[must_use]
    pub fn states(&self) -> &StateRegistry {
        &self.states
    }

    /// The item's named actions.
    #[must_use]
    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Unique ids of the items this one declares a reference to.
    pub async fn depends_on(&self) -> HashSet<UniqueId> {
        self.depends_on.read().await.clone()
    }

    /// Unique ids of the items referencing this one.
    pub async fn dependants(&self) -> HashSet<UniqueId> {
        self.dependants.read().await.clone()
    }

    /// Initialize the handler and spawn the item's background tasks.
    ///
    /// With `start_offline` the handler's `init` is skipped and the item
    /// stays offline (used when a declared dependency is missing). An `init`
    /// error is logged and also leaves the item offline; it never
    /// propagates.
    pub(crate) async fn start(&self, start_offline: bool) {
        if start_offline {
            self.status.set(ItemStatus::Offline);
        } else {
            match self.handler.init().await {
                Ok(status) => {
                    self.status.set(status);
                }
                Err(error) => {
                    tracing::warn!(item = %self.identifier, %error, "item init failed");
                    self.status.set(ItemStatus::Offline);
                }
            }
        }
        let mut tasks = self.tasks.lock().await;
        tasks.extend(self.states.spawn_poll_tasks(&self.cancel));
        tasks.push(self.spawn_status_watcher());
    }

    /// Stop the item: flip the status to `Stopped`, cancel and join every
    /// background task, then run the handler's `stop` hook. Idempotent; the
    /// second and later calls return immediately.
    pub(crate) async fn stop(&self) {
        if !self.status.set(ItemStatus::Stopped) {
            return;
        }
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(error) = task.await {
                tracing::warn!(item = %self.identifier, %error, "item task ended abnormally");
            }
        }
        if let Err(error) = self.handler.stop().await {
            tracing::warn!(item = %self.identifier, %error, "item stop hook failed");
        }
        tracing::debug!(item = %self.identifier, "item stopped");
    }

    /// Watch the status cell and publish `item_not_working` whenever the
    /// item drops to offline after registration.
    fn spawn_status_watcher(&self) -> JoinHandle<()> {
        let identifier = self.identifier.clone();
        let bus = self.bus.clone();
        let cancel = self.cancel.clone();
        let mut rx = self.status.subscribe();
        // Mark the registration-time status as seen; the registry already
        // reported it.
        rx.borrow_and_update();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let status = *rx.borrow_and_update();
                        match status {
                            ItemStatus::Offline => {
                                tracing::warn!(item = %identifier, "item went offline");
                                bus.emit(
                                    EventType::ItemNotWorking,
                                    Some(identifier.clone()),
                                    json!({ "status": status }),
                                );
                            }
                            ItemStatus::Online => {
                                tracing::info!(item = %identifier, "item back online");
                            }
                            ItemStatus::Stopped => break,
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("identifier", &self.identifier)
            .field("unique_id", &self.unique_id)
            .field("item_type", &self.item_type)
            .field("status", &self.status.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateBindings;
    use domo_domain::state::StateDef;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingHandler {
        init_status: ItemStatus,
        init_fails: bool,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ItemHandler for CountingHandler {
        async fn init(&self) -> Result<ItemStatus, DomoError> {
            if self.init_fails {
                return Err(DomoError::not_found("item", "backing device"));
            }
            Ok(self.init_status)
        }

        async fn stop(&self) -> Result<(), DomoError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn make_item(handler: Box<dyn ItemHandler>, defs: &[StateDef]) -> (Arc<Item>, EventBus) {
        let bus = EventBus::new(64);
        let status = StatusCell::new(ItemStatus::Offline);
        let identifier = ItemId::new("desk_lamp");
        let states = Arc::new(StateRegistry::build(
            identifier.clone(),
            status.clone(),
            bus.clone(),
            defs,
            &HashMap::new(),
            StateBindings::new(),
        ));
        let item = Arc::new(Item {
            identifier: identifier.clone(),
            unique_id: UniqueId::new("aa:bb:cc"),
            item_type: "virtual.switch".to_string(),
            name: "Desk lamp".to_string(),
            cfg: ConfigMap::new(),
            status,
            bus: bus.clone(),
            states,
            actions: ActionRegistry::new(identifier, HashMap::new()),
            handler,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            depends_on: RwLock::new(HashSet::new()),
            dependants: RwLock::new(HashSet::new()),
        });
        (item, bus)
    }

    #[test]
    fn should_keep_status_cell_stopped_once_stopped() {
        let cell = StatusCell::new(ItemStatus::Online);
        assert!(cell.set(ItemStatus::Stopped));
        assert!(!cell.set(ItemStatus::Online));
        assert_eq!(cell.get(), ItemStatus::Stopped);
    }

    #[test]
    fn should_report_unchanged_writes_on_status_cell() {
        let cell = StatusCell::new(ItemStatus::Offline);
        assert!(!cell.set(ItemStatus::Offline));
        assert!(cell.set(ItemStatus::Online));
    }

    #[tokio::test]
    async fn should_go_online_when_init_succeeds() {
        let (item, _bus) = make_item(
            Box::new(CountingHandler {
                init_status: ItemStatus::Online,
                init_fails: false,
                stops: Arc::new(AtomicUsize::new(0)),
            }),
            &[],
        );
        item.start(false).await;
        assert_eq!(item.status(), ItemStatus::Online);
        item.stop().await;
    }

    #[tokio::test]
    async fn should_stay_offline_when_init_fails() {
        let (item, _bus) = make_item(
            Box::new(CountingHandler {
                init_status: ItemStatus::Online,
                init_fails: true,
                stops: Arc::new(AtomicUsize::new(0)),
            }),
            &[],
        );
        item.start(false).await;
        assert_eq!(item.status(), ItemStatus::Offline);
        item.stop().await;
    }

    #[tokio::test]
    async fn should_skip_init_when_forced_offline() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (item, _bus) = make_item(
            Box::new(CountingHandler {
                init_status: ItemStatus::Online,
                init_fails: false,
                stops: Arc::clone(&stops),
            }),
            &[],
        );
        item.start(true).await;
        assert_eq!(item.status(), ItemStatus::Offline);
        item.stop().await;
    }

    #[tokio::test]
    async fn should_stop_idempotently() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (item, _bus) = make_item(
            Box::new(CountingHandler {
                init_status: ItemStatus::Online,
                init_fails: false,
                stops: Arc::clone(&stops),
            }),
            &[],
        );
        item.start(false).await;

        item.stop().await;
        item.stop().await;

        assert_eq!(item.status(), ItemStatus::Stopped);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_publish_item_not_working_when_dropping_offline() {
        let (item, bus) = make_item(
            Box::new(CountingHandler {
                init_status: ItemStatus::Online,
                init_fails: false,
                stops: Arc::new(AtomicUsize::new(0)),
            }),
            &[],
        );
        item.start(false).await;
        let mut rx = bus.subscribe();

        assert!(item.status_cell().set(ItemStatus::Offline));
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type, EventType::ItemNotWorking);
        assert_eq!(event.item.as_ref().unwrap().as_str(), "desk_lamp");

        item.stop().await;
    }

    #[tokio::test]
    async fn should_join_poll_tasks_on_stop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let counting = crate::state::getter(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!(true))
            }
        });

        let bus = EventBus::new(64);
        let status = StatusCell::new(ItemStatus::Offline);
        let identifier = ItemId::new("desk_lamp");
        let defs =
            [StateDef::new("on", serde_json::json!(false)).poll_every(Duration::from_millis(10))];
        let states = Arc::new(StateRegistry::build(
            identifier.clone(),
            status.clone(),
            bus.clone(),
            &defs,
            &HashMap::new(),
            StateBindings::new().getter("on", counting),
        ));
        let item = Item {
            identifier: identifier.clone(),
            unique_id: UniqueId::new("aa:bb:cc"),
            item_type: "virtual.switch".to_string(),
            name: "Desk lamp".to_string(),
            cfg: ConfigMap::new(),
            status,
            bus,
            states,
            actions: ActionRegistry::new(identifier, HashMap::new()),
            handler: Box::new(NoopHandler),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            depends_on: RwLock::new(HashSet::new()),
            dependants: RwLock::new(HashSet::new()),
        };

        item.start(false).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        item.stop().await;

        let after_stop = calls.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
    }
}
