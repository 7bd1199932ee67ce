//! Item registry — lifecycle manager for the live item set.
//!
//! The registry turns persisted [`StorageEntry`] descriptions into live
//! [`Item`]s through the type definitions in its [`TypeRegistry`]: config
//! validation, dependency resolution, construction, initialization and
//! teardown all happen here. It also owns the entry map and keeps it
//! persisted through the debounced [`Saver`].
//!
//! Dependency links are bidirectional and maintained only by the registry:
//! creating an item whose config references another records the link both
//! ways, removal stops every transitive dependant first and detaches the
//! links afterward.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use domo_domain::entry::StorageEntry;
use domo_domain::error::{DomoError, ValidationError};
use domo_domain::event::EventType;
use domo_domain::id::{ItemId, UniqueId};
use domo_domain::status::ItemStatus;

use crate::actions::ActionRegistry;
use crate::event_bus::EventBus;
use crate::item::{Item, StatusCell};
use crate::module::{ItemContext, TypeRegistry};
use crate::persist::{DEFAULT_DEBOUNCE, Saver};
use crate::ports::EntryStore;
use crate::state::StateRegistry;

/// Lifecycle manager for the live item set, generic over the entry store.
pub struct Registry<S> {
    types: TypeRegistry,
    store: Arc<S>,
    bus: EventBus,
    items: RwLock<HashMap<ItemId, Arc<Item>>>,
    entries: RwLock<HashMap<UniqueId, StorageEntry>>,
    saver: Saver,
}

impl<S> Registry<S>
where
    S: EntryStore + Send + Sync + 'static,
{
    /// Create a registry persisting through `store`, with the default save
    /// debounce.
    #[must_use]
    pub fn new(types: TypeRegistry, store: S, bus: EventBus) -> Self {
        Self::with_save_debounce(types, store, bus, DEFAULT_DEBOUNCE)
    }

    /// Create a registry with an explicit save debounce.
    #[must_use]
    pub fn with_save_debounce(
        types: TypeRegistry,
        store: S,
        bus: EventBus,
        debounce: Duration,
    ) -> Self {
        let store = Arc::new(store);
        let saver = Saver::spawn(Arc::clone(&store), debounce);
        Self {
            types,
            store,
            bus,
            items: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
            saver,
        }
    }

    /// The type definitions this registry resolves against.
    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The bus all registry and item events are published on.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Construct and register a live item from an entry-shaped description,
    /// without persisting anything.
    ///
    /// The entry's config is validated against the type's schema, `ItemRef`
    /// fields are resolved into live handles (a missing or non-online
    /// reference makes the item start offline instead of failing), the
    /// type's constructor runs, the slot map is materialized and the item is
    /// registered: inserted into the live map, linked to its dependencies,
    /// initialized and announced with an `item_created` event (plus
    /// `item_not_working` when it did not come up online).
    ///
    /// # Errors
    ///
    /// Returns [`DomoError::Validation`] for an invalid entry or config or a
    /// duplicate identifier, [`DomoError::UnknownItemType`] when no type
    /// definition matches, or [`DomoError::Construction`] wrapping a
    /// constructor failure.
    #[tracing::instrument(skip(self, entry), fields(item = %entry.identifier()))]
    pub async fn create_item(&self, entry: &StorageEntry) -> Result<Arc<Item>, DomoError> {
        entry.validate()?;
        let identifier = entry.identifier();
        let Some(type_def) = self.types.get(&entry.item_type) else {
            return Err(DomoError::UnknownItemType(entry.item_type.clone()));
        };
        type_def.config().validate(&entry.cfg)?;
        if self.items.read().await.contains_key(&identifier) {
            return Err(ValidationError::DuplicateIdentifier(identifier).into());
        }

        let mut deps: HashMap<String, Arc<Item>> = HashMap::new();
        let mut start_offline = false;
        for key in type_def.config().item_refs() {
            let Some(reference) = entry.cfg.get(key).and_then(Value::as_str) else {
                continue;
            };
            match self.get_item(reference).await {
                Some(dep) => {
                    if !dep.status().is_online() {
                        tracing::warn!(
                            item = %identifier,
                            reference,
                            status = %dep.status(),
                            "referenced item is not online, starting offline",
                        );
                        start_offline = true;
                    }
                    deps.insert(key.to_string(), dep);
                }
                None => {
                    tracing::warn!(
                        item = %identifier,
                        reference,
                        "referenced item does not exist, starting offline",
                    );
                    start_offline = true;
                }
            }
        }

        let status = StatusCell::new(ItemStatus::Offline);
        let ctx = ItemContext {
            identifier: identifier.clone(),
            unique_id: entry.unique_id.clone(),
            name: entry.display_name(),
            cfg: entry.cfg.clone(),
            deps: deps.clone(),
            status: status.clone(),
            bus: self.bus.clone(),
        };
        let parts = type_def
            .construct(ctx)
            .await
            .map_err(|source| DomoError::construction(identifier.clone(), source))?;

        let states = Arc::new(StateRegistry::build(
            identifier.clone(),
            status.clone(),
            self.bus.clone(),
            type_def.states(),
            &entry.state_defaults,
            parts.bindings,
        ));
        let item = Arc::new(Item {
            identifier: identifier.clone(),
            unique_id: entry.unique_id.clone(),
            item_type: entry.item_type.clone(),
            name: entry.display_name(),
            cfg: entry.cfg.clone(),
            status,
            bus: self.bus.clone(),
            states,
            actions: ActionRegistry::new(identifier, parts.actions),
            handler: parts.handler,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            depends_on: RwLock::new(deps.values().map(|d| d.unique_id().clone()).collect()),
            dependants: RwLock::new(HashSet::new()),
        });

        self.register_item(&item, start_offline).await?;
        Ok(item)
    }

    /// Idempotent upsert of a persisted entry.
    ///
    /// With `overwrite == false` and the unique id already present this is a
    /// no-op returning the existing live item, if any. Otherwise any live
    /// item with that identity is torn down (dependants stopped first), the
    /// entry is persisted, and — when enabled — a fresh item is created
    /// from it.
    ///
    /// # Errors
    ///
    /// Propagates [`Registry::create_item`] failures; the entry stays
    /// persisted either way.
    #[tracing::instrument(skip(self, entry), fields(unique_id = %entry.unique_id))]
    pub async fn register_entry(
        &self,
        entry: StorageEntry,
        overwrite: bool,
    ) -> Result<Option<Arc<Item>>, DomoError> {
        entry.validate()?;
        if !overwrite && self.entries.read().await.contains_key(&entry.unique_id) {
            tracing::debug!("entry already registered, keeping existing item");
            return Ok(self.get_by_unique_id(&entry.unique_id).await);
        }

        if let Some(live) = self.get_by_unique_id(&entry.unique_id).await {
            self.teardown(&live).await;
        }

        let enabled = entry.enabled;
        self.entries
            .write()
            .await
            .insert(entry.unique_id.clone(), entry.clone());
        self.schedule_save().await;

        if !enabled {
            tracing::debug!("entry disabled, not instantiating");
            return Ok(None);
        }
        self.create_item(&entry).await.map(Some)
    }

    /// Stop and remove a live item.
    ///
    /// Every transitive dependant is stopped first (they stay in the live
    /// map as stopped husks until their entries are re-registered), the item
    /// itself is stopped, all its dependency links are detached both ways,
    /// it is deleted from the live map and `item_removed` is published.
    /// Unknown identifiers are a logged no-op.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, identifier: &str) {
        let Some(item) = self.get_item(identifier).await else {
            tracing::debug!("no live item with this identifier, nothing to remove");
            return;
        };
        self.teardown(&item).await;
    }

    /// Drop a persisted entry and its live item, scheduling a save.
    #[tracing::instrument(skip(self))]
    pub async fn remove_entry(&self, unique_id: &UniqueId) {
        if let Some(live) = self.get_by_unique_id(unique_id).await {
            self.teardown(&live).await;
        }
        if self.entries.write().await.remove(unique_id).is_some() {
            self.schedule_save().await;
        } else {
            tracing::debug!("no entry with this unique id");
        }
    }

    /// Load the persisted entry set and bring up every enabled entry.
    ///
    /// Entries are created in dependency order (referenced items first;
    /// cycles fall back to registration order). Each per-entry failure is
    /// logged and skipped, the bootstrap itself never aborts.
    ///
    /// # Errors
    ///
    /// Only a store failure on the initial load is propagated.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> Result<(), DomoError> {
        let loaded = self.store.load().await?;
        tracing::info!(entries = loaded.len(), "loaded persisted entries");
        {
            let mut entries = self.entries.write().await;
            for entry in loaded {
                if let Err(error) = entry.validate() {
                    tracing::warn!(%error, "skipping invalid persisted entry");
                    continue;
                }
                entries.insert(entry.unique_id.clone(), entry);
            }
        }

        let snapshot: Vec<StorageEntry> = self.entries.read().await.values().cloned().collect();
        for entry in self.dependency_order(snapshot) {
            if !entry.enabled {
                continue;
            }
            if let Err(error) = self.create_item(&entry).await {
                tracing::warn!(
                    unique_id = %entry.unique_id,
                    %error,
                    "failed to restore item, skipping",
                );
            }
        }
        Ok(())
    }

    /// Replace every entry of one provider with a fresh set.
    ///
    /// Entries of `provider` absent from `entries` are removed (with the
    /// usual dependant cascade); the rest are re-registered with overwrite,
    /// in dependency order. Entries of other providers are untouched.
    /// Per-entry failures are logged and skipped.
    #[tracing::instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn reload_provider(&self, provider: &str, entries: Vec<StorageEntry>) {
        let keep: HashSet<UniqueId> = entries.iter().map(|e| e.unique_id.clone()).collect();
        let stale: Vec<UniqueId> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.provider == provider && !keep.contains(&e.unique_id))
            .map(|e| e.unique_id.clone())
            .collect();
        for unique_id in stale {
            tracing::info!(%unique_id, "entry gone from provider, removing");
            self.remove_entry(&unique_id).await;
        }

        for mut entry in self.dependency_order(entries) {
            entry.provider = provider.to_string();
            let unique_id = entry.unique_id.clone();
            if let Err(error) = self.register_entry(entry, true).await {
                tracing::warn!(%unique_id, %error, "failed to register entry, skipping");
            }
        }
    }

    /// Concurrently stop every live item. Stopped items stay in the live
    /// map; this is the process-shutdown path, not a removal.
    #[tracing::instrument(skip(self))]
    pub async fn stop_all(&self) {
        let items: Vec<Arc<Item>> = self.items.read().await.values().cloned().collect();
        let mut set = JoinSet::new();
        for item in items {
            set.spawn(async move { item.stop().await });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(error) = joined {
                tracing::warn!(%error, "item stop task ended abnormally");
            }
        }
    }

    /// Stop all items and flush pending saves. Safe to call twice.
    pub async fn shutdown(&self) {
        self.stop_all().await;
        self.saver.shutdown().await;
    }

    /// Look up a live item by identifier, falling back to a scan on unique
    /// id.
    pub async fn get_item(&self, id: &str) -> Option<Arc<Item>> {
        let items = self.items.read().await;
        if let Some(item) = items.get(id) {
            return Some(Arc::clone(item));
        }
        items
            .values()
            .find(|item| item.unique_id().as_str() == id)
            .map(Arc::clone)
    }

    /// All live items, sorted by identifier.
    pub async fn items(&self) -> Vec<Arc<Item>> {
        let mut items: Vec<Arc<Item>> = self.items.read().await.values().cloned().collect();
        items.sort_by(|a, b| a.identifier().as_str().cmp(b.identifier().as_str()));
        items
    }

    /// All persisted entries, sorted by unique id.
    pub async fn entries(&self) -> Vec<StorageEntry> {
        let mut entries: Vec<StorageEntry> =
            self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.unique_id.as_str().cmp(b.unique_id.as_str()));
        entries
    }

    /// Insert into the live map, link dependencies both ways, start the
    /// item and announce it.
    async fn register_item(
        &self,
        item: &Arc<Item>,
        start_offline: bool,
    ) -> Result<(), DomoError> {
        {
            let mut items = self.items.write().await;
            if items.contains_key(item.identifier()) {
                return Err(ValidationError::DuplicateIdentifier(item.identifier().clone()).into());
            }
            items.insert(item.identifier().clone(), Arc::clone(item));
        }

        for unique_id in item.depends_on().await {
            if let Some(dep) = self.get_by_unique_id(&unique_id).await {
                dep.dependants.write().await.insert(item.unique_id().clone());
            }
        }

        item.start(start_offline).await;

        let status = item.status();
        tracing::info!(item = %item.identifier(), %status, "item registered");
        self.bus.emit(
            EventType::ItemCreated,
            Some(item.identifier().clone()),
            json!({
                "item_type": item.item_type(),
                "unique_id": item.unique_id(),
            }),
        );
        if !status.is_online() {
            self.bus.emit(
                EventType::ItemNotWorking,
                Some(item.identifier().clone()),
                json!({ "status": status }),
            );
        }
        Ok(())
    }

    /// Stop `root` and everything that transitively depends on it, then
    /// detach `root`'s links and delete it from the live map.
    async fn teardown(&self, root: &Arc<Item>) {
        for victim in self.stop_order(root).await {
            victim.stop().await;
        }

        for unique_id in root.depends_on().await {
            if let Some(dep) = self.get_by_unique_id(&unique_id).await {
                dep.dependants.write().await.remove(root.unique_id());
            }
        }
        for unique_id in root.dependants().await {
            if let Some(dependant) = self.get_by_unique_id(&unique_id).await {
                dependant.depends_on.write().await.remove(root.unique_id());
            }
        }
        root.depends_on.write().await.clear();
        root.dependants.write().await.clear();

        self.items.write().await.remove(root.identifier());
        tracing::info!(item = %root.identifier(), "item removed");
        self.bus.emit(
            EventType::ItemRemoved,
            Some(root.identifier().clone()),
            json!({ "unique_id": root.unique_id() }),
        );
    }

    /// Transitive dependants of `root` in stop order: deepest first, `root`
    /// itself last. Cycle-safe.
    async fn stop_order(&self, root: &Arc<Item>) -> Vec<Arc<Item>> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(Arc::clone(root), false)];
        while let Some((item, expanded)) = stack.pop() {
            if expanded {
                order.push(item);
                continue;
            }
            if !visited.insert(item.unique_id().clone()) {
                continue;
            }
            stack.push((Arc::clone(&item), true));
            for unique_id in item.dependants().await {
                if visited.contains(&unique_id) {
                    continue;
                }
                if let Some(dependant) = self.get_by_unique_id(&unique_id).await {
                    stack.push((dependant, false));
                }
            }
        }
        order
    }

    async fn get_by_unique_id(&self, unique_id: &UniqueId) -> Option<Arc<Item>> {
        self.items
            .read()
            .await
            .values()
            .find(|item| item.unique_id() == unique_id)
            .map(Arc::clone)
    }

    /// Snapshot the entry map into the saver; the write happens in the
    /// background.
    async fn schedule_save(&self) {
        let mut snapshot: Vec<StorageEntry> =
            self.entries.read().await.values().cloned().collect();
        snapshot.sort_by(|a, b| a.unique_id.as_str().cmp(b.unique_id.as_str()));
        self.saver.schedule(snapshot);
    }

    /// Order entries so that referenced items come before the entries
    /// referencing them (Kahn's algorithm over resolvable `ItemRef` fields).
    /// Members of a reference cycle keep their registration order at the
    /// end.
    fn dependency_order(&self, mut entries: Vec<StorageEntry>) -> Vec<StorageEntry> {
        entries.sort_by(|a, b| a.unique_id.as_str().cmp(b.unique_id.as_str()));
        let len = entries.len();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            by_key.insert(entry.unique_id.as_str().to_string(), index);
            by_key
                .entry(entry.identifier().as_str().to_string())
                .or_insert(index);
        }

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); len];
        let mut indegree = vec![0usize; len];
        for (index, entry) in entries.iter().enumerate() {
            let Some(type_def) = self.types.get(&entry.item_type) else {
                continue;
            };
            for key in type_def.config().item_refs() {
                let Some(reference) = entry.cfg.get(key).and_then(Value::as_str) else {
                    continue;
                };
                if let Some(&target) = by_key.get(reference) {
                    if target != index {
                        successors[target].push(index);
                        indegree[index] += 1;
                    }
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..len).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(len);
        let mut placed = vec![false; len];
        while let Some(index) = queue.pop_front() {
            placed[index] = true;
            order.push(index);
            for &next in &successors[index] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
        if order.len() < len {
            tracing::warn!("reference cycle among entries, keeping remaining order");
            order.extend((0..len).filter(|&i| !placed[i]));
        }

        let mut slots: Vec<Option<StorageEntry>> = entries.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect()
    }
}

impl<S> std::fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::action;
    use crate::module::{ItemParts, ItemTypeDef};
    use crate::state::setter;
    use domo_domain::error::NotFoundError;
    use domo_domain::schema::{ConfigKind, ConfigSchema, StateSchema};
    use domo_domain::state::{StateDef, StateDelta};
    use std::future::Future;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::broadcast::error::TryRecvError;

    struct InMemoryStore {
        entries: StdMutex<Vec<StorageEntry>>,
    }

    impl InMemoryStore {
        fn new(entries: Vec<StorageEntry>) -> Arc<Self> {
            Arc::new(Self {
                entries: StdMutex::new(entries),
            })
        }

        fn persisted(&self) -> Vec<StorageEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    impl EntryStore for InMemoryStore {
        fn load(&self) -> impl Future<Output = Result<Vec<StorageEntry>, DomoError>> + Send {
            let entries = self.entries.lock().unwrap().clone();
            async move { Ok(entries) }
        }

        fn save(
            &self,
            entries: Vec<StorageEntry>,
        ) -> impl Future<Output = Result<(), DomoError>> + Send {
            *self.entries.lock().unwrap() = entries;
            async { Ok(()) }
        }
    }

    struct FailingInitHandler;

    #[async_trait::async_trait]
    impl crate::item::ItemHandler for FailingInitHandler {
        async fn init(&self) -> Result<ItemStatus, DomoError> {
            Err(DomoError::not_found("item", "backing device"))
        }
    }

    fn test_types() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types.register(
            ItemTypeDef::builder()
                .name("test.bridge")
                .state(StateDef::new("connected", json!(true)))
                .build()
                .unwrap(),
        );
        types.register(
            ItemTypeDef::builder()
                .name("test.switch")
                .config(ConfigSchema::new().optional("bridge", ConfigKind::ItemRef))
                .state(StateDef::new("on", json!(false)).schema(StateSchema::Bool))
                .constructor(|_ctx| async move {
                    Ok(ItemParts::new()
                        .setter(
                            "on",
                            setter(|value| async move {
                                let mut delta = StateDelta::new();
                                delta.insert("on".to_string(), value);
                                Ok(delta)
                            }),
                        )
                        .action("noop", action(|_args| async { Ok(Value::Null) })))
                })
                .build()
                .unwrap(),
        );
        types.register(
            ItemTypeDef::builder()
                .name("test.broken")
                .constructor(|_ctx| async move {
                    Ok(ItemParts::new().handler(FailingInitHandler))
                })
                .build()
                .unwrap(),
        );
        types.register(
            ItemTypeDef::builder()
                .name("test.cursed")
                .constructor(|_ctx| async move {
                    Err::<ItemParts, _>(DomoError::not_found("item", "never works"))
                })
                .build()
                .unwrap(),
        );
        types
    }

    fn make_registry(
        seed: Vec<StorageEntry>,
    ) -> (Registry<Arc<InMemoryStore>>, Arc<InMemoryStore>) {
        let store = InMemoryStore::new(seed);
        let registry = Registry::with_save_debounce(
            test_types(),
            Arc::clone(&store),
            EventBus::new(64),
            Duration::from_millis(10),
        );
        (registry, store)
    }

    fn switch_entry(unique_id: &str, identifier: &str) -> StorageEntry {
        StorageEntry::builder()
            .unique_id(unique_id)
            .item_type("test.switch")
            .identifier(identifier)
            .build()
            .unwrap()
    }

    fn switch_with_bridge(unique_id: &str, identifier: &str, bridge: &str) -> StorageEntry {
        StorageEntry::builder()
            .unique_id(unique_id)
            .item_type("test.switch")
            .identifier(identifier)
            .cfg_value("bridge", json!(bridge))
            .build()
            .unwrap()
    }

    fn bridge_entry(unique_id: &str, identifier: &str) -> StorageEntry {
        StorageEntry::builder()
            .unique_id(unique_id)
            .item_type("test.bridge")
            .identifier(identifier)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_create_item_and_bring_it_online() {
        let (registry, _store) = make_registry(Vec::new());
        let mut rx = registry.bus().subscribe();

        let item = registry
            .create_item(&switch_entry("sw-1", "desk_lamp"))
            .await
            .unwrap();

        assert_eq!(item.status(), ItemStatus::Online);
        assert_eq!(item.identifier().as_str(), "desk_lamp");
        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::ItemCreated);
        assert_eq!(event.data["item_type"], json!("test.switch"));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_reject_duplicate_identifier() {
        let (registry, _store) = make_registry(Vec::new());
        registry
            .create_item(&switch_entry("sw-1", "desk_lamp"))
            .await
            .unwrap();

        let result = registry
            .create_item(&switch_entry("sw-2", "desk_lamp"))
            .await;
        assert!(matches!(
            result,
            Err(DomoError::Validation(ValidationError::DuplicateIdentifier(id))) if id.as_str() == "desk_lamp"
        ));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_error_on_unknown_item_type() {
        let (registry, _store) = make_registry(Vec::new());
        let entry = StorageEntry::builder()
            .unique_id("x-1")
            .item_type("test.toaster")
            .build()
            .unwrap();

        let result = registry.create_item(&entry).await;
        assert!(matches!(
            result,
            Err(DomoError::UnknownItemType(name)) if name == "test.toaster"
        ));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_reject_cfg_with_unknown_key() {
        let (registry, _store) = make_registry(Vec::new());
        let entry = StorageEntry::builder()
            .unique_id("sw-1")
            .item_type("test.switch")
            .cfg_value("bridgee", json!("oops"))
            .build()
            .unwrap();

        let result = registry.create_item(&entry).await;
        assert!(matches!(
            result,
            Err(DomoError::Validation(ValidationError::UnknownField(key))) if key == "bridgee"
        ));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_wrap_constructor_failure() {
        let (registry, _store) = make_registry(Vec::new());
        let entry = StorageEntry::builder()
            .unique_id("c-1")
            .item_type("test.cursed")
            .build()
            .unwrap();

        let result = registry.create_item(&entry).await;
        assert!(matches!(result, Err(DomoError::Construction { .. })));
        assert!(registry.get_item("c-1").await.is_none());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_register_offline_and_announce_when_init_fails() {
        let (registry, _store) = make_registry(Vec::new());
        let mut rx = registry.bus().subscribe();
        let entry = StorageEntry::builder()
            .unique_id("b-1")
            .item_type("test.broken")
            .build()
            .unwrap();

        let item = registry.create_item(&entry).await.unwrap();
        assert_eq!(item.status(), ItemStatus::Offline);

        assert_eq!(rx.try_recv().unwrap().event_type, EventType::ItemCreated);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::ItemNotWorking);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_return_existing_item_when_registering_same_entry_again() {
        let (registry, _store) = make_registry(Vec::new());

        let first = registry
            .register_entry(switch_entry("sw-1", "desk_lamp"), false)
            .await
            .unwrap()
            .unwrap();
        let second = registry
            .register_entry(switch_entry("sw-1", "desk_lamp"), false)
            .await
            .unwrap()
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.items().await.len(), 1);
        assert_eq!(registry.entries().await.len(), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_recreate_item_when_overwriting_entry() {
        let (registry, _store) = make_registry(Vec::new());

        let first = registry
            .register_entry(switch_entry("sw-1", "desk_lamp"), false)
            .await
            .unwrap()
            .unwrap();
        let second = registry
            .register_entry(switch_entry("sw-1", "desk_lamp"), true)
            .await
            .unwrap()
            .unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.status(), ItemStatus::Stopped);
        assert_eq!(second.status(), ItemStatus::Online);
        assert_eq!(registry.items().await.len(), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_not_instantiate_disabled_entry() {
        let (registry, _store) = make_registry(Vec::new());
        let entry = StorageEntry::builder()
            .unique_id("sw-1")
            .item_type("test.switch")
            .enabled(false)
            .build()
            .unwrap();

        let item = registry.register_entry(entry, false).await.unwrap();
        assert!(item.is_none());
        assert!(registry.items().await.is_empty());
        assert_eq!(registry.entries().await.len(), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_start_offline_when_reference_missing_then_recover_on_override() {
        let (registry, _store) = make_registry(Vec::new());

        let lamp = registry
            .register_entry(
                switch_with_bridge("sw-1", "desk_lamp", "hallway_bridge"),
                false,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lamp.status(), ItemStatus::Offline);
        assert!(lamp.depends_on().await.is_empty());

        registry
            .register_entry(bridge_entry("br-1", "hallway_bridge"), false)
            .await
            .unwrap()
            .unwrap();
        let lamp = registry
            .register_entry(
                switch_with_bridge("sw-1", "desk_lamp", "hallway_bridge"),
                true,
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(lamp.status(), ItemStatus::Online);
        assert!(lamp.depends_on().await.contains(&UniqueId::new("br-1")));
        let bridge = registry.get_item("hallway_bridge").await.unwrap();
        assert!(bridge.dependants().await.contains(&UniqueId::new("sw-1")));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_stop_transitive_dependants_before_removal() {
        let (registry, _store) = make_registry(Vec::new());

        registry
            .register_entry(bridge_entry("br-1", "bridge"), false)
            .await
            .unwrap();
        registry
            .register_entry(switch_with_bridge("sw-1", "lamp_a", "bridge"), false)
            .await
            .unwrap();
        registry
            .register_entry(switch_with_bridge("sw-2", "lamp_b", "lamp_a"), false)
            .await
            .unwrap();
        let untouched = registry
            .register_entry(switch_entry("sw-3", "lamp_c"), false)
            .await
            .unwrap()
            .unwrap();
        let mut rx = registry.bus().subscribe();

        registry.remove_item("bridge").await;

        assert!(registry.get_item("bridge").await.is_none());
        let lamp_a = registry.get_item("lamp_a").await.unwrap();
        let lamp_b = registry.get_item("lamp_b").await.unwrap();
        assert_eq!(lamp_a.status(), ItemStatus::Stopped);
        assert_eq!(lamp_b.status(), ItemStatus::Stopped);
        assert_eq!(untouched.status(), ItemStatus::Online);
        assert!(lamp_a.depends_on().await.is_empty());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::ItemRemoved);
        assert_eq!(event.item.as_ref().unwrap().as_str(), "bridge");
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_ignore_removal_of_unknown_item() {
        let (registry, _store) = make_registry(Vec::new());
        registry.remove_item("phantom").await;
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_restore_entries_in_dependency_order_on_load() {
        // the switch sorts before the bridge by unique id, the reference
        // still has to win
        let seed = vec![
            switch_with_bridge("a-switch", "desk_lamp", "hallway_bridge"),
            bridge_entry("z-bridge", "hallway_bridge"),
        ];
        let (registry, _store) = make_registry(seed);

        registry.load().await.unwrap();

        let lamp = registry.get_item("desk_lamp").await.unwrap();
        assert_eq!(lamp.status(), ItemStatus::Online);
        assert!(lamp.depends_on().await.contains(&UniqueId::new("z-bridge")));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_skip_failing_entries_during_load() {
        let seed = vec![
            StorageEntry::builder()
                .unique_id("c-1")
                .item_type("test.cursed")
                .build()
                .unwrap(),
            switch_entry("sw-1", "desk_lamp"),
        ];
        let (registry, _store) = make_registry(seed);

        registry.load().await.unwrap();

        assert!(registry.get_item("c-1").await.is_none());
        assert!(registry.get_item("desk_lamp").await.is_some());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_reload_provider_wholesale() {
        let (registry, _store) = make_registry(Vec::new());

        // the builder defaults to the file provider
        registry
            .register_entry(switch_entry("sw-a", "lamp_a"), false)
            .await
            .unwrap();
        registry
            .register_entry(switch_entry("sw-b", "lamp_b"), false)
            .await
            .unwrap();
        let mut api = switch_entry("sw-api", "lamp_api");
        api.provider = "api".to_string();
        registry.register_entry(api, false).await.unwrap();

        // new file set drops lamp_b, keeps lamp_a, adds lamp_c
        registry
            .reload_provider(
                "file",
                vec![
                    switch_entry("sw-a", "lamp_a"),
                    switch_entry("sw-c", "lamp_c"),
                ],
            )
            .await;

        assert!(registry.get_item("lamp_a").await.is_some());
        assert!(registry.get_item("lamp_b").await.is_none());
        assert!(registry.get_item("lamp_c").await.is_some());
        assert!(registry.get_item("lamp_api").await.is_some());
        let entries = registry.entries().await;
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.unique_id.as_str() != "sw-b"));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_remove_entry_and_its_item() {
        let (registry, store) = make_registry(Vec::new());
        registry
            .register_entry(switch_entry("sw-1", "desk_lamp"), false)
            .await
            .unwrap();

        registry.remove_entry(&UniqueId::new("sw-1")).await;

        assert!(registry.get_item("desk_lamp").await.is_none());
        assert!(registry.entries().await.is_empty());
        registry.shutdown().await;
        assert!(store.persisted().is_empty());
    }

    #[tokio::test]
    async fn should_persist_entries_through_saver() {
        let (registry, store) = make_registry(Vec::new());
        registry
            .register_entry(switch_entry("sw-1", "desk_lamp"), false)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        let persisted = store.persisted();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].unique_id.as_str(), "sw-1");
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_find_item_by_unique_id_fallback() {
        let (registry, _store) = make_registry(Vec::new());
        registry
            .register_entry(switch_entry("sw-1", "desk_lamp"), false)
            .await
            .unwrap();

        let by_identifier = registry.get_item("desk_lamp").await.unwrap();
        let by_unique_id = registry.get_item("sw-1").await.unwrap();
        assert!(Arc::ptr_eq(&by_identifier, &by_unique_id));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_stop_every_item_on_stop_all() {
        let (registry, _store) = make_registry(Vec::new());
        registry
            .register_entry(switch_entry("sw-1", "lamp_a"), false)
            .await
            .unwrap();
        registry
            .register_entry(switch_entry("sw-2", "lamp_b"), false)
            .await
            .unwrap();

        registry.shutdown().await;
        registry.shutdown().await;

        for item in registry.items().await {
            assert_eq!(item.status(), ItemStatus::Stopped);
        }
    }

    #[tokio::test]
    async fn should_set_state_through_live_item() {
        let (registry, _store) = make_registry(Vec::new());
        let item = registry
            .create_item(&switch_entry("sw-1", "desk_lamp"))
            .await
            .unwrap();
        let mut rx = registry.bus().subscribe();

        let delta = item.states().set("on", json!(true)).await.unwrap();
        assert_eq!(delta.get("on"), Some(&json!(true)));
        assert_eq!(item.states().get("on").await.unwrap(), Some(json!(true)));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::StateChange);
        assert_eq!(event.data["changes"]["on"], json!(true));

        let result = item.actions().execute("missing", json!({})).await;
        assert!(matches!(result, Err(DomoError::ActionNotFound { .. })));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn should_report_not_found_for_unknown_state_via_item() {
        let (registry, _store) = make_registry(Vec::new());
        let item = registry
            .create_item(&switch_entry("sw-1", "desk_lamp"))
            .await
            .unwrap();

        let result = item.states().get("volume").await;
        assert!(matches!(
            result,
            Err(DomoError::NotFound(NotFoundError { what: "state", .. }))
        ));
        registry.shutdown().await;
    }
}
