//! Type registration — the static table of item type definitions.
//!
//! A module crate (virtual items, protocol bindings) describes each of its
//! item types declaratively: a config schema, an ordered list of state slot
//! declarations and an async constructor. Modules register their defs into
//! the [`TypeRegistry`] at startup; the item registry resolves
//! `<module>.<type>` strings against it when materializing items. There is
//! no dynamic plugin loading.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use domo_domain::error::{DomoError, ValidationError};
use domo_domain::id::{ItemId, UniqueId};
use domo_domain::schema::{ConfigMap, ConfigSchema};
use domo_domain::state::StateDef;

use crate::actions::ActionFn;
use crate::event_bus::EventBus;
use crate::item::{Item, ItemHandler, NoopHandler, StatusCell};
use crate::state::{Getter, Setter, StateBindings};

/// Async factory producing the per-instance parts of an item.
pub type Constructor =
    Arc<dyn Fn(ItemContext) -> BoxFuture<'static, Result<ItemParts, DomoError>> + Send + Sync>;

/// Everything a constructor gets to work with.
pub struct ItemContext {
    /// Process-local identifier of the item being built.
    pub identifier: ItemId,
    /// Stable identity of the item being built.
    pub unique_id: UniqueId,
    /// Display name.
    pub name: String,
    /// Configuration already validated against the type's schema.
    pub cfg: ConfigMap,
    /// Live handles for the `ItemRef` fields that resolved, keyed by the
    /// config field key. A missing key means the reference did not resolve
    /// and the item will start offline.
    pub deps: HashMap<String, Arc<Item>>,
    /// The status cell shared with the item; handlers keep a clone to flip
    /// the item between online and offline.
    pub status: StatusCell,
    /// Bus handle for handlers that publish their own events.
    pub bus: EventBus,
}

impl ItemContext {
    /// The resolved dependency behind the config field `key`, if any.
    #[must_use]
    pub fn dep(&self, key: &str) -> Option<&Arc<Item>> {
        self.deps.get(key)
    }

    /// String config value under `key`.
    #[must_use]
    pub fn cfg_str(&self, key: &str) -> Option<&str> {
        self.cfg.get(key).and_then(Value::as_str)
    }

    /// Integer config value under `key`.
    #[must_use]
    pub fn cfg_i64(&self, key: &str) -> Option<i64> {
        self.cfg.get(key).and_then(Value::as_i64)
    }

    /// Float config value under `key`.
    #[must_use]
    pub fn cfg_f64(&self, key: &str) -> Option<f64> {
        self.cfg.get(key).and_then(Value::as_f64)
    }

    /// Boolean config value under `key`.
    #[must_use]
    pub fn cfg_bool(&self, key: &str) -> Option<bool> {
        self.cfg.get(key).and_then(Value::as_bool)
    }
}

impl std::fmt::Debug for ItemContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemContext")
            .field("identifier", &self.identifier)
            .field("unique_id", &self.unique_id)
            .field("deps", &self.deps.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// What a constructor hands back: the handler plus the bindings the item
/// registry wires into the state and action layers.
pub struct ItemParts {
    pub(crate) handler: Box<dyn ItemHandler>,
    pub(crate) bindings: StateBindings,
    pub(crate) actions: HashMap<String, ActionFn>,
}

impl ItemParts {
    /// Parts with a no-op handler and no bindings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handler: Box::new(NoopHandler),
            bindings: StateBindings::new(),
            actions: HashMap::new(),
        }
    }

    /// Replace the no-op handler.
    #[must_use]
    pub fn handler(mut self, handler: impl ItemHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Bind a getter to a declared slot.
    #[must_use]
    pub fn getter(mut self, slot: impl Into<String>, getter: Getter) -> Self {
        self.bindings = self.bindings.getter(slot, getter);
        self
    }

    /// Bind a setter to a declared slot.
    #[must_use]
    pub fn setter(mut self, slot: impl Into<String>, setter: Setter) -> Self {
        self.bindings = self.bindings.setter(slot, setter);
        self
    }

    /// Register a named action.
    #[must_use]
    pub fn action(mut self, name: impl Into<String>, action: ActionFn) -> Self {
        self.actions.insert(name.into(), action);
        self
    }
}

impl Default for ItemParts {
    fn default() -> Self {
        Self::new()
    }
}

/// Declarative definition of one item type.
pub struct ItemTypeDef {
    name: String,
    config: ConfigSchema,
    states: Vec<StateDef>,
    constructor: Constructor,
}

impl ItemTypeDef {
    /// Create a builder for constructing an [`ItemTypeDef`].
    #[must_use]
    pub fn builder() -> ItemTypeDefBuilder {
        ItemTypeDefBuilder::default()
    }

    /// The `<module>.<type>` name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema the item's configuration must satisfy.
    #[must_use]
    pub fn config(&self) -> &ConfigSchema {
        &self.config
    }

    /// Declared state slots, in declaration order.
    #[must_use]
    pub fn states(&self) -> &[StateDef] {
        &self.states
    }

    /// Run the type's constructor.
    ///
    /// # Errors
    ///
    /// Whatever the constructor itself returns; the registry wraps it in
    /// [`DomoError::Construction`].
    pub async fn construct(&self, ctx: ItemContext) -> Result<ItemParts, DomoError> {
        (self.constructor)(ctx).await
    }
}

impl std::fmt::Debug for ItemTypeDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemTypeDef")
            .field("name", &self.name)
            .field("states", &self.states.len())
            .finish_non_exhaustive()
    }
}

/// Step-by-step builder for [`ItemTypeDef`].
#[derive(Default)]
pub struct ItemTypeDefBuilder {
    name: Option<String>,
    config: ConfigSchema,
    states: Vec<StateDef>,
    constructor: Option<Constructor>,
}

impl ItemTypeDefBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn config(mut self, config: ConfigSchema) -> Self {
        self.config = config;
        self
    }

    /// Declare a state slot. Order is preserved.
    #[must_use]
    pub fn state(mut self, def: StateDef) -> Self {
        self.states.push(def);
        self
    }

    #[must_use]
    pub fn constructor<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ItemContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ItemParts, DomoError>> + Send + 'static,
    {
        self.constructor = Some(Arc::new(move |ctx| Box::pin(f(ctx))));
        self
    }

    /// Consume the builder, validate, and return an [`ItemTypeDef`].
    ///
    /// A type without an explicit constructor gets a default one producing
    /// plain cached slots and a no-op handler.
    ///
    /// # Errors
    ///
    /// Returns [`DomoError::Validation`] if `name` is missing or empty.
    pub fn build(self) -> Result<ItemTypeDef, DomoError> {
        let name = self.name.unwrap_or_default();
        if name.is_empty() {
            return Err(ValidationError::EmptyItemType.into());
        }
        Ok(ItemTypeDef {
            name,
            config: self.config,
            states: self.states,
            constructor: self
                .constructor
                .unwrap_or_else(|| Arc::new(|_ctx| Box::pin(async { Ok(ItemParts::new()) }))),
        })
    }
}

/// The table of item type definitions known to the process.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, ItemTypeDef>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type definition under its name. Re-registering a name
    /// replaces the previous definition with a warning.
    pub fn register(&mut self, def: ItemTypeDef) {
        if let Some(previous) = self.types.insert(def.name().to_string(), def) {
            tracing::warn!(item_type = previous.name(), "item type definition replaced");
        }
    }

    /// Look up a type definition by its `<module>.<type>` name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ItemTypeDef> {
        self.types.get(name)
    }

    /// Registered type names, sorted for stable output.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
