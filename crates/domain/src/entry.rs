//! Storage entry — the persisted description of one item.
//!
//! Entries are what survives a restart: which items exist, how they are
//! configured and which provider declared them. The registry turns entries
//! into live items at load time and keeps the stored set in sync as items
//! come and go.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DomoError, ValidationError};
use crate::id::{ItemId, UniqueId};
use crate::schema::ConfigMap;

/// Entries declared through configuration files.
pub const PROVIDER_FILE: &str = "file";
/// Entries declared at runtime through the registry API.
pub const PROVIDER_API: &str = "api";

/// Persisted description of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Stable identity across renames and restarts.
    pub unique_id: UniqueId,
    /// Name of the item type that constructs this item.
    pub item_type: String,
    /// Which source declared the entry, see [`PROVIDER_FILE`] and
    /// [`PROVIDER_API`].
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Human-chosen identifier. Absent (or empty) means the unique id
    /// doubles as the identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<ItemId>,
    /// Display name. Absent means the identifier doubles as the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Disabled entries are kept in storage but never instantiated.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Type-specific configuration, validated against the type's schema.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub cfg: ConfigMap,
    /// Initial slot values overriding the type's declared defaults.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub state_defaults: HashMap<String, Value>,
    /// Hidden entries are instantiated but left out of user-facing listings.
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
}

impl StorageEntry {
    /// Create a builder for constructing a [`StorageEntry`].
    #[must_use]
    pub fn builder() -> StorageEntryBuilder {
        StorageEntryBuilder::default()
    }

    /// The effective identifier: the explicit one when set and non-empty,
    /// otherwise the unique id.
    #[must_use]
    pub fn identifier(&self) -> ItemId {
        match &self.identifier {
            Some(id) if !id.is_empty() => id.clone(),
            _ => self.unique_id.clone().into(),
        }
    }

    /// The effective display name: the explicit one when set, otherwise the
    /// effective identifier.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.identifier().as_str().to_string(),
        }
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DomoError::Validation`] when `unique_id` or `item_type` is
    /// empty.
    pub fn validate(&self) -> Result<(), DomoError> {
        if self.unique_id.is_empty() {
            return Err(ValidationError::EmptyUniqueId.into());
        }
        if self.item_type.is_empty() {
            return Err(ValidationError::EmptyItemType.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`StorageEntry`].
#[derive(Debug, Default)]
pub struct StorageEntryBuilder {
    unique_id: Option<UniqueId>,
    item_type: Option<String>,
    provider: Option<String>,
    identifier: Option<ItemId>,
    name: Option<String>,
    enabled: Option<bool>,
    cfg: ConfigMap,
    state_defaults: HashMap<String, Value>,
    hidden: bool,
}

impl StorageEntryBuilder {
    #[must_use]
    pub fn unique_id(mut self, unique_id: impl Into<UniqueId>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    #[must_use]
    pub fn item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn identifier(mut self, identifier: impl Into<ItemId>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn cfg(mut self, cfg: ConfigMap) -> Self {
        self.cfg = cfg;
        self
    }

    #[must_use]
    pub fn cfg_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.cfg.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn state_default(mut self, slot: impl Into<String>, value: Value) -> Self {
        self.state_defaults.insert(slot.into(), value);
        self
    }

    #[must_use]
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Consume the builder, validate, and return a [`StorageEntry`].
    ///
    /// # Errors
    ///
    /// Returns [`DomoError::Validation`] if `unique_id` or `item_type` is
    /// missing or empty.
    pub fn build(self) -> Result<StorageEntry, DomoError> {
        let entry = StorageEntry {
            unique_id: self.unique_id.unwrap_or_default(),
            item_type: self.item_type.unwrap_or_default(),
            provider: self.provider.unwrap_or_else(default_provider),
            identifier: self.identifier,
            name: self.name,
            enabled: self.enabled.unwrap_or(true),
            cfg: self.cfg,
            state_defaults: self.state_defaults,
            hidden: self.hidden,
        };
        entry.validate()?;
        Ok(entry)
    }
}

fn default_provider() -> String {
    PROVIDER_FILE.to_string()
}

fn default_true() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}
