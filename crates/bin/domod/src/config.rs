//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `domod.toml` in the working directory unless `DOMO_CONFIG`
//! points elsewhere. Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.
//!
//! Item declarations (`[[items]]` tables) become file-provider storage
//! entries and are reconciled wholesale on startup and on SIGHUP: entries
//! that vanished from the file are removed, the rest re-registered.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use domo_domain::entry::{PROVIDER_FILE, StorageEntry};
use domo_domain::schema::ConfigMap;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Entry store settings.
    pub store: StoreConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Event bus settings.
    pub events: EventsConfig,
    /// Declarative item set, reconciled as the file provider.
    pub items: Vec<ItemDecl>,
}

/// Entry store configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON entry file.
    pub path: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Event bus configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity; slow subscribers past this lag.
    pub capacity: usize,
}

/// One declarative item, a `[[items]]` table in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDecl {
    /// Stable identity of the item.
    pub unique_id: String,
    /// Item type name, e.g. `virtual.switch`.
    #[serde(rename = "type")]
    pub item_type: String,
    /// Process-local identifier; defaults to the unique id.
    #[serde(default)]
    pub identifier: Option<String>,
    /// Display name; defaults to the identifier.
    #[serde(default)]
    pub name: Option<String>,
    /// Disabled items are stored but never instantiated.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Hidden items are instantiated but left out of listings.
    #[serde(default)]
    pub hidden: bool,
    /// Type-specific configuration.
    #[serde(default)]
    pub cfg: toml::Table,
    /// Initial slot values overriding the type's defaults.
    #[serde(default)]
    pub state_defaults: toml::Table,
}

impl ItemDecl {
    /// Convert the declaration into a file-provider [`StorageEntry`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a config value cannot be represented as
    /// JSON or the entry fails domain validation.
    pub fn to_entry(&self) -> Result<StorageEntry, ConfigError> {
        let mut builder = StorageEntry::builder()
            .unique_id(self.unique_id.as_str())
            .item_type(self.item_type.as_str())
            .provider(PROVIDER_FILE)
            .enabled(self.enabled)
            .hidden(self.hidden)
            .cfg(table_to_map(&self.cfg)?);
        if let Some(identifier) = &self.identifier {
            builder = builder.identifier(identifier.as_str());
        }
        if let Some(name) = &self.name {
            builder = builder.name(name.as_str());
        }
        for (slot, value) in table_to_defaults(&self.state_defaults)? {
            builder = builder.state_default(slot, value);
        }
        builder
            .build()
            .map_err(|err| ConfigError::Item(self.unique_id.clone(), err.to_string()))
    }
}

fn table_to_map(table: &toml::Table) -> Result<ConfigMap, ConfigError> {
    let mut map = ConfigMap::new();
    for (key, value) in table {
        map.insert(key.clone(), serde_json::to_value(value)?);
    }
    Ok(map)
}

fn table_to_defaults(table: &toml::Table) -> Result<HashMap<String, Value>, ConfigError> {
    let mut map = HashMap::new();
    for (key, value) in table {
        map.insert(key.clone(), serde_json::to_value(value)?);
    }
    Ok(map)
}

impl Config {
    /// Default config file path, relative to the working directory.
    pub const DEFAULT_PATH: &'static str = "domod.toml";

    /// Load configuration from `path` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is malformed, or a value
    /// fails validation.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DOMO_STORE_PATH") {
            self.store.path = val;
        }
        if let Ok(val) = std::env::var("DOMO_EVENT_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.events.capacity = capacity;
            }
        }
        if let Ok(val) = std::env::var("DOMO_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.events.capacity == 0 {
            return Err(ConfigError::Validation(
                "events.capacity must be non-zero".to_string(),
            ));
        }
        if self.store.path.is_empty() {
            return Err(ConfigError::Validation(
                "store.path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Convert every item declaration into a storage entry.
    ///
    /// # Errors
    ///
    /// Returns the first declaration that fails conversion.
    pub fn entries(&self) -> Result<Vec<StorageEntry>, ConfigError> {
        self.items.iter().map(ItemDecl::to_entry).collect()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "domo.json".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "domod=info,domo=info".to_string(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

fn default_true() -> bool {
    true
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// A TOML value with no JSON representation (datetimes, mainly).
    #[error("unrepresentable config value")]
    Convert(#[from] serde_json::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
    /// An item declaration that fails domain validation.
    #[error("invalid item declaration `{0}`: {1}")]
    Item(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.store.path, "domo.json");
        assert_eq!(config.events.capacity, 256);
        assert!(config.items.is_empty());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.store.path, "domo.json");
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = r#"
            [store]
            path = "/var/lib/domo/entries.json"

            [logging]
            filter = "debug"

            [events]
            capacity = 64

            [[items]]
            unique_id = "sw-1"
            type = "virtual.switch"
            identifier = "desk_switch"
            name = "Desk switch"

            [[items]]
            unique_id = "se-1"
            type = "virtual.sensor"
            identifier = "room_temp"

            [items.cfg]
            midpoint = 18.5
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.store.path, "/var/lib/domo/entries.json");
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.events.capacity, 64);
        assert_eq!(config.items.len(), 2);
        assert_eq!(config.items[1].cfg.get("midpoint"), Some(&toml::Value::Float(18.5)));
    }

    #[test]
    fn should_convert_declaration_into_file_entry() {
        let toml = r#"
            unique_id = "li-1"
            type = "virtual.light"
            identifier = "lounge_light"

            [state_defaults]
            brightness = 120
        "#;
        let decl: ItemDecl = toml::from_str(toml).unwrap();

        let entry = decl.to_entry().unwrap();
        assert_eq!(entry.unique_id.as_str(), "li-1");
        assert_eq!(entry.item_type, "virtual.light");
        assert_eq!(entry.provider, PROVIDER_FILE);
        assert_eq!(entry.identifier().as_str(), "lounge_light");
        assert_eq!(entry.state_defaults.get("brightness"), Some(&json!(120)));
    }

    #[test]
    fn should_reject_declaration_without_unique_id() {
        let decl = ItemDecl {
            unique_id: String::new(),
            item_type: "virtual.switch".to_string(),
            identifier: None,
            name: None,
            enabled: true,
            hidden: false,
            cfg: toml::Table::new(),
            state_defaults: toml::Table::new(),
        };
        assert!(matches!(decl.to_entry(), Err(ConfigError::Item(..))));
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.events.capacity, 256);
    }

    #[test]
    fn should_reject_zero_event_capacity() {
        let mut config = Config::default();
        config.events.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_collect_entries_for_all_declarations() {
        let toml = r#"
            [[items]]
            unique_id = "a"
            type = "virtual.switch"

            [[items]]
            unique_id = "b"
            type = "virtual.light"
            enabled = false
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let entries = config.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!entries[1].enabled);
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
