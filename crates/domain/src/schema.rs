//! Explicit value and configuration schemas.
//!
//! Item types declare what their state slots and configuration accept using
//! plain data instead of runtime type introspection: a [`StateSchema`] per
//! slot and a [`ConfigSchema`] per type. The runtime walks these at
//! construction and mutation time.

use serde_json::Value;

use crate::error::ValidationError;

/// A JSON object holding an item's type-specific configuration.
pub type ConfigMap = serde_json::Map<String, Value>;

/// Validation schema for a single state slot.
#[derive(Debug, Clone, PartialEq)]
pub enum StateSchema {
    /// `true` / `false`.
    Bool,
    /// Whole number, optionally bounded (inclusive).
    Integer { min: Option<i64>, max: Option<i64> },
    /// Floating point (integers accepted), optionally bounded (inclusive).
    Float { min: Option<f64>, max: Option<f64> },
    /// String, optionally length-capped.
    Text { max_len: Option<usize> },
    /// Exactly one of the listed values.
    OneOf(Vec<Value>),
    /// Anything goes.
    Any,
}

impl StateSchema {
    /// Check `value` against the schema.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the first violation.
    pub fn check(&self, name: &str, value: &Value) -> Result<(), ValidationError> {
        match self {
            Self::Bool => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(wrong_type(name, "a boolean", value))
                }
            }
            Self::Integer { min, max } => {
                let Some(n) = value.as_i64() else {
                    return Err(wrong_type(name, "an integer", value));
                };
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    return Err(ValidationError::OutOfRange {
                        name: name.to_string(),
                        value: n.to_string(),
                    });
                }
                Ok(())
            }
            Self::Float { min, max } => {
                let Some(n) = value.as_f64() else {
                    return Err(wrong_type(name, "a number", value));
                };
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    return Err(ValidationError::OutOfRange {
                        name: name.to_string(),
                        value: n.to_string(),
                    });
                }
                Ok(())
            }
            Self::Text { max_len } => {
                let Some(s) = value.as_str() else {
                    return Err(wrong_type(name, "a string", value));
                };
                if let Some(max) = max_len {
                    if s.chars().count() > *max {
                        return Err(ValidationError::TooLong {
                            name: name.to_string(),
                            max: *max,
                        });
                    }
                }
                Ok(())
            }
            Self::OneOf(allowed) => {
                if allowed.contains(value) {
                    Ok(())
                } else {
                    Err(ValidationError::NotInSet {
                        name: name.to_string(),
                        got: value.to_string(),
                    })
                }
            }
            Self::Any => Ok(()),
        }
    }
}

/// Kind of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    Bool,
    Integer,
    Float,
    Text,
    /// The identifier of another item. The registry resolves these into live
    /// item handles and records dependency links.
    ItemRef,
    Any,
}

/// One declared configuration field.
#[derive(Debug, Clone)]
pub struct ConfigField {
    pub key: String,
    pub required: bool,
    pub kind: ConfigKind,
}

/// Declarative schema for an item type's configuration object.
///
/// Unknown keys are rejected: a typo in a config file should fail loudly at
/// item creation, not surface later as a silently-ignored setting.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    fields: Vec<ConfigField>,
}

impl ConfigSchema {
    /// An empty schema (only the empty configuration is valid).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required field.
    #[must_use]
    pub fn required(mut self, key: impl Into<String>, kind: ConfigKind) -> Self {
        self.fields.push(ConfigField {
            key: key.into(),
            required: true,
            kind,
        });
        self
    }

    /// Declare an optional field.
    #[must_use]
    pub fn optional(mut self, key: impl Into<String>, kind: ConfigKind) -> Self {
        self.fields.push(ConfigField {
            key: key.into(),
            required: false,
            kind,
        });
        self
    }

    /// The declared fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[ConfigField] {
        &self.fields
    }

    /// Keys of fields declared as [`ConfigKind::ItemRef`].
    pub fn item_refs(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.kind == ConfigKind::ItemRef)
            .map(|f| f.key.as_str())
    }

    /// Validate a configuration object against this schema.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a missing required key, an unknown
    /// key, or a value of the wrong kind.
    pub fn validate(&self, cfg: &ConfigMap) -> Result<(), ValidationError> {
        for field in &self.fields {
            match cfg.get(&field.key) {
                Some(value) => check_kind(&field.key, field.kind, value)?,
                None if field.required => {
                    return Err(ValidationError::MissingField(field.key.clone()));
                }
                None => {}
            }
        }
        for key in cfg.keys() {
            if !self.fields.iter().any(|f| &f.key == key) {
                return Err(ValidationError::UnknownField(key.clone()));
            }
        }
        Ok(())
    }
}

fn check_kind(key: &str, kind: ConfigKind, value: &Value) -> Result<(), ValidationError> {
    let ok = match kind {
        ConfigKind::Bool => value.is_boolean(),
        ConfigKind::Integer => value.is_i64() || value.is_u64(),
        ConfigKind::Float => value.is_number(),
        ConfigKind::Text | ConfigKind::ItemRef => value.is_string(),
        ConfigKind::Any => true,
    };
    if ok {
        Ok(())
    } else {
        let expected = match kind {
            ConfigKind::Bool => "a boolean",
            ConfigKind::Integer => "an integer",
            ConfigKind::Float => "a number",
            ConfigKind::Text => "a string",
            ConfigKind::ItemRef => "an item identifier string",
            ConfigKind::Any => "anything",
        };
        Err(wrong_type(key, expected, value))
    }
}

fn wrong_type(name: &str, expected: &'static str, got: &Value) -> ValidationError {
    ValidationError::WrongType {
        name: name.to_string(),
        expected,
        got: got.to_string(),
    }
}
