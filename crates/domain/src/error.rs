//! Common error types used across the workspace.
//!
//! `DomoError` is the base enum crossing crate boundaries. Each layer defines
//! its own typed errors and converts via `#[from]` or an explicit
//! `into_domain` at the port boundary (adapters wrap their local errors in
//! [`DomoError::Storage`]).

use crate::id::ItemId;
use crate::status::ItemStatus;

/// Base error enum for the domo core.
#[derive(Debug, thiserror::Error)]
pub enum DomoError {
    /// A schema or invariant check rejected a value.
    #[error("validation failed")]
    Validation(#[from] ValidationError),

    /// A registry or state-slot lookup missed.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// `create_item` was given a type with no registered definition.
    #[error("unknown item type `{0}`")]
    UnknownItemType(String),

    /// State mutation was attempted while the item is not online.
    #[error("item `{item}` is {status}, not online")]
    NotOnline { item: ItemId, status: ItemStatus },

    /// `execute` was given an action name the item does not register.
    #[error("item `{item}` has no action named `{action}`")]
    ActionNotFound { item: ItemId, action: String },

    /// An item type constructor failed. Recovered locally by the caller
    /// (bootstrap loops log and move on); never crashes the process.
    #[error("failed to construct item `{item}`")]
    Construction {
        item: ItemId,
        #[source]
        source: Box<DomoError>,
    },

    /// An entry store operation failed.
    #[error("storage failure")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DomoError {
    /// Wrap a failure from an item type constructor.
    #[must_use]
    pub fn construction(item: ItemId, source: DomoError) -> Self {
        Self::Construction {
            item,
            source: Box::new(source),
        }
    }

    /// Shorthand for a [`NotFoundError`].
    #[must_use]
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        NotFoundError {
            what,
            id: id.into(),
        }
        .into()
    }
}

/// A lookup miss — typically reported to the caller, not fatal.
#[derive(Debug, thiserror::Error)]
#[error("{what} `{id}` not found")]
pub struct NotFoundError {
    /// What kind of thing was looked up ("item", "state", "entry").
    pub what: &'static str,
    /// The identifier that missed.
    pub id: String,
}

/// Schema and invariant violations.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// A storage entry carries an empty unique identifier.
    #[error("storage entry has an empty unique identifier")]
    EmptyUniqueId,

    /// A storage entry carries an empty item type.
    #[error("storage entry has an empty item type")]
    EmptyItemType,

    /// An item with this identifier is already registered.
    #[error("item identifier `{0}` is already registered")]
    DuplicateIdentifier(ItemId),

    /// A value does not have the type the schema demands.
    #[error("`{name}` expects {expected}, got `{got}`")]
    WrongType {
        name: String,
        expected: &'static str,
        got: String,
    },

    /// A numeric value is outside the declared bounds.
    #[error("`{name}` value {value} is out of range")]
    OutOfRange { name: String, value: String },

    /// A text value exceeds the declared maximum length.
    #[error("`{name}` exceeds maximum length {max}")]
    TooLong { name: String, max: usize },

    /// A value is not one of the declared alternatives.
    #[error("`{name}` value `{got}` is not an allowed alternative")]
    NotInSet { name: String, got: String },

    /// A required configuration key is missing.
    #[error("missing required configuration key `{0}`")]
    MissingField(String),

    /// A configuration key is not declared by the item type's schema.
    #[error("unknown configuration key `{0}`")]
    UnknownField(String),
}
