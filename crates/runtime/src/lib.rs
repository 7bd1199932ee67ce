//! # domo-runtime
//!
//! Item runtime — the live model of the hub and its **port definitions**.
//!
//! ## Responsibilities
//! - Represent devices as addressable, stateful [`item::Item`]s with
//!   declarative state slots ([`state::StateRegistry`]) and named operations
//!   ([`actions::ActionRegistry`])
//! - Manage the item lifecycle through the dependency-aware
//!   [`registry::Registry`]: construction, initialization, status tracking,
//!   teardown, persisted configuration reconciliation
//! - Define the **port trait** adapters implement (driven/outbound):
//!   - [`ports::EntryStore`] — durable load/save of [`StorageEntry`] sets
//! - Host the static [`module::TypeRegistry`] that module crates populate
//!   with their item type definitions at startup
//! - Provide **in-process infrastructure** (event bus, save coalescing) that
//!   doesn't need IO
//!
//! ## Dependency rule
//! Depends on `domo-domain` only (plus `tokio::sync`/`tokio::time`,
//! `tokio-util` cancellation and `futures` future boxing). Never imports
//! adapter crates. Adapters depend on *this* crate, not the reverse.
//!
//! [`StorageEntry`]: domo_domain::entry::StorageEntry

pub mod actions;
pub mod event_bus;
pub mod item;
pub mod module;
pub mod persist;
pub mod ports;
pub mod registry;
pub mod state;
