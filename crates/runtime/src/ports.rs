//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the runtime core and the outside world.
//! They are defined here so that both the registry and the adapter crates
//! can depend on them without creating circular dependencies.

pub mod entry_store;

pub use entry_store::EntryStore;
