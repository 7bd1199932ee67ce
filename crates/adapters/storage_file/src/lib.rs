//! # domo-adapter-storage-file
//!
//! JSON file persistence adapter.
//!
//! ## Responsibilities
//! - Implement the [`EntryStore`](domo_runtime::ports::EntryStore) port
//!   defined in `domo-runtime`
//! - Keep the entry set in a single versioned JSON file, written atomically
//! - Quarantine unreadable files instead of losing them
//!
//! ## Dependency rule
//! Depends on `domo-runtime` (for the port trait) and `domo-domain` (for
//! domain types). The `runtime` and `domain` crates must never reference
//! this adapter.

pub mod error;
pub mod store;

pub use store::FileStore;
