//! Entry store port — durable persistence for storage entries.

use std::future::Future;

use domo_domain::entry::StorageEntry;
use domo_domain::error::DomoError;

/// Durable store for the full set of [`StorageEntry`] records.
///
/// The registry always persists the whole set at once; partial updates are
/// the store's problem, not the caller's. Implementations must tolerate a
/// missing backing file on first start and return an empty set.
pub trait EntryStore {
    /// Load every persisted entry.
    fn load(&self) -> impl Future<Output = Result<Vec<StorageEntry>, DomoError>> + Send;

    /// Replace the persisted set with `entries`.
    fn save(
        &self,
        entries: Vec<StorageEntry>,
    ) -> impl Future<Output = Result<(), DomoError>> + Send;
}

impl<T: EntryStore + Send + Sync> EntryStore for std::sync::Arc<T> {
    fn load(&self) -> impl Future<Output = Result<Vec<StorageEntry>, DomoError>> + Send {
        (**self).load()
    }

    fn save(
        &self,
        entries: Vec<StorageEntry>,
    ) -> impl Future<Output = Result<(), DomoError>> + Send {
        (**self).save(entries)
    }
}
