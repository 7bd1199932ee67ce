//! Debounced persistence of the entry set.
//!
//! Registry mutations never wait for the store. Each change schedules the
//! full entry snapshot into a watch channel; a background task absorbs
//! bursts, writes only the newest snapshot and swallows store failures
//! (the next scheduled change retries). Shutdown flushes whatever is still
//! pending.

use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use domo_domain::entry::StorageEntry;

use crate::ports::EntryStore;

/// How long the saver waits after a change before writing, letting bursts
/// coalesce into one write.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Handle to the background save task.
pub struct Saver {
    tx: watch::Sender<Vec<StorageEntry>>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Saver {
    /// Spawn the save task writing through `store`.
    #[must_use]
    pub fn spawn<S>(store: S, debounce: Duration) -> Self
    where
        S: EntryStore + Send + Sync + 'static,
    {
        let (tx, mut rx) = watch::channel(Vec::new());
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = task_cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        // Let the burst finish; a cancel mid-debounce still
                        // writes the pending snapshot below.
                        tokio::select! {
                            () = task_cancel.cancelled() => {}
                            () = tokio::time::sleep(debounce) => {}
                        }
                        let snapshot = rx.borrow_and_update().clone();
                        let count = snapshot.len();
                        if let Err(error) = store.save(snapshot).await {
                            tracing::warn!(%error, "entry save failed, retrying on next change");
                        } else {
                            tracing::debug!(entries = count, "entry set persisted");
                        }
                    }
                }
            }
            if rx.has_changed().unwrap_or(false) {
                let snapshot = rx.borrow_and_update().clone();
                if let Err(error) = store.save(snapshot).await {
                    tracing::error!(%error, "final entry save failed");
                }
            }
        });
        Self {
            tx,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Replace the pending snapshot; the newest one wins.
    pub fn schedule(&self, entries: Vec<StorageEntry>) {
        self.tx.send_replace(entries);
    }

    /// Flush the pending snapshot (if any) and stop the task. Safe to call
    /// more than once.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(error) = handle.await {
                tracing::warn!(%error, "saver task ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for Saver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saver").finish_non_exhaustive()
    }
}
