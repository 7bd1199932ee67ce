//! File-backed implementation of [`EntryStore`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use domo_domain::entry::StorageEntry;
use domo_domain::error::DomoError;
use domo_domain::time::{self, Timestamp};
use domo_runtime::ports::EntryStore;

use crate::error::StoreError;

/// Version written into the envelope. Bump when the on-disk shape changes
/// incompatibly.
const FORMAT_VERSION: u32 = 1;

/// On-disk shape: the entry set plus enough metadata to recognise files
/// written by a different format version.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    saved_at: Timestamp,
    entries: Vec<StorageEntry>,
}

/// Entry store keeping the whole entry set in one JSON file.
///
/// Saves are atomic: the new content goes to a sibling temp file, is
/// synced, then renamed over the target. A file that cannot be parsed is
/// moved aside to `<name>.corrupt-<unix seconds>` and treated as empty, so
/// a damaged store never blocks startup and is never overwritten silently.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store backed by `path`. Nothing is touched until the first
    /// load or save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Move the unreadable file aside so the next save starts fresh without
    /// destroying what was there.
    async fn quarantine(&self) -> Result<(), StoreError> {
        let target = self.sibling(&format!(".corrupt-{}", time::now().timestamp()));
        tracing::warn!(
            path = %self.path.display(),
            quarantined = %target.display(),
            "unreadable entry file, moving aside",
        );
        tokio::fs::rename(&self.path, &target).await?;
        Ok(())
    }
}

impl EntryStore for FileStore {
    async fn load(&self) -> Result<Vec<StorageEntry>, DomoError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no entry file yet");
                return Ok(Vec::new());
            }
            Err(err) => return Err(StoreError::from(err).into()),
        };

        match serde_json::from_slice::<Envelope>(&raw) {
            Ok(envelope) if envelope.version == FORMAT_VERSION => {
                tracing::debug!(
                    path = %self.path.display(),
                    entries = envelope.entries.len(),
                    "loaded entry file",
                );
                Ok(envelope.entries)
            }
            Ok(envelope) => {
                tracing::warn!(
                    path = %self.path.display(),
                    version = envelope.version,
                    "unsupported entry file version",
                );
                self.quarantine().await?;
                Ok(Vec::new())
            }
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "unparsable entry file");
                self.quarantine().await?;
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, entries: Vec<StorageEntry>) -> Result<(), DomoError> {
        let envelope = Envelope {
            version: FORMAT_VERSION,
            saved_at: time::now(),
            entries,
        };
        let raw = serde_json::to_vec_pretty(&envelope).map_err(StoreError::from)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(StoreError::from)?;
            }
        }

        let tmp = self.sibling(".tmp");
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(StoreError::from)?;
        file.write_all(&raw).await.map_err(StoreError::from)?;
        file.sync_all().await.map_err(StoreError::from)?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(StoreError::from)?;

        tracing::debug!(
            path = %self.path.display(),
            entries = envelope.entries.len(),
            "entry file written",
        );
        Ok(())
    }
}
