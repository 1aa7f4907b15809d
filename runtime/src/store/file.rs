//! File-backed durable store.

use super::{CHANGE_CHANNEL_CAPACITY, next_client_id};
use ballotbox_core::store::{ClientId, DurableStore, StoreChange, StoreError};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Store that keeps one file per key under a directory.
///
/// Keys are percent-encoded into file names (every character outside
/// `[A-Za-z0-9._~-]` is escaped) with `.json` appended, so distinct keys
/// never share a file and no key can escape the directory. Writes go to a temporary
/// file first and are renamed into place, so readers never observe a
/// half-written value.
///
/// Change notifications are only delivered between handles created with
/// [`FileStore::share`]; writes from other processes are not observed.
#[derive(Debug)]
pub struct FileStore {
    dir: Arc<PathBuf>,
    changes: broadcast::Sender<StoreChange>,
    client_id: ClientId,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        tracing::debug!(dir = %dir.display(), "Opened file store");

        Ok(Self {
            dir: Arc::new(dir),
            changes,
            client_id: next_client_id(),
        })
    }

    /// Create another handle onto the same directory with its own client id.
    #[must_use]
    pub fn share(&self) -> Self {
        Self {
            dir: Arc::clone(&self.dir),
            changes: self.changes.clone(),
            client_id: next_client_id(),
        }
    }

    /// Directory holding the stored files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }

    fn publish(&self, key: &str) {
        self.changes
            .send(StoreChange {
                key: key.to_string(),
                source: self.client_id,
            })
            .ok();
    }
}

impl DurableStore for FileStore {
    fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn load(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send {
        let path = self.path_for(key);
        async move {
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => Ok(Some(contents)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(StoreError::Io(e.to_string())),
            }
        }
    }

    fn save(&self, key: &str, value: String) -> impl Future<Output = Result<(), StoreError>> + Send {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let key = key.to_string();
        let changes = self.changes.clone();
        let source = self.client_id;

        async move {
            tokio::fs::write(&tmp, value)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
            tokio::fs::rename(&tmp, &path)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;

            changes.send(StoreChange { key, source }).ok();
            Ok(())
        }
    }

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send {
        let path = self.path_for(key);
        let key = key.to_string();
        let changes = self.changes.clone();
        let source = self.client_id;

        async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    changes.send(StoreChange { key, source }).ok();
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::Io(e.to_string())),
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

impl FileStore {
    /// Publish a change for `key` without writing (used after an external
    /// process is known to have modified the directory).
    pub fn notify_changed(&self, key: &str) {
        self.publish(key);
    }
}
