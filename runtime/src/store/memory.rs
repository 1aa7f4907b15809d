//! In-memory durable store.

use super::{CHANGE_CHANNEL_CAPACITY, next_client_id};
use ballotbox_core::store::{ClientId, DurableStore, StoreChange, StoreError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

#[derive(Debug)]
struct Shared {
    data: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StoreChange>,
    available: AtomicBool,
}

/// In-memory store.
///
/// Data lives as long as any handle does. Useful as the default store for
/// non-browser execution and for tests that simulate several tabs.
///
/// # Example
///
/// ```rust
/// use ballotbox_core::store::DurableStore;
/// use ballotbox_runtime::store::MemoryStore;
///
/// # async fn example() -> Result<(), ballotbox_core::store::StoreError> {
/// let tab_a = MemoryStore::new();
/// let tab_b = tab_a.share();
///
/// tab_a.save("key", "value".to_string()).await?;
/// assert_eq!(tab_b.load("key").await?, Some("value".to_string()));
/// assert_ne!(tab_a.client_id(), tab_b.client_id());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    client_id: ClientId,
}

impl MemoryStore {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                data: Mutex::new(HashMap::new()),
                changes,
                available: AtomicBool::new(true),
            }),
            client_id: next_client_id(),
        }
    }

    /// Create another handle onto the same data with its own client id.
    #[must_use]
    pub fn share(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            client_id: next_client_id(),
        }
    }

    /// Toggle availability for every handle (simulates storage being
    /// disabled, e.g. private browsing with storage blocked).
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Copy of all stored entries (for testing and diagnostics).
    #[must_use]
    pub fn entries(&self) -> HashMap<String, String> {
        self.shared
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.shared.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }

    fn publish(&self, key: &str) {
        // No receivers is not an error.
        self.shared
            .changes
            .send(StoreChange {
                key: key.to_string(),
                source: self.client_id,
            })
            .ok();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableStore for MemoryStore {
    fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn load(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send {
        let result = self.check_available().map(|()| {
            self.shared
                .data
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(key)
                .cloned()
        });
        async move { result }
    }

    fn save(&self, key: &str, value: String) -> impl Future<Output = Result<(), StoreError>> + Send {
        let result = self.check_available().map(|()| {
            self.shared
                .data
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.to_string(), value);
            self.publish(key);
        });
        async move { result }
    }

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send {
        let result = self.check_available().map(|()| {
            let removed = self
                .shared
                .data
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(key);
            if removed.is_some() {
                self.publish(key);
            }
        });
        async move { result }
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.shared.changes.subscribe()
    }
}
