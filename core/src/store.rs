//! Durable client-side key/value storage.
//!
//! The auth subsystem persists two kinds of data between reloads: the
//! attempt history used for throttle warnings, and (owned by the identity
//! collaborator) the serialized session. Both go through [`DurableStore`].
//!
//! # Change Notifications
//!
//! Several store handles may share the same underlying data (several tabs
//! of one application, several processes over one directory). Every write
//! publishes a [`StoreChange`] tagged with the writer's
//! [`DurableStore::client_id`], so a subscriber can tell its own writes from
//! external ones:
//!
//! ```text
//! handle A ──save("k")──▶ shared data ──StoreChange { key: "k", source: A }──▶ subscribers
//!                                                                  │
//!                                  handle A skips its own change; handle B receives it
//! ```
//!
//! # Failure Policy
//!
//! Stores report failures through [`StoreError`]; consumers in the auth
//! crate treat every such failure as "degrade silently", never as a
//! user-visible error.

use std::future::Future;
use thiserror::Error;
use tokio::sync::broadcast;

/// Identifies one handle onto a (possibly shared) store.
pub type ClientId = u64;

/// Errors from durable store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No durable storage is available in this execution context.
    #[error("Durable storage unavailable")]
    Unavailable,

    /// Underlying I/O failed.
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// Stored value could not be (de)serialized.
    #[error("Storage serialization error: {0}")]
    Serialization(String),
}

/// Notification that a key was written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    /// Key that changed.
    pub key: String,
    /// Handle that performed the write.
    pub source: ClientId,
}

impl StoreChange {
    /// Returns `true` if this change was made by a handle other than `me`.
    #[must_use]
    pub fn is_external_to(&self, me: ClientId) -> bool {
        self.source != me
    }
}

/// Durable key/value store.
///
/// Values are opaque strings; callers choose the encoding (the auth crate
/// uses JSON). Writes are last-write-wins with no locking: concurrent
/// read-modify-write cycles from different handles may lose updates.
pub trait DurableStore: Send + Sync {
    /// Identifier of this handle, stamped onto every change it publishes.
    fn client_id(&self) -> ClientId;

    /// Load the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage is unavailable or unreadable.
    fn load(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage is unavailable or the write fails.
    fn save(&self, key: &str, value: String) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage is unavailable or the delete fails.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Subscribe to changes made through any handle sharing this store.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}
