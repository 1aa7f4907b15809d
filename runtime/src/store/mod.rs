//! Durable store implementations.
//!
//! - [`MemoryStore`]: in-process map; handles created with
//!   [`MemoryStore::share`] see the same data, like tabs of one browser
//! - [`FileStore`]: one JSON document per key under a directory
//!
//! Both publish a `StoreChange` on every write so that consumers can react
//! to changes made through other handles.

use ballotbox_core::store::ClientId;
use std::sync::atomic::{AtomicU64, Ordering};

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Capacity of each store's change channel. Lagging subscribers miss
/// intermediate changes, which is acceptable: a change only means "re-read".
const CHANGE_CHANNEL_CAPACITY: usize = 64;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique client id.
fn next_client_id() -> ClientId {
    NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)
}
