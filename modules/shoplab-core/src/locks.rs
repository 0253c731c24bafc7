use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use shoplab_common::ListingId;

/// Per-listing async locks. The guardrail-check-then-commit sequence inside
/// a lifecycle operation is not atomic on its own, so every operation
/// touching a listing must hold that listing's lock for its full duration.
#[derive(Default)]
pub struct ListingLocks {
    locks: Mutex<HashMap<ListingId, Arc<AsyncMutex<()>>>>,
}

impl ListingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one listing, creating it on first use.
    pub async fn acquire(&self, listing_id: ListingId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("listing lock table poisoned");
            locks.entry(listing_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
