use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per signature request.
///
/// Webhooks, cancellation and reminders for the same request are serialized; different
/// requests proceed in parallel.
#[derive(Debug, Default)]
pub(crate) struct RequestLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl RequestLocks {
    pub(crate) async fn acquire(&self, request_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if locks.len() > PRUNE_THRESHOLD {
                // Entries held only by the map are idle.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(request_id).or_default())
        };
        lock.lock_owned().await
    }
}
