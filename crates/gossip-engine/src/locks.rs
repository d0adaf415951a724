//! Per-peer send locks.
//!
//! The outbound pipeline holds the pair's lock for the whole queue run, so
//! no two send attempts to the same peer ever interleave; queues for
//! different peers progress independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gossip_types::UserId;
use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
pub(crate) struct PeerLocks {
    locks: Mutex<HashMap<(UserId, UserId), Arc<tokio::sync::Mutex<()>>>>,
}

impl PeerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the pair's lock.
    pub async fn acquire(&self, owner: &UserId, peer: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry((*owner, *peer))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
