//! Shared engine state.
//!
//! Lock discipline: the per-peer send lock (when needed) is taken first,
//! then the session lock, then the store lock, each in its own scope.
//! Nothing holds the store lock while waiting on the session lock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gossip_session::SessionRatchet;
use gossip_transport::{Bulletin, TransportError};
use gossip_types::UserId;
use rusqlite::Connection;

use crate::config::EngineConfig;
use crate::events::EventBus;
use crate::locks::PeerLocks;
use crate::{EngineError, Result};

pub(crate) struct Core {
    pub config: EngineConfig,
    pub db: tokio::sync::Mutex<Connection>,
    pub session: tokio::sync::Mutex<Option<Box<dyn SessionRatchet>>>,
    pub bulletin: Arc<dyn Bulletin>,
    pub events: EventBus,
    pub locks: PeerLocks,
    pub owner: std::sync::Mutex<Option<UserId>>,
}

impl Core {
    /// The identity of the open session.
    pub fn owner(&self) -> Result<UserId> {
        self.owner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .ok_or(EngineError::SessionClosed)
    }

    /// Run a transport call under the configured timeout. A timeout is an
    /// error, never a silent drop.
    pub async fn with_transport_timeout<T, F>(
        &self,
        fut: F,
    ) -> std::result::Result<T, TransportError>
    where
        F: Future<Output = std::result::Result<T, TransportError>>,
    {
        let limit = Duration::from_millis(self.config.transport_timeout_ms);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}
