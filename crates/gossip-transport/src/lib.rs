//! # gossip-transport
//!
//! The bulletin-service seam. The engine talks to an untrusted
//! store-and-forward service exposing two boards: an append-only,
//! counter-ordered announcement board, and a message board keyed by
//! opaque seekers. This crate fixes that interface as the [`Bulletin`]
//! trait and ships an in-memory implementation for tests.

pub mod memory;

use async_trait::async_trait;
use gossip_types::{Seeker, UserId};

/// Transport error types.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Network or service failure; the caller arms a retry.
    #[error("I/O error: {0}")]
    Io(String),

    /// The configured timeout elapsed. A timeout is an error, never a
    /// silent drop.
    #[error("operation timed out")]
    Timeout,

    /// Lookup addressed something the service does not hold. Distinct
    /// from generic failure so callers can surface it structurally.
    #[error("not found")]
    NotFound,

    /// The node URL is unusable.
    #[error("node error: {0}")]
    Node(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// One announcement-board entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardItem {
    /// Monotonic position on the board.
    pub counter: u64,
    pub data: Vec<u8>,
}

/// One message-board entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardMessage {
    pub seeker: Seeker,
    pub ciphertext: Vec<u8>,
}

/// The bulletin service.
///
/// Announcement pagination is oldest-first here; the engine stays correct
/// under any direction so long as counters are monotonic.
#[async_trait]
pub trait Bulletin: Send + Sync {
    /// Append to the announcement board; returns the assigned counter.
    async fn send_announcement(&self, data: &[u8]) -> Result<u64>;

    /// Fetch announcements past `cursor` (exclusive), oldest first, at
    /// most `limit` items.
    async fn fetch_announcements(&self, limit: usize, cursor: Option<u64>)
        -> Result<Vec<BoardItem>>;

    /// Publish a ciphertext under its seeker.
    async fn send_message(&self, message: BoardMessage) -> Result<()>;

    /// Fetch whatever the board holds at the given seekers.
    async fn fetch_messages(&self, seekers: &[Seeker]) -> Result<Vec<BoardMessage>>;

    /// Publish the caller's public-key bundle; returns the service's
    /// content hash for it.
    async fn post_public_key(&self, data: &[u8]) -> Result<String>;

    /// Look up a peer's public-key bundle.
    /// [`TransportError::NotFound`] when the service has none.
    async fn fetch_public_key(&self, user_id: &UserId) -> Result<Vec<u8>>;

    /// Point the client at a different service node.
    async fn change_node(&self, url: &str) -> Result<()>;
}
