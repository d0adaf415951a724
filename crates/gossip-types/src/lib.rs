//! # gossip-types
//!
//! Shared domain types for the Gossip client engine: identifiers, the
//! contact/discussion/message entities, the on-wire payload codecs, and the
//! engine event types.

pub mod discussion;
pub mod events;
pub mod id;
pub mod identity;
pub mod message;
pub mod pending;
pub mod wire;

pub use discussion::{Discussion, DiscussionDirection, DiscussionStatus, PendingSend};
pub use events::{EngineEvent, EventKind};
pub use id::{IdError, MessageId, Seeker, UserId};
pub use identity::{Contact, UserProfile};
pub use message::{Message, MessageDirection, MessageKind, MessageStatus};
pub use pending::{PendingAnnouncement, PendingCiphertext};

/// Opaque byte payloads (ciphertexts, announcements, key bundles).
pub type Bytes = Vec<u8>;

/// Default deduplication window for legacy messages without an id, in
/// milliseconds.
pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 30_000;

/// Auto-generated contact name prefix for unsolicited discussion requests.
pub const NEW_REQUEST_NAME_PREFIX: &str = "New Request";
