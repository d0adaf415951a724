//! # gossip-session
//!
//! The seam between the engine and the cryptographic session primitive.
//!
//! The engine never looks inside announcements, seekers, or ciphertexts;
//! it drives an implementation of [`SessionRatchet`] and persists whatever
//! the implementation hands to its persistence hook. The [`stub`] module
//! provides a deterministic, network-free implementation used by tests.

pub mod stub;

use std::collections::HashSet;

use gossip_types::{Seeker, UserId};

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Not addressed to us, or ratchet material we have not reached yet.
    /// The caller buffers the item and retries later.
    #[error("undecryptable")]
    Undecryptable,

    /// No state for this peer.
    #[error("unknown peer")]
    UnknownPeer,

    /// The operation is not legal in the peer's current session state.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// Malformed artifact.
    #[error("codec error: {0}")]
    Codec(String),

    /// The persistence hook failed; the advancing call is aborted.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Per-peer session status as reported by the primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerSessionStatus {
    /// This peer has no session with us.
    NoSession,
    /// We have requested a session and are waiting for their response.
    SelfRequested,
    /// The peer has requested a session and is waiting for our response.
    PeerRequested,
    /// Live session, ready for messaging.
    Active,
    /// The session was terminated due to an inconsistency.
    Killed,
    /// Live session, but too much unacknowledged lag to send.
    Saturated,
    /// This peer is not known to the primitive at all.
    UnknownPeer,
}

/// Result of encrypting one outbound payload.
#[derive(Clone, Debug)]
pub struct SendOutput {
    /// Board key the ciphertext must be published under.
    pub seeker: Seeker,
    pub ciphertext: Vec<u8>,
}

/// Result of decoding an inbound announcement.
#[derive(Clone, Debug)]
pub struct AnnouncementDecode {
    /// The announcing peer.
    pub peer: UserId,
    /// The peer's serialized public-key bundle.
    pub public_keys: Vec<u8>,
    /// Free-form user data embedded in the announcement (may be empty).
    pub user_data: Vec<u8>,
}

/// Result of decrypting one inbound board read.
#[derive(Clone, Debug)]
pub struct ReadDecode {
    /// The sending peer, resolved from the consumed seeker.
    pub peer: UserId,
    pub plaintext: Vec<u8>,
}

/// Synchronous persistence hook. Implementations call it with the
/// encrypted state blob during every state-advancing operation, before
/// returning; a hook error aborts the operation.
pub type PersistHook = Box<dyn FnMut(&[u8]) -> anyhow::Result<()> + Send>;

/// The cryptographic session primitive.
///
/// Every method that advances internal ratchet state (`establish_*`,
/// `feed_*`, `send_message`, `refresh`) must run the configured
/// persistence hook to completion before returning its artifact; callers
/// rely on this to guarantee that no network send ever consumes a ratchet
/// advance that is not yet durable.
pub trait SessionRatchet: Send {
    /// Build an announcement that initiates (or renews) a session with the
    /// peer owning `peer_public_keys`, embedding `user_data`.
    fn establish_outgoing_session(
        &mut self,
        peer_public_keys: &[u8],
        user_data: &[u8],
    ) -> Result<Vec<u8>>;

    /// Consume an announcement fetched from the board.
    fn feed_incoming_announcement(&mut self, data: &[u8]) -> Result<AnnouncementDecode>;

    /// Encrypt one payload to an active peer.
    fn send_message(&mut self, peer: &UserId, plaintext: &[u8]) -> Result<SendOutput>;

    /// Decrypt one board read. [`SessionError::Undecryptable`] means the
    /// item should be buffered and retried.
    fn feed_incoming_read(&mut self, seeker: &Seeker, ciphertext: &[u8]) -> Result<ReadDecode>;

    /// Advance internal state; returns the peers to whom the local ratchet
    /// must send something for the exchange to make progress.
    fn refresh(&mut self) -> Result<HashSet<UserId>>;

    /// The peer's current session status.
    fn peer_status(&self, peer: &UserId) -> PeerSessionStatus;

    /// Forget the peer entirely.
    fn peer_discard(&mut self, peer: &UserId);

    /// The seekers the primitive currently instructs us to monitor.
    fn read_seekers(&self) -> HashSet<Seeker>;

    /// Serialize the full state, encrypted under `key`.
    fn to_encrypted_blob(&self, key: &[u8; 32]) -> Result<Vec<u8>>;

    /// Install (or replace) the persistence key and hook. May arrive after
    /// the session is already open; until then advancing calls skip
    /// persistence.
    fn configure_persistence(&mut self, key: [u8; 32], hook: PersistHook);

    /// Drop expired internal material.
    fn cleanup(&mut self);
}
