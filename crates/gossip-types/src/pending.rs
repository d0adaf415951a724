//! Inbound items buffered until the crypto primitive can decrypt them.

use serde::{Deserialize, Serialize};

use crate::Seeker;

/// A fetched ciphertext the primitive rejected as out-of-order ratchet
/// material. Retried on later inbound passes, dropped on TTL expiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCiphertext {
    pub seeker: Seeker,
    pub ciphertext: Vec<u8>,
    /// Unix millis of the fetch; drives TTL expiry.
    pub fetched_at: u64,
}

/// An announcement whose sender is still unknown or whose ratchet step is
/// not yet reached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAnnouncement {
    /// Board counter the item was fetched at.
    pub counter: u64,
    pub data: Vec<u8>,
    /// Unix millis of the fetch; drives TTL expiry.
    pub fetched_at: u64,
}
