//! User profile and contact entities.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// The local account. Exactly one per open session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserProfile {
    /// The 32-byte identity this device speaks as.
    pub user_id: UserId,
    /// Display name, carried in outgoing announcements.
    pub username: String,
    /// Encrypted mnemonic backup metadata, opaque to the engine.
    pub mnemonic_backup: Option<Vec<u8>>,
    /// Cursor into the announcement board: highest counter processed.
    pub last_bulletin_counter: Option<u64>,
    /// Unix millis of the last successful public-key republish.
    pub last_public_key_push: Option<u64>,
}

impl UserProfile {
    /// Fresh profile for a newly created account.
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            mnemonic_backup: None,
            last_bulletin_counter: None,
            last_public_key_push: None,
        }
    }
}

/// A peer we can converse with. Unique per `(owner, user_id)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contact {
    /// The local account that owns this row.
    pub owner: UserId,
    /// The peer's identity.
    pub user_id: UserId,
    /// Display name (decoded from their announcement, or user-assigned).
    pub name: String,
    /// Serialized peer public-key bundle, opaque to the engine.
    pub public_keys: Vec<u8>,
    /// Last observed presence.
    pub is_online: bool,
    /// Unix millis of the last observed activity.
    pub last_seen: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_starts_without_cursor() {
        let profile = UserProfile::new(UserId::from_bytes([1; 32]), "alice");
        assert_eq!(profile.last_bulletin_counter, None);
        assert_eq!(profile.username, "alice");
    }
}
