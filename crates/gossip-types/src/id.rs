//! Identifier newtypes: user ids, board seekers, on-wire message ids.

use std::fmt;
use std::str::FromStr;

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32m, Hrp};
use serde::{Deserialize, Serialize};

/// Human-readable prefix of the textual user-id encoding.
pub const USER_ID_HRP: &str = "gossip";

const HRP: Hrp = Hrp::parse_unchecked(USER_ID_HRP);

/// Errors from parsing identifier encodings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Malformed bech32m string or bad checksum.
    #[error("invalid encoding: {0}")]
    Encoding(String),

    /// Valid bech32m but the wrong human-readable prefix.
    #[error("unexpected prefix {found:?}, expected {USER_ID_HRP:?}")]
    Hrp {
        /// The prefix actually found.
        found: String,
    },

    /// Decoded payload is not 32 bytes.
    #[error("unexpected payload length {0}, expected 32")]
    Length(usize),

    /// Upper-case characters are rejected even when the checksum passes.
    #[error("user ids are lowercase only")]
    Case,
}

/// 32-byte opaque user identity.
///
/// Rendered for humans as a checksummed bech32m string with the `gossip`
/// prefix, lowercase only.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub [u8; 32]);

impl UserId {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 32-byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IdError::Length(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Render the checksummed textual form.
    pub fn encode(&self) -> String {
        bech32::encode::<Bech32m>(HRP, &self.0).unwrap_or_else(|_| hex::encode(self.0))
    }

    /// Parse the textual form, rejecting a wrong prefix, a bad checksum,
    /// a wrong payload length, and any non-lowercase input.
    pub fn decode(s: &str) -> Result<Self, IdError> {
        if s.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(IdError::Case);
        }
        let checked = CheckedHrpstring::new::<Bech32m>(s)
            .map_err(|e| IdError::Encoding(e.to_string()))?;
        if checked.hrp() != HRP {
            return Err(IdError::Hrp {
                found: checked.hrp().to_string(),
            });
        }
        let bytes: Vec<u8> = checked.byte_iter().collect();
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", &hex::encode(self.0)[..8])
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// 32-byte opaque key under which a ciphertext lives on the message board.
///
/// Derived by the crypto primitive; the engine treats it as a map key and
/// an acknowledgement token, nothing more.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seeker(pub [u8; 32]);

impl Seeker {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 32-byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IdError::Length(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Seeker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0)[..12])
    }
}

impl fmt::Debug for Seeker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seeker({})", &hex::encode(self.0)[..12])
    }
}

/// 12 random bytes attached to every outgoing message for on-wire dedup.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub [u8; 12]);

impl MessageId {
    /// Draw a fresh random id.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Parse a 12-byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let arr: [u8; 12] = bytes
            .try_into()
            .map_err(|_| IdError::Length(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_roundtrip() {
        let id = UserId::from_bytes([7u8; 32]);
        let text = id.encode();
        assert!(text.starts_with("gossip1"));
        assert_eq!(UserId::decode(&text).expect("decode"), id);
    }

    #[test]
    fn test_user_id_rejects_wrong_hrp() {
        let other = bech32::encode::<Bech32m>(Hrp::parse_unchecked("rumor"), &[7u8; 32])
            .expect("encode");
        assert!(matches!(
            UserId::decode(&other),
            Err(IdError::Hrp { found }) if found == "rumor"
        ));
    }

    #[test]
    fn test_user_id_rejects_bad_checksum() {
        let mut text = UserId::from_bytes([7u8; 32]).encode();
        // Flip the final checksum character.
        let last = text.pop().expect("nonempty");
        text.push(if last == 'q' { 'p' } else { 'q' });
        assert!(matches!(UserId::decode(&text), Err(IdError::Encoding(_))));
    }

    #[test]
    fn test_user_id_rejects_upper_case() {
        let text = UserId::from_bytes([7u8; 32]).encode().to_uppercase();
        assert_eq!(UserId::decode(&text), Err(IdError::Case));
    }

    #[test]
    fn test_user_id_rejects_wrong_length() {
        let short = bech32::encode::<Bech32m>(HRP, &[7u8; 16]).expect("encode");
        assert_eq!(UserId::decode(&short), Err(IdError::Length(16)));
    }

    #[test]
    fn test_message_id_random_distinct() {
        assert_ne!(MessageId::random(), MessageId::random());
    }

    #[test]
    fn test_seeker_display_is_short() {
        let seeker = Seeker::from_bytes([0xAB; 32]);
        assert_eq!(seeker.to_string().len(), 12);
    }
}
