//! On-wire payload codecs.
//!
//! Two formats live here: the CBOR envelope every encrypted message body
//! uses, and the length-prefixed free-text payload carried inside an
//! announcement's user-data field.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{MessageId, MessageKind};

/// Wire codec errors.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("truncated payload")]
    Truncated,

    #[error("invalid UTF-8 in payload")]
    Utf8,
}

/// The plaintext envelope of every message on the board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Random dedup token; the receiver discards repeats. Absent only in
    /// payloads from peers predating the token, which fall back to
    /// content-window dedup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    pub kind: MessageKind,
    /// Empty for keep-alives.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_of: Option<MessageId>,
}

impl WireMessage {
    /// A keep-alive envelope: empty content, fresh id.
    pub fn keep_alive() -> Self {
        Self {
            message_id: Some(MessageId::random()),
            kind: MessageKind::KeepAlive,
            content: String::new(),
            reply_to: None,
            forward_of: None,
        }
    }
}

/// Serialize a value to CBOR bytes.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| WireError::Serialization(format!("CBOR serialization failed: {e}")))?;
    Ok(buf)
}

/// Deserialize a value from CBOR bytes.
pub fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, WireError> {
    ciborium::from_reader(data)
        .map_err(|e| WireError::Deserialization(format!("CBOR deserialization failed: {e}")))
}

/// Encode a message envelope.
pub fn encode_message(msg: &WireMessage) -> Result<Vec<u8>, WireError> {
    to_vec(msg)
}

/// Decode a message envelope.
pub fn decode_message(data: &[u8]) -> Result<WireMessage, WireError> {
    from_slice(data)
}

/// Optional `{username, message}` free text carried inside an
/// announcement's user-data field.
///
/// Layout: two fields, each a `u16` little-endian byte length followed by
/// that many UTF-8 bytes. An absent field encodes as length 0.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnnouncementUserData {
    pub username: Option<String>,
    pub message: Option<String>,
}

impl AnnouncementUserData {
    pub fn new(username: Option<String>, message: Option<String>) -> Self {
        Self { username, message }
    }

    /// Encode to the length-prefixed layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for field in [&self.username, &self.message] {
            let bytes = field.as_deref().unwrap_or_default().as_bytes();
            let len = bytes.len().min(u16::MAX as usize);
            out.extend_from_slice(&(len as u16).to_le_bytes());
            out.extend_from_slice(&bytes[..len]);
        }
        out
    }

    /// Decode from the length-prefixed layout. An empty input decodes to
    /// the all-absent value.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.is_empty() {
            return Ok(Self::default());
        }
        let mut offset = 0usize;
        let mut fields: [Option<String>; 2] = [None, None];
        for slot in &mut fields {
            let end = offset.checked_add(2).ok_or(WireError::Truncated)?;
            let prefix: [u8; 2] = data
                .get(offset..end)
                .and_then(|s| s.try_into().ok())
                .ok_or(WireError::Truncated)?;
            let len = u16::from_le_bytes(prefix) as usize;
            offset = end;
            let body_end = offset.checked_add(len).ok_or(WireError::Truncated)?;
            let body = data.get(offset..body_end).ok_or(WireError::Truncated)?;
            offset = body_end;
            if len > 0 {
                let text = std::str::from_utf8(body).map_err(|_| WireError::Utf8)?;
                *slot = Some(text.to_string());
            }
        }
        let [username, message] = fields;
        Ok(Self { username, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_roundtrip_text() {
        let msg = WireMessage {
            message_id: Some(MessageId::from_bytes([1; 12])),
            kind: MessageKind::Text,
            content: "hello there".to_string(),
            reply_to: None,
            forward_of: None,
        };
        let bytes = encode_message(&msg).expect("encode");
        assert_eq!(decode_message(&bytes).expect("decode"), msg);
    }

    #[test]
    fn test_message_roundtrip_reply_and_forward() {
        let msg = WireMessage {
            message_id: Some(MessageId::from_bytes([2; 12])),
            kind: MessageKind::Text,
            content: "re: hi".to_string(),
            reply_to: Some(MessageId::from_bytes([3; 12])),
            forward_of: Some(MessageId::from_bytes([4; 12])),
        };
        let bytes = encode_message(&msg).expect("encode");
        assert_eq!(decode_message(&bytes).expect("decode"), msg);
    }

    #[test]
    fn test_message_without_id_decodes() {
        let msg = WireMessage {
            message_id: None,
            kind: MessageKind::Text,
            content: "legacy".to_string(),
            reply_to: None,
            forward_of: None,
        };
        let bytes = encode_message(&msg).expect("encode");
        assert_eq!(decode_message(&bytes).expect("decode"), msg);
    }

    #[test]
    fn test_keep_alive_is_empty() {
        let ka = WireMessage::keep_alive();
        assert_eq!(ka.kind, MessageKind::KeepAlive);
        assert!(ka.content.is_empty());
        let bytes = encode_message(&ka).expect("encode");
        assert_eq!(decode_message(&bytes).expect("decode"), ka);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_message(&[0xFF, 0xFF, 0xFF]).is_err());
    }

    #[test]
    fn test_user_data_roundtrip() {
        let data = AnnouncementUserData::new(
            Some("alice".to_string()),
            Some("hi, it's me".to_string()),
        );
        let bytes = data.encode();
        assert_eq!(AnnouncementUserData::decode(&bytes).expect("decode"), data);
    }

    #[test]
    fn test_user_data_absent_fields() {
        let data = AnnouncementUserData::default();
        let bytes = data.encode();
        assert_eq!(bytes, vec![0, 0, 0, 0]);
        assert_eq!(AnnouncementUserData::decode(&bytes).expect("decode"), data);
        assert_eq!(
            AnnouncementUserData::decode(&[]).expect("decode empty"),
            data
        );
    }

    #[test]
    fn test_user_data_truncated() {
        let data = AnnouncementUserData::new(Some("alice".to_string()), None);
        let bytes = data.encode();
        assert!(matches!(
            AnnouncementUserData::decode(&bytes[..bytes.len() - 1]),
            Err(WireError::Truncated)
        ));
    }

    #[test]
    fn test_user_data_invalid_utf8() {
        let bytes = vec![2, 0, 0xFF, 0xFE, 0, 0];
        assert!(matches!(
            AnnouncementUserData::decode(&bytes),
            Err(WireError::Utf8)
        ));
    }
}
