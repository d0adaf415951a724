//! Message entity and its status machine vocabulary.

use serde::{Deserialize, Serialize};

use crate::{MessageId, Seeker, UserId};

/// Payload kind carried on the wire and in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Announcement,
    /// Empty-content message whose sole purpose is to carry a ratchet
    /// step back to a peer waiting on our acknowledgement. Never shown.
    KeepAlive,
    Image,
    File,
    Audio,
    Video,
}

impl MessageKind {
    /// Stable text form used by the store and the wire codec.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Announcement => "announcement",
            Self::KeepAlive => "keep_alive",
            Self::Image => "image",
            Self::File => "file",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Parse the stable text form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "announcement" => Some(Self::Announcement),
            "keep_alive" => Some(Self::KeepAlive),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Message direction relative to the owning account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Incoming,
    Outgoing,
}

impl MessageDirection {
    /// Stable text form used by the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }

    /// Parse the stable text form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incoming" => Some(Self::Incoming),
            "outgoing" => Some(Self::Outgoing),
            _ => None,
        }
    }
}

/// Outgoing status machine. Incoming messages only ever hold
/// [`Delivered`](Self::Delivered) or [`Read`](Self::Read).
///
/// WaitingSession → Ready → Sent → Delivered → Read, with a reset back to
/// WaitingSession on session renewal and a retry loop at Ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Enqueued; no ciphertext materialised yet.
    WaitingSession,
    /// Encrypted and persisted; awaiting (or retrying) the network send.
    Ready,
    /// The bulletin accepted the payload; ciphertext dropped, seeker kept.
    Sent,
    /// The peer consumed the seeker (or a keep-alive acknowledged it).
    Delivered,
    /// Terminal for both directions.
    Read,
}

impl MessageStatus {
    /// Stable text form used by the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingSession => "waiting_session",
            Self::Ready => "ready",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }

    /// Parse the stable text form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting_session" => Some(Self::WaitingSession),
            "ready" => Some(Self::Ready),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            _ => None,
        }
    }
}

/// One message row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned row id.
    pub id: i64,
    /// The local account that owns this row.
    pub owner: UserId,
    /// The peer.
    pub contact: UserId,
    /// Plaintext content. Empty for keep-alives.
    pub content: String,
    /// On-wire dedup token.
    pub message_id: MessageId,
    pub kind: MessageKind,
    pub direction: MessageDirection,
    pub status: MessageStatus,
    /// Board key; present from encryption until the peer's acknowledgement
    /// consumes it, and on every received message.
    pub seeker: Option<Seeker>,
    /// Ciphertext held only between encryption and the confirmed send.
    pub ciphertext: Option<Vec<u8>>,
    /// Unix millis before which no send attempt is made.
    pub when_to_send: Option<u64>,
    /// On-wire id of the message this one replies to.
    pub reply_to: Option<MessageId>,
    /// On-wire id of the message this one forwards.
    pub forward_of: Option<MessageId>,
    /// Cached wire payload; cleared once the network send completes.
    pub serialized: Option<Vec<u8>>,
    /// Unix millis of row creation; the FIFO sort key.
    pub created_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_roundtrip() {
        for s in [
            MessageStatus::WaitingSession,
            MessageStatus::Ready,
            MessageStatus::Sent,
            MessageStatus::Delivered,
            MessageStatus::Read,
        ] {
            assert_eq!(MessageStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(MessageStatus::parse("sending"), None);
    }

    #[test]
    fn test_kind_text_roundtrip() {
        for k in [
            MessageKind::Text,
            MessageKind::Announcement,
            MessageKind::KeepAlive,
            MessageKind::Image,
            MessageKind::File,
            MessageKind::Audio,
            MessageKind::Video,
        ] {
            assert_eq!(MessageKind::parse(k.as_str()), Some(k));
        }
    }
}
