//! Discussion entity and its derived status.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Who posted the first announcement of the pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscussionDirection {
    /// The local user reached out first.
    Initiated,
    /// The peer reached out first.
    Received,
}

impl DiscussionDirection {
    /// Stable text form used by the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Received => "received",
        }
    }

    /// Parse the stable text form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initiated" => Some(Self::Initiated),
            "received" => Some(Self::Received),
            _ => None,
        }
    }
}

/// An announcement that still has to be published, with its retry gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSend {
    /// The announcement bytes produced by the crypto primitive.
    pub data: Vec<u8>,
    /// Unix millis before which no publish attempt is made.
    pub when_to_send: u64,
}

/// One conversation with one peer. Unique per `(owner, contact)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Discussion {
    /// The local account that owns this row.
    pub owner: UserId,
    /// The peer.
    pub contact: UserId,
    /// Who announced first.
    pub direction: DiscussionDirection,
    /// The local user has expressed intent to converse.
    pub we_accepted: bool,
    /// The pair reached ACTIVE at least once; drives the
    /// reconnecting-vs-pending distinction after a session loss.
    pub was_active: bool,
    /// Announcement awaiting (re)publication, if any. `None` means no
    /// retry is pending.
    pub send_announcement: Option<PendingSend>,
    /// Unix millis of the last completed inbound sync.
    pub last_sync_at: Option<u64>,
    /// Row id of the most recent visible message.
    pub last_message_id: Option<i64>,
    /// Preview of the most recent visible message.
    pub last_message_content: Option<String>,
    /// Unix millis of the most recent visible message.
    pub last_message_at: Option<u64>,
    /// Incoming messages not yet read. Never negative.
    pub unread_count: u32,
    /// UI override for the contact name.
    pub custom_name: Option<String>,
    /// Most recent free-text blurb carried by an incoming announcement.
    pub last_announcement_message: Option<String>,
    /// Unix millis of row creation.
    pub created_at: u64,
}

/// Derived discussion status; computed from the ratchet status, the
/// persisted `was_active` flag, and the announcement retry state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscussionStatus {
    /// Handshake not complete yet.
    Pending,
    /// Both sides hold a live session.
    Active,
    /// The session is gone and needs an explicit renewal.
    Broken,
    /// An announcement publish failed and is armed for retry.
    SendFailed,
    /// Re-establishing a session that was active before.
    Reconnecting,
}
