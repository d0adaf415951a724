//! Engine event types.
//!
//! A fixed set of event kinds, each with a declared payload shape.
//! Handlers register by kind and run synchronously after the persistent
//! write that produced the event.

use serde::{Deserialize, Serialize};

use crate::{Discussion, Message, UserId};

/// Fieldless discriminant used for handler registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageReceived,
    DiscussionRequest,
    DiscussionAccepted,
    SessionRenewalNeeded,
    Error,
}

/// An event emitted by the engine. Serializes with snake_case variant
/// keys, for embedders that forward events over an RPC boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEvent {
    /// A visible incoming message was stored.
    MessageReceived {
        contact: UserId,
        message: Message,
    },
    /// A previously unknown peer (or an unaccepted known one) asked to
    /// converse.
    DiscussionRequest {
        contact: UserId,
        discussion: Discussion,
    },
    /// A peer accepted our request, or we auto-accepted a session
    /// recovery; queued messages are flowing again.
    DiscussionAccepted {
        contact: UserId,
    },
    /// The session to this peer is gone; an explicit renewal is required.
    SessionRenewalNeeded {
        contact: UserId,
    },
    /// An internal invariant was violated or an operation failed after
    /// its state was already safe.
    Error {
        detail: String,
    },
}

impl EngineEvent {
    /// The kind handlers register under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageReceived { .. } => EventKind::MessageReceived,
            Self::DiscussionRequest { .. } => EventKind::DiscussionRequest,
            Self::DiscussionAccepted { .. } => EventKind::DiscussionAccepted,
            Self::SessionRenewalNeeded { .. } => EventKind::SessionRenewalNeeded,
            Self::Error { .. } => EventKind::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let event = EngineEvent::SessionRenewalNeeded {
            contact: UserId::from_bytes([9; 32]),
        };
        assert_eq!(event.kind(), EventKind::SessionRenewalNeeded);

        let event = EngineEvent::Error {
            detail: "boom".to_string(),
        };
        assert_eq!(event.kind(), EventKind::Error);
    }
}
