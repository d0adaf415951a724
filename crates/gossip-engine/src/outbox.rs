//! Outbound pipeline: per-peer FIFO queue, encryption materialisation,
//! retry timing.
//!
//! Ordering argument: the pair's lock is held for the whole queue run, so
//! sends to one peer never interleave; and a message whose retry gate has
//! not passed stops the run, so a failed send can never be overtaken by
//! its successor.

use gossip_session::{PeerSessionStatus, SessionError};
use gossip_store::queries::{contacts, messages};
use gossip_transport::BoardMessage;
use gossip_types::wire::{self, WireMessage};
use gossip_types::{Message, MessageDirection, MessageId, MessageKind, MessageStatus, UserId};

use crate::core::Core;
use crate::{now_millis, EngineError, Result};

/// Insert an outgoing message as WaitingSession and run the peer's queue.
/// Returns the store row id.
pub(crate) async fn enqueue(
    core: &Core,
    contact: &UserId,
    kind: MessageKind,
    content: &str,
    reply_to: Option<MessageId>,
    forward_of: Option<MessageId>,
) -> Result<i64> {
    let owner = core.owner()?;
    {
        let db = core.db.lock().await;
        if contacts::get(&db, &owner, contact)?.is_none() {
            return Err(EngineError::Validation {
                reason: format!("no contact {contact}"),
            });
        }
    }

    let envelope = WireMessage {
        message_id: Some(MessageId::random()),
        kind,
        content: content.to_string(),
        reply_to,
        forward_of,
    };
    let serialized = wire::encode_message(&envelope)?;
    let message = Message {
        id: 0,
        owner,
        contact: *contact,
        content: content.to_string(),
        message_id: envelope.message_id.unwrap_or_else(MessageId::random),
        kind,
        direction: MessageDirection::Outgoing,
        status: MessageStatus::WaitingSession,
        seeker: None,
        ciphertext: None,
        when_to_send: None,
        reply_to,
        forward_of,
        serialized: Some(serialized),
        created_at: now_millis(),
    };

    let id = {
        let db = core.db.lock().await;
        messages::add(&db, &message)?
    };
    tracing::debug!(contact = %contact, kind = kind.as_str(), id, "message enqueued");

    process_send_queue_for_contact(core, contact).await?;
    Ok(id)
}

/// Drain one peer's queue as far as the session, the retry gates, and the
/// transport allow. Returns the number of messages that reached SENT.
pub(crate) async fn process_send_queue_for_contact(core: &Core, contact: &UserId) -> Result<usize> {
    let owner = core.owner()?;

    // Only an Active session can carry traffic.
    {
        let session = core.session.lock().await;
        let ratchet = session.as_ref().ok_or(EngineError::SessionClosed)?;
        if ratchet.peer_status(contact) != PeerSessionStatus::Active {
            return Ok(0);
        }
    }

    // One in-flight send pipeline per pair.
    let _guard = core.locks.acquire(&owner, contact).await;

    let queue = {
        let db = core.db.lock().await;
        messages::send_queue(&db, &owner, contact)?
    };

    let mut sent = 0usize;
    for mut message in queue {
        if message.status == MessageStatus::WaitingSession {
            // Re-serialize from plaintext when the cached payload was
            // cleared (renewal, crash recovery).
            let payload = match &message.serialized {
                Some(bytes) => bytes.clone(),
                None => wire::encode_message(&WireMessage {
                    message_id: Some(message.message_id),
                    kind: message.kind,
                    content: message.content.clone(),
                    reply_to: message.reply_to,
                    forward_of: message.forward_of,
                })?,
            };

            let output = {
                let mut session = core.session.lock().await;
                let ratchet = session.as_mut().ok_or(EngineError::SessionClosed)?;
                if ratchet.peer_status(contact) != PeerSessionStatus::Active {
                    return Ok(sent);
                }
                // The ratchet advance is persisted through the hook
                // before this call returns.
                match ratchet.send_message(contact, &payload) {
                    Ok(output) => output,
                    Err(SessionError::InvalidState(reason)) => {
                        tracing::debug!(contact = %contact, reason, "send queue paused");
                        return Ok(sent);
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            let now = now_millis();
            {
                let db = core.db.lock().await;
                messages::set_ready(&db, message.id, &output.seeker, &output.ciphertext, now)?;
            }
            message.status = MessageStatus::Ready;
            message.seeker = Some(output.seeker);
            message.ciphertext = Some(output.ciphertext);
            message.when_to_send = Some(now);
        }

        // A gated message stops the run; anything behind it would
        // otherwise overtake it.
        if message.when_to_send.unwrap_or(0) > now_millis() {
            return Ok(sent);
        }

        let (Some(seeker), Some(ciphertext)) = (message.seeker, message.ciphertext.clone())
        else {
            return Err(EngineError::InvariantViolation(format!(
                "ready message {} lacks seeker or ciphertext",
                message.id
            )));
        };

        let attempt = core
            .with_transport_timeout(core.bulletin.send_message(BoardMessage {
                seeker,
                ciphertext,
            }))
            .await;
        match attempt {
            Ok(()) => {
                let db = core.db.lock().await;
                messages::set_sent(&db, message.id)?;
                sent += 1;
                tracing::debug!(contact = %contact, id = message.id, %seeker, "message sent");
            }
            Err(e) => {
                let retry_at = now_millis() + core.config.retry_delay_ms;
                {
                    let db = core.db.lock().await;
                    messages::bump_retry(&db, message.id, retry_at)?;
                }
                tracing::warn!(
                    contact = %contact,
                    id = message.id,
                    "send failed ({e}); retry armed"
                );
                return Ok(sent);
            }
        }
    }
    Ok(sent)
}

/// Run every queue that has traffic.
pub(crate) async fn process_all(core: &Core) -> Result<usize> {
    let owner = core.owner()?;
    let peers = {
        let db = core.db.lock().await;
        messages::peers_with_unsent(&db, &owner)?
    };
    let mut total = 0;
    for peer in peers {
        total += process_send_queue_for_contact(core, &peer).await?;
    }
    Ok(total)
}
