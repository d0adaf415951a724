//! Inbound pipeline: seeker snapshot, fetch, decrypt, dedup,
//! acknowledgement resolution.
//!
//! Seeker-set membership is the sole ACK signal: once the primitive has
//! seen a peer consume a ratchet step, the corresponding seeker leaves the
//! set and the matching SENT row becomes DELIVERED.

use std::collections::{HashMap, HashSet};

use gossip_session::SessionError;
use gossip_store::queries::{contacts, discussions, messages, pending, seekers};
use gossip_types::wire;
use gossip_types::{
    EngineEvent, Message, MessageDirection, MessageId, MessageKind, MessageStatus, Seeker, UserId,
};

use crate::core::Core;
use crate::{now_millis, EngineError, Result};

/// One inbound pass. Returns the number of visible messages stored.
pub(crate) async fn fetch_and_process(core: &Core) -> Result<usize> {
    let owner = core.owner()?;
    let now = now_millis();

    // Snapshot the primitive's read set and persist it atomically.
    let snapshot = {
        let session = core.session.lock().await;
        let ratchet = session.as_ref().ok_or(EngineError::SessionClosed)?;
        ratchet.read_seekers()
    };
    let own_uploads = {
        let db = core.db.lock().await;
        seekers::replace_all(&db, &owner, &snapshot)?;
        messages::outgoing_seekers(&db, &owner)?
    };

    // Fetch everything the board holds for the monitored seekers, except
    // the ones that hold our own uploads.
    let to_fetch: Vec<Seeker> = snapshot.difference(&own_uploads).copied().collect();
    let mut work: HashMap<Seeker, Vec<u8>> = HashMap::new();
    let batch = core.config.message_fetch_batch.max(1);
    for chunk in to_fetch.chunks(batch) {
        let fetched = core
            .with_transport_timeout(core.bulletin.fetch_messages(chunk))
            .await
            .map_err(EngineError::from)?;
        for item in fetched {
            work.insert(item.seeker, item.ciphertext);
        }
    }

    // Drain the parked ciphertexts through the same path.
    {
        let db = core.db.lock().await;
        for parked in pending::ciphertext_list(&db)? {
            work.entry(parked.seeker).or_insert(parked.ciphertext);
        }
    }

    let mut stored = 0usize;
    let mut touched_peers: HashSet<UserId> = HashSet::new();
    // Items can arrive out of ratchet order within one batch; anything
    // undecryptable is retried as long as some other item decrypts, since
    // each successful decrypt may fill the gap in front of it.
    let mut remaining: Vec<(Seeker, Vec<u8>)> = work.into_iter().collect();
    loop {
        let mut progress = false;
        let mut parked = Vec::new();
        for (seeker, ciphertext) in remaining {
            match process_item(core, &owner, &seeker, &ciphertext, now).await? {
                ItemOutcome::Stored(peer) => {
                    stored += 1;
                    touched_peers.insert(peer);
                    progress = true;
                }
                ItemOutcome::KeepAlive(peer) => {
                    touched_peers.insert(peer);
                    progress = true;
                }
                ItemOutcome::Dropped => {
                    progress = true;
                }
                ItemOutcome::Parked => {
                    parked.push((seeker, ciphertext));
                }
            }
        }
        remaining = parked;
        if remaining.is_empty() || !progress {
            break;
        }
    }

    // Post-batch sweep: whatever left the read set was acknowledged.
    let after = {
        let session = core.session.lock().await;
        let ratchet = session.as_ref().ok_or(EngineError::SessionClosed)?;
        ratchet.read_seekers()
    };
    {
        let db = core.db.lock().await;
        seekers::replace_all(&db, &owner, &after)?;
        let delivered = messages::deliver_acked(&db, &owner, None, &after)?;
        if !delivered.is_empty() {
            tracing::debug!("{} messages acknowledged", delivered.len());
        }
        for peer in &touched_peers {
            discussions::set_last_sync_at(&db, &owner, peer, now)?;
            contacts::set_presence(&db, &owner, peer, true, Some(now))?;
        }
        let expired =
            pending::ciphertext_expire_before(&db, now.saturating_sub(core.config.pending_ttl_ms))?;
        if expired > 0 {
            tracing::debug!("dropped {expired} expired pending ciphertexts");
        }
    }

    Ok(stored)
}

enum ItemOutcome {
    /// A visible message row was inserted for this peer.
    Stored(UserId),
    /// A keep-alive was consumed; acknowledgements resolved, no row.
    KeepAlive(UserId),
    /// Undecryptable for now; parked for a later pass.
    Parked,
    /// Duplicate, malformed, or otherwise discarded.
    Dropped,
}

async fn process_item(
    core: &Core,
    owner: &UserId,
    seeker: &Seeker,
    ciphertext: &[u8],
    now: u64,
) -> Result<ItemOutcome> {
    let decoded = {
        let mut session = core.session.lock().await;
        let ratchet = session.as_mut().ok_or(EngineError::SessionClosed)?;
        ratchet.feed_incoming_read(seeker, ciphertext)
    };
    let read = match decoded {
        Ok(read) => read,
        Err(SessionError::Undecryptable) => {
            let db = core.db.lock().await;
            pending::ciphertext_insert_if_absent(&db, seeker, ciphertext, now)?;
            return Ok(ItemOutcome::Parked);
        }
        Err(SessionError::Persistence(e)) => {
            return Err(SessionError::Persistence(e).into());
        }
        Err(e) => {
            tracing::warn!(%seeker, "inbound decrypt failed: {e}");
            let db = core.db.lock().await;
            pending::ciphertext_remove(&db, seeker)?;
            return Ok(ItemOutcome::Dropped);
        }
    };

    {
        let db = core.db.lock().await;
        pending::ciphertext_remove(&db, seeker)?;
    }

    let envelope = match wire::decode_message(&read.plaintext) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(peer = %read.peer, "undeserializable payload: {e}");
            return Ok(ItemOutcome::Dropped);
        }
    };

    // Keep-alives only resolve acknowledgements; nothing visible.
    if envelope.kind == MessageKind::KeepAlive {
        let active_now = {
            let session = core.session.lock().await;
            let ratchet = session.as_ref().ok_or(EngineError::SessionClosed)?;
            ratchet.read_seekers()
        };
        let db = core.db.lock().await;
        let delivered = messages::deliver_acked(&db, owner, Some(&read.peer), &active_now)?;
        tracing::debug!(
            peer = %read.peer,
            "keep-alive consumed; {} messages acknowledged",
            delivered.len()
        );
        return Ok(ItemOutcome::KeepAlive(read.peer));
    }

    // Dedup, scoped strictly to this pair.
    {
        let db = core.db.lock().await;
        let duplicate = match envelope.message_id {
            Some(wire_id) => {
                messages::find_incoming_by_wire_id(&db, owner, &read.peer, &wire_id)?.is_some()
            }
            None => messages::find_incoming_by_content_within(
                &db,
                owner,
                &read.peer,
                &envelope.content,
                core.config.dedup_window_ms,
                now,
            )?
            .is_some(),
        };
        if duplicate {
            tracing::debug!(peer = %read.peer, "duplicate message discarded");
            return Ok(ItemOutcome::Dropped);
        }
        if contacts::get(&db, owner, &read.peer)?.is_none() {
            // A session without a contact row should not happen; do not
            // invent one from a message.
            tracing::warn!(peer = %read.peer, "message from peer without contact; dropped");
            return Ok(ItemOutcome::Dropped);
        }
    }

    let mut message = Message {
        id: 0,
        owner: *owner,
        contact: read.peer,
        content: envelope.content,
        message_id: envelope.message_id.unwrap_or_else(MessageId::random),
        kind: envelope.kind,
        direction: MessageDirection::Incoming,
        status: MessageStatus::Delivered,
        seeker: Some(*seeker),
        ciphertext: None,
        when_to_send: None,
        reply_to: envelope.reply_to,
        forward_of: envelope.forward_of,
        serialized: None,
        created_at: now,
    };
    message.id = {
        let db = core.db.lock().await;
        messages::add(&db, &message)?
    };
    tracing::debug!(peer = %read.peer, id = message.id, "message received");
    core.events.emit(&EngineEvent::MessageReceived {
        contact: read.peer,
        message: message.clone(),
    });
    Ok(ItemOutcome::Stored(read.peer))
}
