//! Announcement service: outbound publication with retry, and the
//! inbound fetch/classify loop that drives the discussion handshake.

use gossip_session::{PeerSessionStatus, SessionError};
use gossip_store::queries::{contacts, discussions, pending, profile};
use gossip_store::StoreError;
use gossip_types::wire::AnnouncementUserData;
use gossip_types::{
    Contact, Discussion, DiscussionDirection, EngineEvent, PendingSend, UserId,
    NEW_REQUEST_NAME_PREFIX,
};

use crate::core::Core;
use crate::{discussions as discussion_service, now_millis, outbox, EngineError, Result};

/// Publish one announcement. Success clears the discussion's pending
/// send; failure (re)arms it one retry delay out. Returns whether the
/// publish went through.
pub(crate) async fn publish_outbound(core: &Core, contact: &UserId, data: Vec<u8>) -> Result<bool> {
    let owner = core.owner()?;
    let attempt = core
        .with_transport_timeout(core.bulletin.send_announcement(&data))
        .await;
    match attempt {
        Ok(counter) => {
            let db = core.db.lock().await;
            discussions::set_send_announcement(&db, &owner, contact, None)?;
            tracing::debug!(contact = %contact, counter, "announcement published");
            Ok(true)
        }
        Err(e) => {
            let pending = PendingSend {
                data,
                when_to_send: now_millis() + core.config.retry_delay_ms,
            };
            {
                let db = core.db.lock().await;
                discussions::set_send_announcement(&db, &owner, contact, Some(&pending))?;
            }
            tracing::warn!(contact = %contact, "announcement publish failed ({e}); retry armed");
            Ok(false)
        }
    }
}

/// Retry every armed announcement whose gate has passed.
pub(crate) async fn publish_pending(core: &Core) -> Result<usize> {
    let owner = core.owner()?;
    let now = now_millis();
    let armed = {
        let db = core.db.lock().await;
        discussions::list_armed(&db, &owner)?
    };
    let mut published = 0;
    for discussion in armed {
        let Some(pending) = discussion.send_announcement else {
            continue;
        };
        if pending.when_to_send > now {
            continue;
        }
        if publish_outbound(core, &discussion.contact, pending.data).await? {
            published += 1;
        }
    }
    Ok(published)
}

/// Paginated inbound pass over the announcement board, plus a retry pass
/// over previously parked announcements. The cursor advances to the
/// highest processed counter only when the batch finished without a fatal
/// error; per-item failures park the item and never block the cursor.
pub(crate) async fn fetch_and_process(core: &Core) -> Result<usize> {
    let owner = core.owner()?;
    let now = now_millis();
    let mut processed = 0usize;

    let parked = {
        let db = core.db.lock().await;
        pending::announcement_list(&db)?
    };
    for item in parked {
        if process_item(core, &owner, item.counter, &item.data, true).await? {
            let db = core.db.lock().await;
            pending::announcement_remove(&db, item.counter)?;
        }
    }

    let limit = core.config.announcement_fetch_limit.max(1);
    loop {
        let cursor = {
            let db = core.db.lock().await;
            profile::get(&db, &owner)?.last_bulletin_counter
        };
        let batch = core
            .with_transport_timeout(core.bulletin.fetch_announcements(limit, cursor))
            .await
            .map_err(EngineError::from)?;
        if batch.is_empty() {
            break;
        }

        let count = batch.len();
        let mut max_counter = cursor.unwrap_or(0);
        for item in batch {
            process_item(core, &owner, item.counter, &item.data, false).await?;
            max_counter = max_counter.max(item.counter);
            processed += 1;
        }
        {
            let db = core.db.lock().await;
            profile::set_last_bulletin_counter(&db, &owner, max_counter)?;
        }
        if count < limit {
            break;
        }
    }

    {
        let db = core.db.lock().await;
        let expired = pending::announcement_expire_before(
            &db,
            now.saturating_sub(core.config.pending_ttl_ms),
        )?;
        if expired > 0 {
            tracing::debug!("dropped {expired} expired pending announcements");
        }
    }
    Ok(processed)
}

/// Classify one announcement. Returns true when the item is fully handled
/// (a parked copy may be removed), false when it was parked for retry.
async fn process_item(
    core: &Core,
    owner: &UserId,
    counter: u64,
    data: &[u8],
    from_pending: bool,
) -> Result<bool> {
    let decoded = {
        let mut session = core.session.lock().await;
        let ratchet = session.as_mut().ok_or(EngineError::SessionClosed)?;
        ratchet.feed_incoming_announcement(data)
    };
    let decoded = match decoded {
        Ok(decoded) => decoded,
        Err(SessionError::Undecryptable) => {
            if !from_pending {
                let db = core.db.lock().await;
                pending::announcement_insert_if_absent(&db, counter, data, now_millis())?;
            }
            return Ok(false);
        }
        Err(e @ SessionError::Persistence(_)) => return Err(e.into()),
        Err(e) => {
            tracing::warn!(counter, "announcement rejected: {e}");
            return Ok(true);
        }
    };

    let user_data = AnnouncementUserData::decode(&decoded.user_data).unwrap_or_default();
    let status = {
        let session = core.session.lock().await;
        let ratchet = session.as_ref().ok_or(EngineError::SessionClosed)?;
        ratchet.peer_status(&decoded.peer)
    };
    let now = now_millis();

    let existing = {
        let db = core.db.lock().await;
        contacts::get(&db, owner, &decoded.peer)?
    };
    let Some(_contact) = existing else {
        // A previously unknown peer asked to converse.
        let number = {
            let db = core.db.lock().await;
            contacts::count(&db, owner)? + 1
        };
        let name = user_data
            .username
            .clone()
            .unwrap_or_else(|| format!("{NEW_REQUEST_NAME_PREFIX} {number}"));
        let contact = Contact {
            owner: *owner,
            user_id: decoded.peer,
            name,
            public_keys: decoded.public_keys.clone(),
            is_online: true,
            last_seen: Some(now),
        };
        let discussion = Discussion {
            owner: *owner,
            contact: decoded.peer,
            direction: DiscussionDirection::Received,
            we_accepted: false,
            was_active: false,
            send_announcement: None,
            last_sync_at: None,
            last_message_id: None,
            last_message_content: None,
            last_message_at: None,
            unread_count: 0,
            custom_name: None,
            last_announcement_message: user_data.message.clone(),
            created_at: now,
        };
        {
            let db = core.db.lock().await;
            let tx = db.unchecked_transaction().map_err(StoreError::Sqlite)?;
            contacts::insert(&tx, &contact)?;
            discussions::insert(&tx, &discussion)?;
            tx.commit().map_err(StoreError::Sqlite)?;
        }
        tracing::info!(peer = %decoded.peer, "new discussion request");
        core.events.emit(&EngineEvent::DiscussionRequest {
            contact: decoded.peer,
            discussion,
        });
        return Ok(true);
    };

    // Known contact: make sure a discussion row exists, then classify by
    // the session status the primitive reports after the feed.
    let discussion = {
        let db = core.db.lock().await;
        match discussions::get(&db, owner, &decoded.peer)? {
            Some(discussion) => discussion,
            None => {
                let discussion = Discussion {
                    owner: *owner,
                    contact: decoded.peer,
                    direction: DiscussionDirection::Received,
                    we_accepted: false,
                    was_active: false,
                    send_announcement: None,
                    last_sync_at: None,
                    last_message_id: None,
                    last_message_content: None,
                    last_message_at: None,
                    unread_count: 0,
                    custom_name: None,
                    last_announcement_message: user_data.message.clone(),
                    created_at: now,
                };
                discussions::insert(&db, &discussion)?;
                discussion
            }
        }
    };
    {
        let db = core.db.lock().await;
        if let Some(text) = &user_data.message {
            discussions::set_last_announcement_message(&db, owner, &decoded.peer, Some(text))?;
        }
        contacts::set_presence(&db, owner, &decoded.peer, true, Some(now))?;
    }

    match status {
        PeerSessionStatus::PeerRequested
            if discussion.we_accepted || discussion.was_active =>
        {
            // Session recovery from a peer we already converse with:
            // accept without asking again and resume queued traffic.
            tracing::info!(peer = %decoded.peer, "auto-accepting session recovery");
            discussion_service::auto_accept(core, &decoded.peer).await?;
            core.events.emit(&EngineEvent::DiscussionAccepted {
                contact: decoded.peer,
            });
        }
        PeerSessionStatus::PeerRequested => {
            // A fresh invite from a known contact waits for the user.
            core.events.emit(&EngineEvent::DiscussionRequest {
                contact: decoded.peer,
                discussion,
            });
        }
        PeerSessionStatus::Active | PeerSessionStatus::Saturated if !discussion.was_active => {
            // The peer accepted our request.
            {
                let db = core.db.lock().await;
                discussions::set_was_active(&db, owner, &decoded.peer)?;
            }
            tracing::info!(peer = %decoded.peer, "discussion accepted");
            core.events.emit(&EngineEvent::DiscussionAccepted {
                contact: decoded.peer,
            });
            outbox::process_send_queue_for_contact(core, &decoded.peer).await?;
        }
        _ => {}
    }
    Ok(true)
}
