//! Discussion service: handshake operations and the derived status.

use gossip_session::PeerSessionStatus;
use gossip_store::queries::{contacts, discussions, messages, profile};
use gossip_store::StoreError;
use gossip_types::wire::AnnouncementUserData;
use gossip_types::{
    Discussion, DiscussionDirection, DiscussionStatus, PendingSend, UserId,
};

use crate::core::Core;
use crate::{announcements, now_millis, outbox, EngineError, Result};

/// Start a discussion: build the outgoing announcement (which advances and
/// persists the ratchet), create or revive the discussion row with the
/// announcement armed, then publish.
pub(crate) async fn start(
    core: &Core,
    contact: &UserId,
    username: Option<String>,
    message: Option<String>,
) -> Result<()> {
    let owner = core.owner()?;
    let peer = {
        let db = core.db.lock().await;
        contacts::get(&db, &owner, contact)?
    }
    .ok_or_else(|| EngineError::Validation {
        reason: format!("no contact {contact}"),
    })?;

    let status = {
        let session = core.session.lock().await;
        let ratchet = session.as_ref().ok_or(EngineError::SessionClosed)?;
        ratchet.peer_status(contact)
    };
    if !matches!(
        status,
        PeerSessionStatus::Active | PeerSessionStatus::NoSession | PeerSessionStatus::UnknownPeer
    ) {
        return Err(EngineError::Validation {
            reason: format!("cannot start a discussion while the session is {status:?}"),
        });
    }

    let stored_username = {
        let db = core.db.lock().await;
        profile::get(&db, &owner)?.username
    };
    let user_data =
        AnnouncementUserData::new(Some(username.unwrap_or(stored_username)), message).encode();

    let announcement = {
        let mut session = core.session.lock().await;
        let ratchet = session.as_mut().ok_or(EngineError::SessionClosed)?;
        ratchet.establish_outgoing_session(&peer.public_keys, &user_data)?
    };

    let now = now_millis();
    let pending = PendingSend {
        data: announcement.clone(),
        when_to_send: now,
    };
    {
        let db = core.db.lock().await;
        match discussions::get(&db, &owner, contact)? {
            Some(_) => {
                discussions::set_we_accepted(&db, &owner, contact)?;
                discussions::set_send_announcement(&db, &owner, contact, Some(&pending))?;
            }
            None => {
                discussions::insert(
                    &db,
                    &Discussion {
                        owner,
                        contact: *contact,
                        direction: DiscussionDirection::Initiated,
                        we_accepted: true,
                        was_active: false,
                        send_announcement: Some(pending),
                        last_sync_at: None,
                        last_message_id: None,
                        last_message_content: None,
                        last_message_at: None,
                        unread_count: 0,
                        custom_name: None,
                        last_announcement_message: None,
                        created_at: now,
                    },
                )?;
            }
        }
    }
    tracing::info!(contact = %contact, "discussion started");
    announcements::publish_outbound(core, contact, announcement).await?;
    Ok(())
}

/// User-facing accept: only valid on an unaccepted received request.
pub(crate) async fn accept(core: &Core, contact: &UserId) -> Result<()> {
    let owner = core.owner()?;
    let discussion = {
        let db = core.db.lock().await;
        discussions::get(&db, &owner, contact)?
    }
    .ok_or_else(|| EngineError::Validation {
        reason: format!("no discussion with {contact}"),
    })?;
    if discussion.direction != DiscussionDirection::Received || discussion.we_accepted {
        return Err(EngineError::Validation {
            reason: "discussion is not an unaccepted incoming request".into(),
        });
    }
    auto_accept(core, contact).await
}

/// Produce and publish our acceptance announcement, activate the
/// discussion, and resume queued traffic. Shared by the user-facing
/// accept and the session-recovery auto-accept.
pub(crate) async fn auto_accept(core: &Core, contact: &UserId) -> Result<()> {
    let owner = core.owner()?;
    let peer = {
        let db = core.db.lock().await;
        contacts::get(&db, &owner, contact)?
    }
    .ok_or_else(|| EngineError::Validation {
        reason: format!("no contact {contact}"),
    })?;
    let stored_username = {
        let db = core.db.lock().await;
        profile::get(&db, &owner)?.username
    };
    let user_data = AnnouncementUserData::new(Some(stored_username), None).encode();

    // Establishing over the peer's request completes the handshake.
    let announcement = {
        let mut session = core.session.lock().await;
        let ratchet = session.as_mut().ok_or(EngineError::SessionClosed)?;
        ratchet.establish_outgoing_session(&peer.public_keys, &user_data)?
    };

    let now = now_millis();
    let pending = PendingSend {
        data: announcement.clone(),
        when_to_send: now,
    };
    {
        let db = core.db.lock().await;
        if discussions::get(&db, &owner, contact)?.is_none() {
            discussions::insert(
                &db,
                &Discussion {
                    owner,
                    contact: *contact,
                    direction: DiscussionDirection::Received,
                    we_accepted: true,
                    was_active: false,
                    send_announcement: None,
                    last_sync_at: None,
                    last_message_id: None,
                    last_message_content: None,
                    last_message_at: None,
                    unread_count: 0,
                    custom_name: None,
                    last_announcement_message: None,
                    created_at: now,
                },
            )?;
        }
        discussions::set_we_accepted(&db, &owner, contact)?;
        discussions::set_send_announcement(&db, &owner, contact, Some(&pending))?;
    }

    let status = {
        let session = core.session.lock().await;
        let ratchet = session.as_ref().ok_or(EngineError::SessionClosed)?;
        ratchet.peer_status(contact)
    };
    if matches!(
        status,
        PeerSessionStatus::Active | PeerSessionStatus::Saturated
    ) {
        let db = core.db.lock().await;
        discussions::set_was_active(&db, &owner, contact)?;
    }

    announcements::publish_outbound(core, contact, announcement).await?;
    outbox::process_send_queue_for_contact(core, contact).await?;
    Ok(())
}

/// Renew the session: fresh announcement (forcing ratchet
/// reinitialisation on the remote), queued rows reset to WaitingSession
/// atomically with the arming, then publish and re-run the queue.
pub(crate) async fn renew(core: &Core, contact: &UserId) -> Result<()> {
    let owner = core.owner()?;
    let peer = {
        let db = core.db.lock().await;
        contacts::get(&db, &owner, contact)?
    }
    .ok_or_else(|| EngineError::Validation {
        reason: format!("no contact {contact}"),
    })?;
    {
        let db = core.db.lock().await;
        if discussions::get(&db, &owner, contact)?.is_none() {
            return Err(EngineError::Validation {
                reason: format!("no discussion with {contact} to renew"),
            });
        }
    }

    let stored_username = {
        let db = core.db.lock().await;
        profile::get(&db, &owner)?.username
    };
    let user_data = AnnouncementUserData::new(Some(stored_username), None).encode();
    let announcement = {
        let mut session = core.session.lock().await;
        let ratchet = session.as_mut().ok_or(EngineError::SessionClosed)?;
        ratchet.establish_outgoing_session(&peer.public_keys, &user_data)?
    };

    let now = now_millis();
    let pending = PendingSend {
        data: announcement.clone(),
        when_to_send: now,
    };
    let reset = {
        let db = core.db.lock().await;
        let tx = db.unchecked_transaction().map_err(StoreError::Sqlite)?;
        let reset = messages::reset_for_renewal(&tx, &owner, contact)?;
        discussions::set_we_accepted(&tx, &owner, contact)?;
        discussions::set_send_announcement(&tx, &owner, contact, Some(&pending))?;
        tx.commit().map_err(StoreError::Sqlite)?;
        reset
    };
    tracing::info!(contact = %contact, reset, "session renewal");

    announcements::publish_outbound(core, contact, announcement).await?;
    // No-op until the peer re-activates the session; harmless to try.
    outbox::process_send_queue_for_contact(core, contact).await?;
    Ok(())
}

/// The crypto primitive's status for the peer, verbatim.
pub(crate) async fn session_status(core: &Core, contact: &UserId) -> Result<PeerSessionStatus> {
    let session = core.session.lock().await;
    let ratchet = session.as_ref().ok_or(EngineError::SessionClosed)?;
    Ok(ratchet.peer_status(contact))
}

/// Derived discussion status.
pub(crate) async fn status(core: &Core, contact: &UserId) -> Result<DiscussionStatus> {
    let owner = core.owner()?;
    let discussion = {
        let db = core.db.lock().await;
        discussions::get(&db, &owner, contact)?
    }
    .ok_or_else(|| EngineError::Validation {
        reason: format!("no discussion with {contact}"),
    })?;
    let session_status = session_status(core, contact).await?;
    Ok(derive_status(&discussion, session_status, now_millis()))
}

/// Pure mapping from persisted flags and the live ratchet status.
pub(crate) fn derive_status(
    discussion: &Discussion,
    session_status: PeerSessionStatus,
    now: u64,
) -> DiscussionStatus {
    if let Some(pending) = &discussion.send_announcement {
        if pending.when_to_send > now {
            // A retry is armed; the last publish attempt failed.
            return DiscussionStatus::SendFailed;
        }
    }
    match session_status {
        PeerSessionStatus::Active | PeerSessionStatus::Saturated => DiscussionStatus::Active,
        PeerSessionStatus::SelfRequested => {
            if discussion.was_active {
                DiscussionStatus::Reconnecting
            } else {
                DiscussionStatus::Pending
            }
        }
        PeerSessionStatus::PeerRequested => DiscussionStatus::Pending,
        PeerSessionStatus::Killed => DiscussionStatus::Broken,
        PeerSessionStatus::NoSession | PeerSessionStatus::UnknownPeer => {
            if discussion.was_active {
                DiscussionStatus::Broken
            } else {
                DiscussionStatus::Pending
            }
        }
    }
}

/// A discussion is stable when the session is live (or being established
/// by us) and no outgoing message is parked without a path forward.
pub(crate) async fn is_stable(core: &Core, contact: &UserId) -> Result<bool> {
    let owner = core.owner()?;
    let session_status = session_status(core, contact).await?;
    if !matches!(
        session_status,
        PeerSessionStatus::Active | PeerSessionStatus::SelfRequested
    ) {
        return Ok(false);
    }
    if session_status != PeerSessionStatus::Active {
        let queued = {
            let db = core.db.lock().await;
            messages::has_unsent_to(&db, &owner, contact)?
        };
        if queued {
            return Ok(false);
        }
    }
    Ok(true)
}
