//! Refresh driver: ties ratchet advancement to application-visible
//! acknowledgements.
//!
//! When the primitive reports that a peer is waiting on our
//! acknowledgement and no real traffic is queued to carry it, an
//! invisible keep-alive rides the normal outbound pipeline instead.

use gossip_session::PeerSessionStatus;
use gossip_store::queries::{discussions, messages};
use gossip_types::{EngineEvent, MessageKind};

use crate::core::Core;
use crate::{announcements, outbox, EngineError, Result};

/// One driver pass; called after every state-changing operation and on
/// the background interval.
pub(crate) async fn state_update(core: &Core) -> Result<()> {
    let owner = core.owner()?;

    // Ratchet advancement; the primitive persists before returning.
    let needs_step = {
        let mut session = core.session.lock().await;
        let ratchet = session.as_mut().ok_or(EngineError::SessionClosed)?;
        ratchet.refresh()?
    };

    for peer in needs_step {
        let status = {
            let session = core.session.lock().await;
            let ratchet = session.as_ref().ok_or(EngineError::SessionClosed)?;
            ratchet.peer_status(&peer)
        };
        if status != PeerSessionStatus::Active {
            continue;
        }

        let has_traffic = {
            let db = core.db.lock().await;
            messages::has_unsent_to(&db, &owner, &peer)?
        };
        if has_traffic {
            // Queued traffic will carry the ratchet step.
            outbox::process_send_queue_for_contact(core, &peer).await?;
            continue;
        }

        let known = {
            let db = core.db.lock().await;
            gossip_store::queries::contacts::get(&db, &owner, &peer)?.is_some()
        };
        if known {
            tracing::debug!(peer = %peer, "enqueueing keep-alive");
            outbox::enqueue(core, &peer, MessageKind::KeepAlive, "", None, None).await?;
        }
    }

    // Session-health checks over every discussion.
    let all = {
        let db = core.db.lock().await;
        discussions::list(&db, &owner)?
    };
    for discussion in all {
        let status = {
            let session = core.session.lock().await;
            let ratchet = session.as_ref().ok_or(EngineError::SessionClosed)?;
            ratchet.peer_status(&discussion.contact)
        };
        match status {
            PeerSessionStatus::Killed | PeerSessionStatus::NoSession
                if discussion.was_active =>
            {
                // Renewal is the user's call; never renew unilaterally.
                core.events.emit(&EngineEvent::SessionRenewalNeeded {
                    contact: discussion.contact,
                });
            }
            PeerSessionStatus::PeerRequested
                if discussion.was_active && discussion.we_accepted =>
            {
                // The announcement pass auto-accepts recoveries; seeing
                // this here means that pass was skipped or failed.
                core.events.emit(&EngineEvent::Error {
                    detail: format!(
                        "peer {} requests a session while the discussion is active",
                        discussion.contact
                    ),
                });
            }
            _ => {}
        }
    }

    // Drive every queue with traffic and retry armed announcements.
    outbox::process_all(core).await?;
    announcements::publish_pending(core).await?;
    Ok(())
}
