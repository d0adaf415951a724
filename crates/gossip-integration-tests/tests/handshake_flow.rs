//! Integration test: discussion handshake over the bulletin board.
//!
//! Exercises the announcement path end to end:
//! 1. Alice adds Bob and starts a discussion with a free-text blurb
//! 2. Bob's fetch classifies it as a new request (contact auto-created)
//! 3. Bob accepts; Alice observes the acceptance and goes Active
//! 4. Cursor idempotence and announcement-publish retry

mod common;

use common::{capture_events, connect, spawn_peer};
use gossip_session::PeerSessionStatus;
use gossip_transport::memory::MemoryBulletin;
use gossip_types::{DiscussionDirection, DiscussionStatus, EngineEvent, EventKind};

#[tokio::test]
async fn test_full_handshake() {
    let board = MemoryBulletin::new();
    let alice = spawn_peer(&board, 0xA1, "alice").await;
    let bob = spawn_peer(&board, 0xB0, "bob").await;

    let requests = capture_events(&bob.engine, EventKind::DiscussionRequest);
    let accepted = capture_events(&alice.engine, EventKind::DiscussionAccepted);

    alice.engine.add_contact(bob.id, "bob").await.expect("add");
    alice
        .engine
        .start_discussion(&bob.id, None, Some("hi, it's alice".to_string()))
        .await
        .expect("start");
    assert_eq!(
        alice.engine.session_status(&bob.id).await.expect("status"),
        PeerSessionStatus::SelfRequested
    );
    assert_eq!(
        alice.engine.discussion_status(&bob.id).await.expect("status"),
        DiscussionStatus::Pending
    );

    // Bob has never heard of Alice; the fetch creates contact and
    // discussion from the announcement.
    bob.engine.sync().await.expect("sync");
    {
        let events = requests.lock().expect("lock");
        assert_eq!(events.len(), 1);
        match &events[0] {
            EngineEvent::DiscussionRequest { contact, discussion } => {
                assert_eq!(*contact, alice.id);
                assert_eq!(discussion.direction, DiscussionDirection::Received);
                assert!(!discussion.we_accepted);
                assert_eq!(
                    discussion.last_announcement_message.as_deref(),
                    Some("hi, it's alice")
                );
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    let contacts = bob.engine.contacts().await.expect("contacts");
    assert_eq!(contacts.len(), 1);
    // Contact name comes from the announcement's username field.
    assert_eq!(contacts[0].name, "alice");

    bob.engine.accept_discussion(&alice.id).await.expect("accept");
    assert_eq!(
        bob.engine.session_status(&alice.id).await.expect("status"),
        PeerSessionStatus::Active
    );

    alice.engine.sync().await.expect("sync");
    assert_eq!(
        alice.engine.session_status(&bob.id).await.expect("status"),
        PeerSessionStatus::Active
    );
    assert_eq!(
        alice.engine.discussion_status(&bob.id).await.expect("status"),
        DiscussionStatus::Active
    );
    assert_eq!(accepted.lock().expect("lock").len(), 1);
}

#[tokio::test]
async fn test_accept_rejects_wrong_direction() {
    let board = MemoryBulletin::new();
    let alice = spawn_peer(&board, 0xA1, "alice").await;
    let bob = spawn_peer(&board, 0xB0, "bob").await;
    connect(&alice, &bob).await;

    // Alice initiated; she cannot "accept" it.
    assert!(alice.engine.accept_discussion(&bob.id).await.is_err());
    // Bob already accepted; a second accept is rejected too.
    assert!(bob.engine.accept_discussion(&alice.id).await.is_err());
}

#[tokio::test]
async fn test_fetch_without_news_is_a_noop() {
    let board = MemoryBulletin::new();
    let alice = spawn_peer(&board, 0xA1, "alice").await;
    let bob = spawn_peer(&board, 0xB0, "bob").await;
    connect(&alice, &bob).await;

    let cursor_before = alice
        .engine
        .profile()
        .await
        .expect("profile")
        .last_bulletin_counter;
    assert!(cursor_before.is_some());

    let processed = alice.engine.fetch_announcements().await.expect("fetch");
    assert_eq!(processed, 0);
    assert_eq!(
        alice
            .engine
            .profile()
            .await
            .expect("profile")
            .last_bulletin_counter,
        cursor_before
    );
}

#[tokio::test]
async fn test_announcement_publish_retries_after_failure() {
    let board = MemoryBulletin::new();
    let alice = spawn_peer(&board, 0xA1, "alice").await;
    let bob = spawn_peer(&board, 0xB0, "bob").await;

    alice.engine.add_contact(bob.id, "bob").await.expect("add");
    board.fail_announcement_sends(1);
    alice
        .engine
        .start_discussion(&bob.id, None, None)
        .await
        .expect("start");
    assert_eq!(board.announcement_count(), 0);

    // The armed announcement survives in the discussion row and goes out
    // on the next driver pass.
    let discussions = alice.engine.discussions().await.expect("list");
    assert!(discussions[0].send_announcement.is_some());

    alice.engine.state_update().await.expect("state update");
    assert_eq!(board.announcement_count(), 1);
    let discussions = alice.engine.discussions().await.expect("list");
    assert!(discussions[0].send_announcement.is_none());

    // The handshake still completes.
    bob.engine.sync().await.expect("sync");
    bob.engine.accept_discussion(&alice.id).await.expect("accept");
    alice.engine.sync().await.expect("sync");
    assert_eq!(
        alice.engine.session_status(&bob.id).await.expect("status"),
        PeerSessionStatus::Active
    );
}

#[tokio::test]
async fn test_add_contact_without_published_key_fails_structurally() {
    let board = MemoryBulletin::new();
    let alice = spawn_peer(&board, 0xA1, "alice").await;
    let ghost = gossip_types::UserId::from_bytes([0xEE; 32]);

    let result = alice.engine.add_contact(ghost, "ghost").await;
    assert!(matches!(
        result,
        Err(gossip_engine::EngineError::PublicKeyNotFound(id)) if id == ghost
    ));
}
