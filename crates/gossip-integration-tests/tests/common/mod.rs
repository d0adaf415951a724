//! Shared harness: engine pairs over one in-memory bulletin, stub
//! ratchets, and event capture.

use std::sync::{Arc, Mutex};

use gossip_engine::{EngineConfig, Gossip, OpenSessionOptions};
use gossip_session::stub::{self, SharedStubRatchet};
use gossip_transport::memory::MemoryBulletin;
use gossip_types::{EngineEvent, EventKind, UserId};

pub struct TestPeer {
    pub id: UserId,
    pub engine: Gossip,
    pub ratchet: SharedStubRatchet,
}

/// Config with immediate retries, so tests never sleep.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        retry_delay_ms: 0,
        ..EngineConfig::default()
    }
}

pub async fn spawn_peer(board: &MemoryBulletin, byte: u8, name: &str) -> TestPeer {
    let id = UserId::from_bytes([byte; 32]);
    let ratchet = SharedStubRatchet::new(id);
    board.register_public_key(id, stub::public_keys_for(&id));

    let engine =
        Gossip::init_in_memory(fast_config(), Arc::new(board.clone())).expect("init engine");
    engine
        .open_session(OpenSessionOptions {
            ratchet: Box::new(ratchet.clone()),
            user_id: id,
            username: name.to_string(),
            encryption_key: Some([0x11; 32]),
            persist: Some(Box::new(|_| Ok(()))),
        })
        .await
        .expect("open session");

    TestPeer {
        id,
        engine,
        ratchet,
    }
}

/// Drive a completed handshake: `a` invites, `b` accepts, `a` observes
/// the acceptance.
pub async fn connect(a: &TestPeer, b: &TestPeer) {
    a.engine.add_contact(b.id, "peer").await.expect("add contact");
    a.engine
        .start_discussion(&b.id, None, Some("hello".to_string()))
        .await
        .expect("start discussion");
    b.engine.sync().await.expect("sync b");
    b.engine
        .accept_discussion(&a.id)
        .await
        .expect("accept discussion");
    a.engine.sync().await.expect("sync a");
}

/// Collect every event of one kind into a shared log.
pub fn capture_events(engine: &Gossip, kind: EventKind) -> Arc<Mutex<Vec<EngineEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    engine.on(kind, move |event| {
        sink.lock().expect("event log lock").push(event.clone());
    });
    log
}
