//! Deterministic stand-in for the cryptographic session primitive.
//!
//! Two [`StubRatchet`] instances complete handshakes and exchange messages
//! through any byte-faithful board, which is what the engine's tests need:
//! seekers derive from `blake3(sender ‖ receiver ‖ epoch ‖ counter)`,
//! ciphertexts are CBOR frames, and decryption only succeeds at the exact
//! next expected counter, so out-of-order material exercises the caller's
//! pending buffer. The `ack` counter piggybacked on every frame retires
//! the peer's outbound seekers.
//!
//! The state blob "encryption" is a blake3-XOF keystream. This is a test
//! double, not a cipher.

use std::collections::{HashMap, HashSet};

use gossip_types::{Seeker, UserId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    AnnouncementDecode, PeerSessionStatus, PersistHook, ReadDecode, Result, SendOutput,
    SessionError, SessionRatchet,
};

/// Unacknowledged outbound steps beyond which the session saturates.
pub const MAX_LAG: u64 = 64;

/// Inbound counters monitored ahead of the next expected step.
pub const READ_WINDOW: u64 = 16;

fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| SessionError::Codec(e.to_string()))?;
    Ok(buf)
}

fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| SessionError::Codec(e.to_string()))
}

/// The stub's public-key bundle: just the user id, CBOR-framed.
#[derive(Serialize, Deserialize)]
struct StubPublicKeys {
    user_id: UserId,
}

/// Build the serialized bundle for an identity.
pub fn public_keys_for(user_id: &UserId) -> Vec<u8> {
    let mut buf = Vec::new();
    // Serializing a 32-byte array cannot fail.
    let _ = ciborium::into_writer(&StubPublicKeys { user_id: *user_id }, &mut buf);
    buf
}

fn decode_public_keys(data: &[u8]) -> Result<UserId> {
    let keys: StubPublicKeys = from_slice(data)?;
    Ok(keys.user_id)
}

#[derive(Serialize, Deserialize)]
struct StubAnnouncement {
    public_keys: Vec<u8>,
    /// Only the addressed peer can process an announcement; everyone
    /// else sees undecryptable bytes, as with the real primitive.
    target: UserId,
    epoch: u64,
    accept: bool,
    user_data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct StubFrame {
    sender: UserId,
    epoch: u64,
    counter: u64,
    /// How many of the receiver's steps the sender has consumed; retires
    /// the receiver's outbound seekers below this counter.
    ack: u64,
    payload: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum Phase {
    SelfRequested,
    PeerRequested,
    Active,
    Killed,
}

#[derive(Clone, Serialize, Deserialize)]
struct PeerState {
    public_keys: Vec<u8>,
    phase: Phase,
    epoch: u64,
    /// Next outbound counter.
    send_n: u64,
    /// Next expected inbound counter.
    recv_n: u64,
    /// Outbound counters below this are acknowledged.
    acked_by_peer: u64,
    /// The `recv_n` value last carried to the peer in a frame.
    last_ack_sent: u64,
}

impl PeerState {
    fn fresh(public_keys: Vec<u8>) -> Self {
        Self {
            public_keys,
            phase: Phase::SelfRequested,
            epoch: 0,
            send_n: 0,
            recv_n: 0,
            acked_by_peer: 0,
            last_ack_sent: 0,
        }
    }

    fn rekey(&mut self, epoch: u64, phase: Phase) {
        self.epoch = epoch;
        self.phase = phase;
        self.send_n = 0;
        self.recv_n = 0;
        self.acked_by_peer = 0;
        self.last_ack_sent = 0;
    }
}

#[derive(Serialize, Deserialize)]
struct StubState {
    user_id: UserId,
    peers: HashMap<UserId, PeerState>,
}

/// Deterministic in-process session primitive.
pub struct StubRatchet {
    state: StubState,
    persist_key: Option<[u8; 32]>,
    persist_hook: Option<PersistHook>,
}

fn derive_seeker(sender: &UserId, receiver: &UserId, epoch: u64, counter: u64) -> Seeker {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"gossip stub seeker v1");
    hasher.update(sender.as_bytes());
    hasher.update(receiver.as_bytes());
    hasher.update(&epoch.to_le_bytes());
    hasher.update(&counter.to_le_bytes());
    Seeker::from_bytes(*hasher.finalize().as_bytes())
}

fn apply_keystream(key: &[u8; 32], data: &mut [u8]) {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"gossip stub blob v1");
    hasher.update(key);
    let mut keystream = vec![0u8; data.len()];
    hasher.finalize_xof().fill(&mut keystream);
    for (byte, k) in data.iter_mut().zip(keystream) {
        *byte ^= k;
    }
}

impl StubRatchet {
    /// Fresh primitive speaking as `user_id`.
    pub fn new(user_id: UserId) -> Self {
        Self {
            state: StubState {
                user_id,
                peers: HashMap::new(),
            },
            persist_key: None,
            persist_hook: None,
        }
    }

    /// Restore from a blob produced by
    /// [`to_encrypted_blob`](SessionRatchet::to_encrypted_blob).
    pub fn load(blob: &[u8], key: &[u8; 32]) -> Result<Self> {
        let mut plain = Zeroizing::new(blob.to_vec());
        apply_keystream(key, &mut plain);
        let state: StubState = from_slice(&plain)?;
        Ok(Self {
            state,
            persist_key: None,
            persist_hook: None,
        })
    }

    /// The identity this primitive speaks as.
    pub fn user_id(&self) -> UserId {
        self.state.user_id
    }

    /// Our own serialized public-key bundle.
    pub fn public_keys(&self) -> Vec<u8> {
        public_keys_for(&self.state.user_id)
    }

    /// Test control: terminate the session with a peer, as the real
    /// primitive does on a detected inconsistency.
    pub fn kill_peer(&mut self, peer: &UserId) {
        if let Some(state) = self.state.peers.get_mut(peer) {
            state.phase = Phase::Killed;
        }
        if let Err(e) = self.persist() {
            tracing::warn!("stub persist after kill failed: {e}");
        }
    }

    fn encrypt_state(&self, key: &[u8; 32]) -> Result<Vec<u8>> {
        let plain = Zeroizing::new(to_vec(&self.state)?);
        let mut out = plain.to_vec();
        apply_keystream(key, &mut out);
        Ok(out)
    }

    fn persist(&mut self) -> Result<()> {
        let Some(key) = self.persist_key else {
            return Ok(());
        };
        if self.persist_hook.is_none() {
            return Ok(());
        }
        let blob = self.encrypt_state(&key)?;
        if let Some(hook) = self.persist_hook.as_mut() {
            hook(&blob).map_err(|e| SessionError::Persistence(e.to_string()))?;
        }
        Ok(())
    }
}

impl SessionRatchet for StubRatchet {
    fn establish_outgoing_session(
        &mut self,
        peer_public_keys: &[u8],
        user_data: &[u8],
    ) -> Result<Vec<u8>> {
        let peer = decode_public_keys(peer_public_keys)?;
        if peer == self.state.user_id {
            return Err(SessionError::InvalidState("cannot session with self".into()));
        }

        let state = self
            .state
            .peers
            .entry(peer)
            .or_insert_with(|| PeerState::fresh(peer_public_keys.to_vec()));
        state.public_keys = peer_public_keys.to_vec();

        let accept = state.phase == Phase::PeerRequested;
        if accept {
            // Completing the peer's request: keep their epoch and the
            // zeroed counters.
            state.phase = Phase::Active;
        } else {
            let epoch = state.epoch + 1;
            state.rekey(epoch, Phase::SelfRequested);
        }
        let epoch = state.epoch;

        let announcement = StubAnnouncement {
            public_keys: public_keys_for(&self.state.user_id),
            target: peer,
            epoch,
            accept,
            user_data: user_data.to_vec(),
        };
        let bytes = to_vec(&announcement)?;
        self.persist()?;
        Ok(bytes)
    }

    fn feed_incoming_announcement(&mut self, data: &[u8]) -> Result<AnnouncementDecode> {
        let announcement: StubAnnouncement =
            from_slice(data).map_err(|_| SessionError::Undecryptable)?;
        if announcement.target != self.state.user_id {
            // Addressed to someone else (or our own announcement echoed
            // back from the board).
            return Err(SessionError::Undecryptable);
        }
        let peer =
            decode_public_keys(&announcement.public_keys).map_err(|_| SessionError::Undecryptable)?;
        if peer == self.state.user_id {
            return Err(SessionError::Undecryptable);
        }

        match self.state.peers.get_mut(&peer) {
            Some(state)
                if announcement.accept
                    && state.phase == Phase::SelfRequested
                    && state.epoch == announcement.epoch =>
            {
                state.phase = Phase::Active;
            }
            Some(state) if state.phase == Phase::Active && state.epoch == announcement.epoch => {
                // Replay of an already-processed handshake step.
            }
            Some(_) if announcement.accept => {
                // Acceptance for an epoch we no longer hold.
                return Err(SessionError::Undecryptable);
            }
            Some(state) => {
                state.public_keys = announcement.public_keys.clone();
                state.rekey(announcement.epoch, Phase::PeerRequested);
            }
            None => {
                let mut state = PeerState::fresh(announcement.public_keys.clone());
                state.rekey(announcement.epoch, Phase::PeerRequested);
                self.state.peers.insert(peer, state);
            }
        }

        self.persist()?;
        Ok(AnnouncementDecode {
            peer,
            public_keys: announcement.public_keys,
            user_data: announcement.user_data,
        })
    }

    fn send_message(&mut self, peer: &UserId, plaintext: &[u8]) -> Result<SendOutput> {
        let user_id = self.state.user_id;
        let state = self
            .state
            .peers
            .get_mut(peer)
            .ok_or(SessionError::UnknownPeer)?;
        if state.phase != Phase::Active {
            return Err(SessionError::InvalidState("session not active".into()));
        }
        if state.send_n - state.acked_by_peer >= MAX_LAG {
            return Err(SessionError::InvalidState("session saturated".into()));
        }

        let seeker = derive_seeker(&user_id, peer, state.epoch, state.send_n);
        let frame = StubFrame {
            sender: user_id,
            epoch: state.epoch,
            counter: state.send_n,
            ack: state.recv_n,
            payload: plaintext.to_vec(),
        };
        state.send_n += 1;
        state.last_ack_sent = state.recv_n;
        let ciphertext = to_vec(&frame)?;

        self.persist()?;
        Ok(SendOutput { seeker, ciphertext })
    }

    fn feed_incoming_read(&mut self, seeker: &Seeker, ciphertext: &[u8]) -> Result<ReadDecode> {
        let user_id = self.state.user_id;
        let mut matched: Option<(UserId, bool)> = None;
        for (peer, state) in &self.state.peers {
            if state.phase != Phase::Active {
                continue;
            }
            for step in state.recv_n..state.recv_n + READ_WINDOW {
                if derive_seeker(peer, &user_id, state.epoch, step) == *seeker {
                    matched = Some((*peer, step == state.recv_n));
                }
            }
        }
        let Some((peer, is_next)) = matched else {
            return Err(SessionError::Undecryptable);
        };
        if !is_next {
            // A later ratchet step; undecryptable until the gap fills.
            return Err(SessionError::Undecryptable);
        }

        let frame: StubFrame = from_slice(ciphertext)?;
        let state = self
            .state
            .peers
            .get_mut(&peer)
            .ok_or(SessionError::UnknownPeer)?;
        if frame.sender != peer || frame.epoch != state.epoch || frame.counter != state.recv_n {
            return Err(SessionError::Undecryptable);
        }
        state.recv_n += 1;
        state.acked_by_peer = state.acked_by_peer.max(frame.ack.min(state.send_n));

        self.persist()?;
        Ok(ReadDecode {
            peer,
            plaintext: frame.payload,
        })
    }

    fn refresh(&mut self) -> Result<HashSet<UserId>> {
        let owing = self
            .state
            .peers
            .iter()
            .filter(|(_, state)| {
                state.phase == Phase::Active && state.recv_n > state.last_ack_sent
            })
            .map(|(peer, _)| *peer)
            .collect();
        self.persist()?;
        Ok(owing)
    }

    fn peer_status(&self, peer: &UserId) -> PeerSessionStatus {
        match self.state.peers.get(peer) {
            None => PeerSessionStatus::UnknownPeer,
            Some(state) => match state.phase {
                Phase::SelfRequested => PeerSessionStatus::SelfRequested,
                Phase::PeerRequested => PeerSessionStatus::PeerRequested,
                Phase::Killed => PeerSessionStatus::Killed,
                Phase::Active if state.send_n - state.acked_by_peer >= MAX_LAG => {
                    PeerSessionStatus::Saturated
                }
                Phase::Active => PeerSessionStatus::Active,
            },
        }
    }

    fn peer_discard(&mut self, peer: &UserId) {
        self.state.peers.remove(peer);
        if let Err(e) = self.persist() {
            tracing::warn!("stub persist after discard failed: {e}");
        }
    }

    fn read_seekers(&self) -> HashSet<Seeker> {
        let user_id = self.state.user_id;
        let mut out = HashSet::new();
        for (peer, state) in &self.state.peers {
            if state.phase != Phase::Active {
                continue;
            }
            // Where the peer will write to us next.
            for step in state.recv_n..state.recv_n + READ_WINDOW {
                out.insert(derive_seeker(peer, &user_id, state.epoch, step));
            }
            // Our own unacknowledged writes; retirement is the ACK signal.
            for step in state.acked_by_peer..state.send_n {
                out.insert(derive_seeker(&user_id, peer, state.epoch, step));
            }
        }
        out
    }

    fn to_encrypted_blob(&self, key: &[u8; 32]) -> Result<Vec<u8>> {
        self.encrypt_state(key)
    }

    fn configure_persistence(&mut self, key: [u8; 32], hook: PersistHook) {
        self.persist_key = Some(key);
        self.persist_hook = Some(hook);
    }

    fn cleanup(&mut self) {
        // The stub holds no time-based material.
    }
}

/// A [`StubRatchet`] behind a shared handle, so a test can keep driving
/// the primitive (killing peers, inspecting status) after handing it to
/// an engine.
#[derive(Clone)]
pub struct SharedStubRatchet {
    inner: std::sync::Arc<std::sync::Mutex<StubRatchet>>,
}

impl SharedStubRatchet {
    pub fn new(user_id: UserId) -> Self {
        Self {
            inner: std::sync::Arc::new(std::sync::Mutex::new(StubRatchet::new(user_id))),
        }
    }

    /// Wrap an existing ratchet (e.g. one restored from a blob).
    pub fn from_ratchet(ratchet: StubRatchet) -> Self {
        Self {
            inner: std::sync::Arc::new(std::sync::Mutex::new(ratchet)),
        }
    }

    /// Run a closure against the underlying ratchet.
    pub fn with<T>(&self, f: impl FnOnce(&mut StubRatchet) -> T) -> T {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl SessionRatchet for SharedStubRatchet {
    fn establish_outgoing_session(
        &mut self,
        peer_public_keys: &[u8],
        user_data: &[u8],
    ) -> Result<Vec<u8>> {
        self.with(|r| r.establish_outgoing_session(peer_public_keys, user_data))
    }

    fn feed_incoming_announcement(&mut self, data: &[u8]) -> Result<AnnouncementDecode> {
        self.with(|r| r.feed_incoming_announcement(data))
    }

    fn send_message(&mut self, peer: &UserId, plaintext: &[u8]) -> Result<SendOutput> {
        self.with(|r| r.send_message(peer, plaintext))
    }

    fn feed_incoming_read(&mut self, seeker: &Seeker, ciphertext: &[u8]) -> Result<ReadDecode> {
        self.with(|r| r.feed_incoming_read(seeker, ciphertext))
    }

    fn refresh(&mut self) -> Result<HashSet<UserId>> {
        self.with(|r| r.refresh())
    }

    fn peer_status(&self, peer: &UserId) -> PeerSessionStatus {
        let guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.peer_status(peer)
    }

    fn peer_discard(&mut self, peer: &UserId) {
        self.with(|r| r.peer_discard(peer));
    }

    fn read_seekers(&self) -> HashSet<Seeker> {
        let guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.read_seekers()
    }

    fn to_encrypted_blob(&self, key: &[u8; 32]) -> Result<Vec<u8>> {
        let guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.to_encrypted_blob(key)
    }

    fn configure_persistence(&mut self, key: [u8; 32], hook: PersistHook) {
        self.with(|r| r.configure_persistence(key, hook));
    }

    fn cleanup(&mut self) {
        self.with(|r| r.cleanup());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn alice_id() -> UserId {
        UserId::from_bytes([0xA1; 32])
    }

    fn bob_id() -> UserId {
        UserId::from_bytes([0xB0; 32])
    }

    /// Complete the handshake between two fresh stubs.
    fn connected() -> (StubRatchet, StubRatchet) {
        let mut alice = StubRatchet::new(alice_id());
        let mut bob = StubRatchet::new(bob_id());

        let request = alice
            .establish_outgoing_session(&bob.public_keys(), b"hi bob")
            .expect("request");
        let decoded = bob.feed_incoming_announcement(&request).expect("feed");
        assert_eq!(decoded.peer, alice_id());
        assert_eq!(decoded.user_data, b"hi bob");
        assert_eq!(bob.peer_status(&alice_id()), PeerSessionStatus::PeerRequested);

        let accept = bob
            .establish_outgoing_session(&alice.public_keys(), b"")
            .expect("accept");
        alice.feed_incoming_announcement(&accept).expect("feed");

        assert_eq!(alice.peer_status(&bob_id()), PeerSessionStatus::Active);
        assert_eq!(bob.peer_status(&alice_id()), PeerSessionStatus::Active);
        (alice, bob)
    }

    #[test]
    fn test_handshake() {
        connected();
    }

    #[test]
    fn test_message_roundtrip_and_ack() {
        let (mut alice, mut bob) = connected();

        let out = alice.send_message(&bob_id(), b"hello").expect("send");
        // The unacknowledged outbound seeker is monitored.
        assert!(alice.read_seekers().contains(&out.seeker));

        let read = bob
            .feed_incoming_read(&out.seeker, &out.ciphertext)
            .expect("read");
        assert_eq!(read.peer, alice_id());
        assert_eq!(read.plaintext, b"hello");

        // Bob's reply carries the ack, retiring Alice's seeker.
        let reply = bob.send_message(&alice_id(), b"hi").expect("reply");
        alice
            .feed_incoming_read(&reply.seeker, &reply.ciphertext)
            .expect("read");
        assert!(!alice.read_seekers().contains(&out.seeker));
    }

    #[test]
    fn test_out_of_order_is_undecryptable_until_gap_fills() {
        let (mut alice, mut bob) = connected();
        let first = alice.send_message(&bob_id(), b"m1").expect("send");
        let second = alice.send_message(&bob_id(), b"m2").expect("send");

        assert!(matches!(
            bob.feed_incoming_read(&second.seeker, &second.ciphertext),
            Err(SessionError::Undecryptable)
        ));
        bob.feed_incoming_read(&first.seeker, &first.ciphertext)
            .expect("first");
        let read = bob
            .feed_incoming_read(&second.seeker, &second.ciphertext)
            .expect("second");
        assert_eq!(read.plaintext, b"m2");
    }

    #[test]
    fn test_replayed_ciphertext_is_undecryptable() {
        let (mut alice, mut bob) = connected();
        let out = alice.send_message(&bob_id(), b"once").expect("send");
        bob.feed_incoming_read(&out.seeker, &out.ciphertext)
            .expect("first");
        assert!(matches!(
            bob.feed_incoming_read(&out.seeker, &out.ciphertext),
            Err(SessionError::Undecryptable)
        ));
    }

    #[test]
    fn test_refresh_reports_unacked_peers() {
        let (mut alice, mut bob) = connected();
        let out = alice.send_message(&bob_id(), b"hello").expect("send");
        bob.feed_incoming_read(&out.seeker, &out.ciphertext)
            .expect("read");

        let owing = bob.refresh().expect("refresh");
        assert!(owing.contains(&alice_id()));

        // Sending anything carries the ack.
        bob.send_message(&alice_id(), b"").expect("keep-alive");
        assert!(bob.refresh().expect("refresh").is_empty());
    }

    #[test]
    fn test_renewal_resets_counters_and_reactivates() {
        let (mut alice, mut bob) = connected();
        let out = alice.send_message(&bob_id(), b"before").expect("send");
        bob.feed_incoming_read(&out.seeker, &out.ciphertext)
            .expect("read");

        bob.kill_peer(&alice_id());
        assert_eq!(bob.peer_status(&alice_id()), PeerSessionStatus::Killed);

        let renewal = alice
            .establish_outgoing_session(&public_keys_for(&bob_id()), b"")
            .expect("renew");
        assert_eq!(alice.peer_status(&bob_id()), PeerSessionStatus::SelfRequested);

        bob.feed_incoming_announcement(&renewal).expect("feed");
        assert_eq!(bob.peer_status(&alice_id()), PeerSessionStatus::PeerRequested);
        let accept = bob
            .establish_outgoing_session(&public_keys_for(&alice_id()), b"")
            .expect("accept");
        alice.feed_incoming_announcement(&accept).expect("feed");

        assert_eq!(alice.peer_status(&bob_id()), PeerSessionStatus::Active);
        let out = alice.send_message(&bob_id(), b"after").expect("send");
        let read = bob
            .feed_incoming_read(&out.seeker, &out.ciphertext)
            .expect("read");
        assert_eq!(read.plaintext, b"after");
    }

    #[test]
    fn test_announcement_for_another_peer_is_undecryptable() {
        let mut alice = StubRatchet::new(alice_id());
        let mut carol = StubRatchet::new(UserId::from_bytes([0xC0; 32]));
        let request = alice
            .establish_outgoing_session(&public_keys_for(&bob_id()), b"")
            .expect("request");
        assert!(matches!(
            carol.feed_incoming_announcement(&request),
            Err(SessionError::Undecryptable)
        ));
        assert_eq!(carol.peer_status(&alice_id()), PeerSessionStatus::UnknownPeer);
    }

    #[test]
    fn test_own_announcement_is_undecryptable() {
        let mut alice = StubRatchet::new(alice_id());
        let mut bob = StubRatchet::new(bob_id());
        let request = alice
            .establish_outgoing_session(&bob.public_keys(), b"")
            .expect("request");
        assert!(matches!(
            alice.feed_incoming_announcement(&request),
            Err(SessionError::Undecryptable)
        ));
    }

    #[test]
    fn test_persistence_hook_runs_on_advancing_calls() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let mut alice = StubRatchet::new(alice_id());
        alice.configure_persistence(
            [7; 32],
            Box::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        alice
            .establish_outgoing_session(&public_keys_for(&bob_id()), b"")
            .expect("establish");
        assert_eq!(count.load(Ordering::SeqCst), 1);
        alice.refresh().expect("refresh");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_hook_error_aborts_the_advance() {
        let mut alice = StubRatchet::new(alice_id());
        alice.configure_persistence(
            [7; 32],
            Box::new(|_| Err(anyhow::anyhow!("disk full"))),
        );
        assert!(matches!(
            alice.establish_outgoing_session(&public_keys_for(&bob_id()), b""),
            Err(SessionError::Persistence(_))
        ));
    }

    #[test]
    fn test_blob_roundtrip() {
        let (alice, _bob) = connected();
        let key = [9u8; 32];
        let blob = alice.to_encrypted_blob(&key).expect("blob");
        let restored = StubRatchet::load(&blob, &key).expect("load");
        assert_eq!(restored.user_id(), alice_id());
        assert_eq!(restored.peer_status(&bob_id()), PeerSessionStatus::Active);
        // The blob is not the plain serialization.
        assert!(StubRatchet::load(&blob, &[0u8; 32]).is_err());
    }
}
