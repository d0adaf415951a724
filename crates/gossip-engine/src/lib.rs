//! # gossip-engine
//!
//! Client-side orchestration for an end-to-end encrypted, store-and-forward
//! messenger. The engine sits between an opaque cryptographic session
//! primitive ([`gossip_session::SessionRatchet`]) and a SQLite store, and
//! talks to an untrusted bulletin service ([`gossip_transport::Bulletin`]).
//!
//! What lives here:
//!
//! - the discussion state machine (handshake, acceptance, renewal,
//!   reconnect) via [`discussions`]
//! - the per-peer outbound FIFO with retry via [`outbox`]
//! - the inbound decrypt/dedup pipeline and seeker-based acknowledgement
//!   via [`inbox`]
//! - announcement fetch/classify/publish via [`announcements`]
//! - the refresh driver that ties ratchet advancement to keep-alives via
//!   [`refresh`]
//! - the [`Gossip`] facade owning lifecycle, configuration, and the typed
//!   event bus
//!
//! The load-bearing rule throughout: the session primitive persists every
//! ratchet advance through its synchronous hook *before* the engine
//! attempts the network send that would consume the advance.

mod announcements;
pub mod config;
mod core;
mod discussions;
pub mod events;
mod inbox;
mod locks;
mod outbox;
mod refresh;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gossip_session::{PersistHook, SessionRatchet};
use gossip_store::StoreError;
use gossip_transport::{Bulletin, TransportError};
use gossip_types::{
    Contact, Discussion, DiscussionStatus, EngineEvent, EventKind, Message, MessageId,
    MessageKind, UserId, UserProfile,
};

pub use config::EngineConfig;
pub use events::EventBus;

use crate::core::Core;
use gossip_store::queries::{contacts, messages, profile};

/// Engine error types.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] gossip_store::StoreError),

    #[error("session error: {0}")]
    Session(#[from] gossip_session::SessionError),

    #[error("transport error: {0}")]
    Transport(#[from] gossip_transport::TransportError),

    #[error("wire codec error: {0}")]
    Wire(#[from] gossip_types::wire::WireError),

    /// The bulletin holds no public key for this user. Distinct from a
    /// generic transport failure.
    #[error("no public key published for {0}")]
    PublicKeyNotFound(UserId),

    /// Bad input; carries a reason, never panics.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// Internal invariant violated; the operation was aborted without
    /// partial state mutation.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// No session is open.
    #[error("no session is open")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Current Unix time in milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Inputs to [`Gossip::open_session`].
///
/// The caller constructs (or restores) the session primitive itself —
/// loading an encrypted blob is the primitive's own concern — and hands
/// the engine the ready handle.
pub struct OpenSessionOptions {
    pub ratchet: Box<dyn SessionRatchet>,
    pub user_id: UserId,
    pub username: String,
    /// Key for the primitive's encrypted state blobs.
    pub encryption_key: Option<[u8; 32]>,
    /// Durable sink for those blobs. May be configured later via
    /// [`Gossip::configure_persistence`] (account-creation flows).
    pub persist: Option<PersistHook>,
}

/// The SDK facade. One instance per device; owns the store handle, the
/// session primitive, and the event bus.
pub struct Gossip {
    core: Arc<Core>,
}

impl Gossip {
    /// Open (or create) the store at `db_path` and build an engine around
    /// it. No hidden globals: the store handle lives here and dies with
    /// the instance.
    pub fn init(
        config: EngineConfig,
        bulletin: Arc<dyn Bulletin>,
        db_path: &Path,
    ) -> Result<Self> {
        let conn = gossip_store::open(db_path)?;
        Ok(Self::from_connection(config, bulletin, conn))
    }

    /// In-memory store; for tests.
    pub fn init_in_memory(config: EngineConfig, bulletin: Arc<dyn Bulletin>) -> Result<Self> {
        let conn = gossip_store::open_memory()?;
        Ok(Self::from_connection(config, bulletin, conn))
    }

    fn from_connection(
        config: EngineConfig,
        bulletin: Arc<dyn Bulletin>,
        conn: rusqlite::Connection,
    ) -> Self {
        Self {
            core: Arc::new(Core {
                config,
                db: tokio::sync::Mutex::new(conn),
                session: tokio::sync::Mutex::new(None),
                bulletin,
                events: EventBus::new(),
                locks: locks::PeerLocks::new(),
                owner: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Register an event handler. Handlers run synchronously inside the
    /// operation that produced the event.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&EngineEvent) + Send + Sync + 'static) {
        self.core.events.on(kind, handler);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Open a session: install the primitive, load or create the profile,
    /// and run crash recovery (legacy transient statuses go back to the
    /// queue with ciphertext cleared).
    pub async fn open_session(&self, options: OpenSessionOptions) -> Result<()> {
        let OpenSessionOptions {
            mut ratchet,
            user_id,
            username,
            encryption_key,
            persist,
        } = options;

        if let (Some(key), Some(hook)) = (encryption_key, persist) {
            ratchet.configure_persistence(key, hook);
        }

        {
            let db = self.core.db.lock().await;
            match profile::get(&db, &user_id) {
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => {
                    profile::upsert(&db, &UserProfile::new(user_id, username))?;
                }
                Err(e) => return Err(e.into()),
            }
            let requeued = messages::reset_transient_statuses(&db, &user_id)?;
            if requeued > 0 {
                tracing::info!("re-queued {requeued} messages from interrupted sends");
            }
        }

        *self.core.session.lock().await = Some(ratchet);
        *self
            .core
            .owner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(user_id);
        tracing::info!(owner = %user_id, "session opened");
        Ok(())
    }

    /// Close the session. Pending store writes complete; the primitive is
    /// dropped after its cleanup pass.
    pub async fn close_session(&self) -> Result<()> {
        let mut session = self.core.session.lock().await;
        if let Some(ratchet) = session.as_mut() {
            ratchet.cleanup();
        }
        *session = None;
        drop(session);
        *self
            .core
            .owner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        tracing::info!("session closed");
        Ok(())
    }

    /// The primitive's encrypted state blob, for export.
    pub async fn encrypted_session(&self, key: &[u8; 32]) -> Result<Vec<u8>> {
        let session = self.core.session.lock().await;
        let ratchet = session.as_ref().ok_or(EngineError::SessionClosed)?;
        Ok(ratchet.to_encrypted_blob(key)?)
    }

    /// Install the persistence key and hook after the session is already
    /// open (account-creation flows). Until this is called, ratchet
    /// advances are not persisted.
    pub async fn configure_persistence(&self, key: [u8; 32], hook: PersistHook) -> Result<()> {
        let mut session = self.core.session.lock().await;
        let ratchet = session.as_mut().ok_or(EngineError::SessionClosed)?;
        ratchet.configure_persistence(key, hook);
        Ok(())
    }

    /// The open session's profile.
    pub async fn profile(&self) -> Result<UserProfile> {
        let owner = self.core.owner()?;
        let db = self.core.db.lock().await;
        Ok(profile::get(&db, &owner)?)
    }

    /// Rename the account.
    pub async fn set_username(&self, username: &str) -> Result<()> {
        let owner = self.core.owner()?;
        let db = self.core.db.lock().await;
        Ok(profile::set_username(&db, &owner, username)?)
    }

    /// Replace the encrypted mnemonic backup metadata.
    pub async fn set_mnemonic_backup(&self, backup: Option<&[u8]>) -> Result<()> {
        let owner = self.core.owner()?;
        let db = self.core.db.lock().await;
        Ok(profile::set_mnemonic_backup(&db, &owner, backup)?)
    }

    /// Override the name shown for one discussion.
    pub async fn set_discussion_name(&self, contact: &UserId, name: Option<&str>) -> Result<()> {
        let owner = self.core.owner()?;
        let db = self.core.db.lock().await;
        Ok(gossip_store::queries::discussions::set_custom_name(
            &db, &owner, contact, name,
        )?)
    }

    // ------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------

    /// Add a contact by id, fetching their public-key bundle from the
    /// bulletin.
    pub async fn add_contact(&self, user_id: UserId, name: &str) -> Result<Contact> {
        let owner = self.core.owner()?;
        if user_id == owner {
            return Err(EngineError::Validation {
                reason: "cannot add yourself as a contact".into(),
            });
        }
        {
            let db = self.core.db.lock().await;
            if contacts::get(&db, &owner, &user_id)?.is_some() {
                return Err(EngineError::Validation {
                    reason: format!("contact {user_id} already exists"),
                });
            }
        }

        let public_keys = match self
            .core
            .with_transport_timeout(self.core.bulletin.fetch_public_key(&user_id))
            .await
        {
            Ok(bundle) => bundle,
            Err(TransportError::NotFound) => {
                return Err(EngineError::PublicKeyNotFound(user_id))
            }
            Err(e) => return Err(e.into()),
        };

        let contact = Contact {
            owner,
            user_id,
            name: name.to_string(),
            public_keys,
            is_online: false,
            last_seen: None,
        };
        {
            let db = self.core.db.lock().await;
            contacts::insert(&db, &contact)?;
        }
        tracing::info!(contact = %user_id, "contact added");
        Ok(contact)
    }

    /// Remove a contact; cascades to the discussion and messages, and
    /// tells the primitive to forget the peer.
    pub async fn remove_contact(&self, user_id: &UserId) -> Result<()> {
        let owner = self.core.owner()?;
        {
            let db = self.core.db.lock().await;
            contacts::remove(&db, &owner, user_id)?;
        }
        {
            let mut session = self.core.session.lock().await;
            let ratchet = session.as_mut().ok_or(EngineError::SessionClosed)?;
            ratchet.peer_discard(user_id);
        }
        tracing::info!(contact = %user_id, "contact removed");
        Ok(())
    }

    /// All contacts, sorted by name.
    pub async fn contacts(&self) -> Result<Vec<Contact>> {
        let owner = self.core.owner()?;
        let db = self.core.db.lock().await;
        Ok(contacts::list(&db, &owner)?)
    }

    // ------------------------------------------------------------------
    // Discussions
    // ------------------------------------------------------------------

    /// All discussions, most recent activity first.
    pub async fn discussions(&self) -> Result<Vec<Discussion>> {
        let owner = self.core.owner()?;
        let db = self.core.db.lock().await;
        Ok(gossip_store::queries::discussions::list(&db, &owner)?)
    }

    /// Start a discussion with a contact, optionally carrying a username
    /// override and a free-text blurb in the announcement.
    pub async fn start_discussion(
        &self,
        contact: &UserId,
        username: Option<String>,
        message: Option<String>,
    ) -> Result<()> {
        discussions::start(&self.core, contact, username, message).await
    }

    /// Accept a received discussion request.
    pub async fn accept_discussion(&self, contact: &UserId) -> Result<()> {
        discussions::accept(&self.core, contact).await
    }

    /// Renew the session with a peer: fresh announcement, queued messages
    /// re-encrypted under the new session once it activates.
    pub async fn renew_session(&self, contact: &UserId) -> Result<()> {
        discussions::renew(&self.core, contact).await
    }

    /// Derived status of the pair's discussion.
    pub async fn discussion_status(&self, contact: &UserId) -> Result<DiscussionStatus> {
        discussions::status(&self.core, contact).await
    }

    /// The crypto primitive's session status for the peer, verbatim.
    pub async fn session_status(
        &self,
        contact: &UserId,
    ) -> Result<gossip_session::PeerSessionStatus> {
        discussions::session_status(&self.core, contact).await
    }

    /// Whether nothing is stuck: the session is live (or being set up by
    /// us) and no outgoing message is parked without a path forward.
    pub async fn is_discussion_stable(&self, contact: &UserId) -> Result<bool> {
        discussions::is_stable(&self.core, contact).await
    }

    /// The user opened the discussion: incoming messages become READ and
    /// the unread counter zeroes.
    pub async fn mark_read(&self, contact: &UserId) -> Result<()> {
        let owner = self.core.owner()?;
        let db = self.core.db.lock().await;
        messages::mark_discussion_read(&db, &owner, contact)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Enqueue a text message; returns the store row id.
    pub async fn send_text(&self, contact: &UserId, content: &str) -> Result<i64> {
        outbox::enqueue(&self.core, contact, MessageKind::Text, content, None, None).await
    }

    /// Enqueue a reply to a previously exchanged message.
    pub async fn send_reply(
        &self,
        contact: &UserId,
        content: &str,
        reply_to: MessageId,
    ) -> Result<i64> {
        outbox::enqueue(
            &self.core,
            contact,
            MessageKind::Text,
            content,
            Some(reply_to),
            None,
        )
        .await
    }

    /// Enqueue a forward of a previously exchanged message.
    pub async fn send_forward(
        &self,
        contact: &UserId,
        content: &str,
        forward_of: MessageId,
    ) -> Result<i64> {
        outbox::enqueue(
            &self.core,
            contact,
            MessageKind::Text,
            content,
            None,
            Some(forward_of),
        )
        .await
    }

    /// All messages of a pair, oldest first.
    pub async fn messages_with(&self, contact: &UserId) -> Result<Vec<Message>> {
        let owner = self.core.owner()?;
        let db = self.core.db.lock().await;
        Ok(messages::list_for_pair(&db, &owner, contact)?)
    }

    // ------------------------------------------------------------------
    // Sync & driving
    // ------------------------------------------------------------------

    /// One full cycle: fetch and classify announcements, fetch and decrypt
    /// inbound messages, then run the refresh driver (keep-alives, queue
    /// runs, retries).
    pub async fn sync(&self) -> Result<()> {
        announcements::fetch_and_process(&self.core).await?;
        inbox::fetch_and_process(&self.core).await?;
        refresh::state_update(&self.core).await?;
        Ok(())
    }

    /// Run only the refresh driver; called after state-changing
    /// operations.
    pub async fn state_update(&self) -> Result<()> {
        refresh::state_update(&self.core).await
    }

    /// Run only the inbound pipeline.
    pub async fn fetch_messages(&self) -> Result<usize> {
        inbox::fetch_and_process(&self.core).await
    }

    /// Run only the announcement fetch.
    pub async fn fetch_announcements(&self) -> Result<usize> {
        announcements::fetch_and_process(&self.core).await
    }

    /// Publish our public-key bundle and record the push time.
    pub async fn push_public_key(&self, bundle: &[u8]) -> Result<String> {
        let owner = self.core.owner()?;
        let hash = self
            .core
            .with_transport_timeout(self.core.bulletin.post_public_key(bundle))
            .await
            .map_err(EngineError::from)?;
        {
            let db = self.core.db.lock().await;
            profile::set_last_public_key_push(&db, &owner, now_millis())?;
        }
        Ok(hash)
    }

    /// Point the transport at a different bulletin node.
    pub async fn change_node(&self, url: &str) -> Result<()> {
        self.core
            .with_transport_timeout(self.core.bulletin.change_node(url))
            .await
            .map_err(EngineError::from)
    }

    /// Background loop: run [`sync`](Self::sync) on the configured
    /// interval until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.core.config.refresh_interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.core.owner().is_err() {
                        continue;
                    }
                    if let Err(e) = self.sync().await {
                        tracing::warn!("background sync failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("engine loop shutting down");
                    break;
                }
            }
        }
    }
}
