//! SQL schema definitions.

/// Complete schema for the v1 store.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Profile
-- ============================================================

CREATE TABLE IF NOT EXISTS user_profile (
    user_id BLOB PRIMARY KEY,
    username TEXT NOT NULL,
    mnemonic_backup BLOB,
    last_bulletin_counter INTEGER,
    last_public_key_push INTEGER
);

-- ============================================================
-- Contacts & Discussions
-- ============================================================

CREATE TABLE IF NOT EXISTS contacts (
    owner BLOB NOT NULL,
    user_id BLOB NOT NULL,
    name TEXT NOT NULL,
    public_keys BLOB NOT NULL,
    is_online INTEGER NOT NULL DEFAULT 0,
    last_seen INTEGER,
    PRIMARY KEY (owner, user_id)
);

CREATE TABLE IF NOT EXISTS discussions (
    owner BLOB NOT NULL,
    contact BLOB NOT NULL,
    direction TEXT NOT NULL,
    we_accepted INTEGER NOT NULL DEFAULT 0,
    was_active INTEGER NOT NULL DEFAULT 0,
    send_announcement BLOB,
    send_announcement_at INTEGER,
    last_sync_at INTEGER,
    last_message_id INTEGER,
    last_message_content TEXT,
    last_message_at INTEGER,
    unread_count INTEGER NOT NULL DEFAULT 0 CHECK (unread_count >= 0),
    custom_name TEXT,
    last_announcement_message TEXT,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (owner, contact)
);

CREATE INDEX IF NOT EXISTS idx_discussions_recent
    ON discussions(owner, last_message_at DESC);

-- ============================================================
-- Messages
-- ============================================================

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner BLOB NOT NULL,
    contact BLOB NOT NULL,
    content TEXT NOT NULL,
    message_id BLOB NOT NULL,
    kind TEXT NOT NULL,
    direction TEXT NOT NULL,
    status TEXT NOT NULL,
    seeker BLOB,
    ciphertext BLOB,
    when_to_send INTEGER,
    reply_to BLOB,
    forward_of BLOB,
    serialized BLOB,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages(owner, contact, created_at);
CREATE INDEX IF NOT EXISTS idx_messages_status ON messages(owner, status);
CREATE INDEX IF NOT EXISTS idx_messages_seeker ON messages(owner, seeker);
CREATE INDEX IF NOT EXISTS idx_messages_wire_id ON messages(owner, contact, message_id);

-- ============================================================
-- Inbound buffers & seeker snapshot
-- ============================================================

CREATE TABLE IF NOT EXISTS pending_ciphertexts (
    seeker BLOB PRIMARY KEY,
    ciphertext BLOB NOT NULL,
    fetched_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS pending_announcements (
    counter INTEGER PRIMARY KEY,
    data BLOB NOT NULL,
    fetched_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS active_seekers (
    owner BLOB NOT NULL,
    seeker BLOB NOT NULL,
    PRIMARY KEY (owner, seeker)
);
"#;
