//! Message queries: the send queue, the status machine writes, dedup
//! lookups, and the acknowledgement sweep.

use std::collections::HashSet;

use gossip_types::{
    Message, MessageDirection, MessageId, MessageKind, MessageStatus, Seeker, UserId,
};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};

use crate::queries::{col_seeker_opt, col_u64, col_u64_opt, col_user_id, EnumParseError};
use crate::Result;

const COLUMNS: &str = "id, owner, contact, content, message_id, kind, direction, status, \
     seeker, ciphertext, when_to_send, reply_to, forward_of, serialized, created_at";

fn parse_enum<T>(
    idx: usize,
    raw: String,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(EnumParseError(raw)))
    })
}

fn col_message_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<MessageId> {
    let bytes: Vec<u8> = row.get(idx)?;
    MessageId::from_slice(&bytes)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e)))
}

fn col_message_id_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<MessageId>> {
    let bytes: Option<Vec<u8>> = row.get(idx)?;
    bytes
        .map(|b| {
            MessageId::from_slice(&b).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e))
            })
        })
        .transpose()
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        owner: col_user_id(row, 1)?,
        contact: col_user_id(row, 2)?,
        content: row.get(3)?,
        message_id: col_message_id(row, 4)?,
        kind: parse_enum(5, row.get(5)?, MessageKind::parse)?,
        direction: parse_enum(6, row.get(6)?, MessageDirection::parse)?,
        status: parse_enum(7, row.get(7)?, MessageStatus::parse)?,
        seeker: col_seeker_opt(row, 8)?,
        ciphertext: row.get(9)?,
        when_to_send: col_u64_opt(row, 10)?,
        reply_to: col_message_id_opt(row, 11)?,
        forward_of: col_message_id_opt(row, 12)?,
        serialized: row.get(13)?,
        created_at: col_u64(row, 14)?,
    })
}

/// Insert a message and atomically update the owning discussion's preview
/// fields (and unread count for incoming rows). Keep-alives never touch
/// the discussion. Returns the new row id. The `id` field of the argument
/// is ignored.
pub fn add(conn: &Connection, m: &Message) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO messages
             (owner, contact, content, message_id, kind, direction, status,
              seeker, ciphertext, when_to_send, reply_to, forward_of,
              serialized, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        rusqlite::params![
            m.owner.as_bytes().as_slice(),
            m.contact.as_bytes().as_slice(),
            m.content,
            m.message_id.as_bytes().as_slice(),
            m.kind.as_str(),
            m.direction.as_str(),
            m.status.as_str(),
            m.seeker.as_ref().map(|s| s.as_bytes().as_slice()),
            m.ciphertext,
            m.when_to_send.map(|v| v as i64),
            m.reply_to.as_ref().map(|r| r.as_bytes().as_slice()),
            m.forward_of.as_ref().map(|r| r.as_bytes().as_slice()),
            m.serialized,
            m.created_at as i64,
        ],
    )?;
    let id = tx.last_insert_rowid();

    if m.kind != MessageKind::KeepAlive {
        let unread_bump = i64::from(m.direction == MessageDirection::Incoming);
        tx.execute(
            "UPDATE discussions SET
                 last_message_id = ?3,
                 last_message_content = ?4,
                 last_message_at = ?5,
                 unread_count = unread_count + ?6
             WHERE owner = ?1 AND contact = ?2",
            rusqlite::params![
                m.owner.as_bytes().as_slice(),
                m.contact.as_bytes().as_slice(),
                id,
                m.content,
                m.created_at as i64,
                unread_bump,
            ],
        )?;
    }

    tx.commit()?;
    Ok(id)
}

/// Get a message by row id.
pub fn get(conn: &Connection, id: i64) -> Result<Option<Message>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"))?;
    let mut rows = stmt.query_map([id], map_row)?;
    rows.next().transpose().map_err(Into::into)
}

/// Messages of a pair, oldest first.
pub fn list_for_pair(conn: &Connection, owner: &UserId, contact: &UserId) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM messages
         WHERE owner = ?1 AND contact = ?2
         ORDER BY created_at ASC, id ASC"
    ))?;
    let rows = stmt
        .query_map(
            rusqlite::params![owner.as_bytes().as_slice(), contact.as_bytes().as_slice()],
            map_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The outbound FIFO for one peer: outgoing rows still waiting on a
/// session or on the network, oldest first.
pub fn send_queue(conn: &Connection, owner: &UserId, contact: &UserId) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM messages
         WHERE owner = ?1 AND contact = ?2 AND direction = 'outgoing'
           AND status IN ('waiting_session', 'ready')
         ORDER BY created_at ASC, id ASC"
    ))?;
    let rows = stmt
        .query_map(
            rusqlite::params![owner.as_bytes().as_slice(), contact.as_bytes().as_slice()],
            map_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Peers that currently have queued outbound traffic.
pub fn peers_with_unsent(conn: &Connection, owner: &UserId) -> Result<Vec<UserId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT contact FROM messages
         WHERE owner = ?1 AND direction = 'outgoing'
           AND status IN ('waiting_session', 'ready')",
    )?;
    let rows = stmt
        .query_map([owner.as_bytes().as_slice()], |row| col_user_id(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Whether a peer has queued outbound traffic.
pub fn has_unsent_to(conn: &Connection, owner: &UserId, contact: &UserId) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages
         WHERE owner = ?1 AND contact = ?2 AND direction = 'outgoing'
           AND status IN ('waiting_session', 'ready')",
        rusqlite::params![owner.as_bytes().as_slice(), contact.as_bytes().as_slice()],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

/// WaitingSession → Ready: ciphertext materialised and persisted.
pub fn set_ready(
    conn: &Connection,
    id: i64,
    seeker: &Seeker,
    ciphertext: &[u8],
    when_to_send: u64,
) -> Result<()> {
    conn.execute(
        "UPDATE messages SET status = 'ready', seeker = ?2, ciphertext = ?3, when_to_send = ?4
         WHERE id = ?1",
        rusqlite::params![id, seeker.as_bytes().as_slice(), ciphertext, when_to_send as i64],
    )?;
    Ok(())
}

/// Ready → Sent: the bulletin accepted the payload; the ciphertext and the
/// cached wire payload are dropped, only the seeker is retained.
pub fn set_sent(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE messages SET status = 'sent', ciphertext = NULL, serialized = NULL
         WHERE id = ?1",
        [id],
    )?;
    Ok(())
}

/// Push the retry gate forward after a transport failure.
pub fn bump_retry(conn: &Connection, id: i64, when_to_send: u64) -> Result<()> {
    conn.execute(
        "UPDATE messages SET when_to_send = ?2 WHERE id = ?1",
        rusqlite::params![id, when_to_send as i64],
    )?;
    Ok(())
}

/// Session renewal: every outgoing row that had materialised state goes
/// back to WaitingSession with seeker, ciphertext, retry gate, and cached
/// payload cleared. Delivered and Read rows are never reset.
pub fn reset_for_renewal(conn: &Connection, owner: &UserId, contact: &UserId) -> Result<usize> {
    let n = conn.execute(
        "UPDATE messages SET status = 'waiting_session', seeker = NULL,
                ciphertext = NULL, when_to_send = NULL, serialized = NULL
         WHERE owner = ?1 AND contact = ?2 AND direction = 'outgoing'
           AND status IN ('ready', 'sent', 'sending', 'failed')",
        rusqlite::params![owner.as_bytes().as_slice(), contact.as_bytes().as_slice()],
    )?;
    Ok(n)
}

/// Crash recovery on session open: rows persisted under the legacy
/// transient statuses are re-queued from plaintext.
pub fn reset_transient_statuses(conn: &Connection, owner: &UserId) -> Result<usize> {
    let n = conn.execute(
        "UPDATE messages SET status = 'waiting_session', seeker = NULL,
                ciphertext = NULL, when_to_send = NULL, serialized = NULL
         WHERE owner = ?1 AND direction = 'outgoing'
           AND status IN ('sending', 'failed')",
        [owner.as_bytes().as_slice()],
    )?;
    Ok(n)
}

/// The acknowledgement sweep: Sent rows whose seeker left the active set
/// become Delivered, dropping the seeker. Scoped to one peer when
/// `contact` is given. Returns the row ids that transitioned.
pub fn deliver_acked(
    conn: &Connection,
    owner: &UserId,
    contact: Option<&UserId>,
    active: &HashSet<Seeker>,
) -> Result<Vec<i64>> {
    let tx = conn.unchecked_transaction()?;
    let mut delivered = Vec::new();
    {
        let mut stmt = tx.prepare(
            "SELECT id, seeker, contact FROM messages
             WHERE owner = ?1 AND direction = 'outgoing' AND status = 'sent'
               AND seeker IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([owner.as_bytes().as_slice()], |row| {
                Ok((row.get::<_, i64>(0)?, col_seeker_opt(row, 1)?, col_user_id(row, 2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (id, seeker, peer) in rows {
            if let Some(scope) = contact {
                if peer != *scope {
                    continue;
                }
            }
            match seeker {
                Some(s) if !active.contains(&s) => delivered.push(id),
                _ => {}
            }
        }
    }
    for id in &delivered {
        tx.execute(
            "UPDATE messages SET status = 'delivered', seeker = NULL WHERE id = ?1",
            [id],
        )?;
    }
    tx.commit()?;
    Ok(delivered)
}

/// Opening a discussion: incoming Delivered rows become Read and the
/// unread counter zeroes, in one transaction.
pub fn mark_discussion_read(conn: &Connection, owner: &UserId, contact: &UserId) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let n = tx.execute(
        "UPDATE messages SET status = 'read'
         WHERE owner = ?1 AND contact = ?2 AND direction = 'incoming'
           AND status = 'delivered'",
        rusqlite::params![owner.as_bytes().as_slice(), contact.as_bytes().as_slice()],
    )?;
    tx.execute(
        "UPDATE discussions SET unread_count = 0 WHERE owner = ?1 AND contact = ?2",
        rusqlite::params![owner.as_bytes().as_slice(), contact.as_bytes().as_slice()],
    )?;
    tx.commit()?;
    Ok(n)
}

/// Seekers attached to outgoing rows; the inbound fetch skips them since
/// whatever the board holds there is our own upload.
pub fn outgoing_seekers(conn: &Connection, owner: &UserId) -> Result<HashSet<Seeker>> {
    let mut stmt = conn.prepare(
        "SELECT seeker FROM messages
         WHERE owner = ?1 AND direction = 'outgoing' AND seeker IS NOT NULL",
    )?;
    let rows = stmt
        .query_map([owner.as_bytes().as_slice()], |row| col_seeker_opt(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().flatten().collect())
}

/// Dedup lookup by on-wire id, scoped strictly to one pair.
pub fn find_incoming_by_wire_id(
    conn: &Connection,
    owner: &UserId,
    contact: &UserId,
    message_id: &MessageId,
) -> Result<Option<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM messages
         WHERE owner = ?1 AND contact = ?2 AND direction = 'incoming'
           AND message_id = ?3"
    ))?;
    let mut rows = stmt.query_map(
        rusqlite::params![
            owner.as_bytes().as_slice(),
            contact.as_bytes().as_slice(),
            message_id.as_bytes().as_slice(),
        ],
        map_row,
    )?;
    rows.next().transpose().map_err(Into::into)
}

/// Legacy dedup fallback: same content within the window, same pair.
pub fn find_incoming_by_content_within(
    conn: &Connection,
    owner: &UserId,
    contact: &UserId,
    content: &str,
    window_ms: u64,
    now: u64,
) -> Result<Option<Message>> {
    let floor = now.saturating_sub(window_ms);
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM messages
         WHERE owner = ?1 AND contact = ?2 AND direction = 'incoming'
           AND content = ?3 AND created_at >= ?4"
    ))?;
    let mut rows = stmt.query_map(
        rusqlite::params![
            owner.as_bytes().as_slice(),
            contact.as_bytes().as_slice(),
            content,
            floor as i64,
        ],
        map_row,
    )?;
    rows.next().transpose().map_err(Into::into)
}

/// Count of incoming rows still unread for a pair (invariant checks).
pub fn count_incoming_delivered(conn: &Connection, owner: &UserId, contact: &UserId) -> Result<u32> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages
         WHERE owner = ?1 AND contact = ?2 AND direction = 'incoming'
           AND status = 'delivered'",
        rusqlite::params![owner.as_bytes().as_slice(), contact.as_bytes().as_slice()],
        |row| row.get(0),
    )?;
    Ok(n as u32)
}
