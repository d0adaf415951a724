//! Contact queries.

use gossip_types::{Contact, UserId};
use rusqlite::{Connection, Row};

use crate::queries::{col_u64_opt, col_user_id};
use crate::Result;

fn map_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        owner: col_user_id(row, 0)?,
        user_id: col_user_id(row, 1)?,
        name: row.get(2)?,
        public_keys: row.get(3)?,
        is_online: row.get(4)?,
        last_seen: col_u64_opt(row, 5)?,
    })
}

const COLUMNS: &str = "owner, user_id, name, public_keys, is_online, last_seen";

/// Insert a new contact.
pub fn insert(conn: &Connection, contact: &Contact) -> Result<()> {
    conn.execute(
        "INSERT INTO contacts (owner, user_id, name, public_keys, is_online, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            contact.owner.as_bytes().as_slice(),
            contact.user_id.as_bytes().as_slice(),
            contact.name,
            contact.public_keys,
            contact.is_online,
            contact.last_seen.map(|v| v as i64),
        ],
    )?;
    Ok(())
}

/// Get a contact, if present.
pub fn get(conn: &Connection, owner: &UserId, user_id: &UserId) -> Result<Option<Contact>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM contacts WHERE owner = ?1 AND user_id = ?2"
    ))?;
    let mut rows = stmt.query_map(
        rusqlite::params![owner.as_bytes().as_slice(), user_id.as_bytes().as_slice()],
        map_row,
    )?;
    rows.next().transpose().map_err(Into::into)
}

/// List all contacts for an owner, sorted by display name.
pub fn list(conn: &Connection, owner: &UserId) -> Result<Vec<Contact>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM contacts WHERE owner = ?1 ORDER BY name"
    ))?;
    let rows = stmt
        .query_map([owner.as_bytes().as_slice()], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Number of contacts for an owner; used to number auto-named requests.
pub fn count(conn: &Connection, owner: &UserId) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM contacts WHERE owner = ?1",
        [owner.as_bytes().as_slice()],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Rename a contact.
pub fn rename(conn: &Connection, owner: &UserId, user_id: &UserId, name: &str) -> Result<()> {
    conn.execute(
        "UPDATE contacts SET name = ?3 WHERE owner = ?1 AND user_id = ?2",
        rusqlite::params![
            owner.as_bytes().as_slice(),
            user_id.as_bytes().as_slice(),
            name
        ],
    )?;
    Ok(())
}

/// Update presence.
pub fn set_presence(
    conn: &Connection,
    owner: &UserId,
    user_id: &UserId,
    is_online: bool,
    last_seen: Option<u64>,
) -> Result<()> {
    conn.execute(
        "UPDATE contacts SET is_online = ?3, last_seen = ?4
         WHERE owner = ?1 AND user_id = ?2",
        rusqlite::params![
            owner.as_bytes().as_slice(),
            user_id.as_bytes().as_slice(),
            is_online,
            last_seen.map(|v| v as i64),
        ],
    )?;
    Ok(())
}

/// Remove a contact and everything owned by the pair: the discussion and
/// every message. One transaction; partial deletes are never observable.
pub fn remove(conn: &Connection, owner: &UserId, user_id: &UserId) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM messages WHERE owner = ?1 AND contact = ?2",
        rusqlite::params![owner.as_bytes().as_slice(), user_id.as_bytes().as_slice()],
    )?;
    tx.execute(
        "DELETE FROM discussions WHERE owner = ?1 AND contact = ?2",
        rusqlite::params![owner.as_bytes().as_slice(), user_id.as_bytes().as_slice()],
    )?;
    tx.execute(
        "DELETE FROM contacts WHERE owner = ?1 AND user_id = ?2",
        rusqlite::params![owner.as_bytes().as_slice(), user_id.as_bytes().as_slice()],
    )?;
    tx.commit()?;
    Ok(())
}
