//! Buffers for inbound items the crypto primitive could not yet decrypt:
//! out-of-order ciphertexts and announcements from unknown senders or
//! unreached ratchet steps. Retained until decrypt succeeds or TTL expiry.

use gossip_types::{PendingAnnouncement, PendingCiphertext, Seeker};
use rusqlite::Connection;

use crate::queries::{col_seeker_opt, col_u64};
use crate::Result;

/// Park a ciphertext; a repeat of the same seeker is ignored.
pub fn ciphertext_insert_if_absent(
    conn: &Connection,
    seeker: &Seeker,
    ciphertext: &[u8],
    fetched_at: u64,
) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO pending_ciphertexts (seeker, ciphertext, fetched_at)
         VALUES (?1, ?2, ?3)",
        rusqlite::params![seeker.as_bytes().as_slice(), ciphertext, fetched_at as i64],
    )?;
    Ok(n > 0)
}

/// All parked ciphertexts, oldest first.
pub fn ciphertext_list(conn: &Connection) -> Result<Vec<PendingCiphertext>> {
    let mut stmt = conn.prepare(
        "SELECT seeker, ciphertext, fetched_at FROM pending_ciphertexts
         ORDER BY fetched_at ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let seeker = col_seeker_opt(row, 0)?.ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(0, "seeker".into(), rusqlite::types::Type::Null)
            })?;
            Ok(PendingCiphertext {
                seeker,
                ciphertext: row.get(1)?,
                fetched_at: col_u64(row, 2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Drop a parked ciphertext after a successful decrypt.
pub fn ciphertext_remove(conn: &Connection, seeker: &Seeker) -> Result<()> {
    conn.execute(
        "DELETE FROM pending_ciphertexts WHERE seeker = ?1",
        [seeker.as_bytes().as_slice()],
    )?;
    Ok(())
}

/// Drop parked ciphertexts fetched before the cutoff. Returns the count.
pub fn ciphertext_expire_before(conn: &Connection, cutoff: u64) -> Result<usize> {
    let n = conn.execute(
        "DELETE FROM pending_ciphertexts WHERE fetched_at < ?1",
        [cutoff as i64],
    )?;
    Ok(n)
}

/// Park an announcement; a repeat of the same counter is ignored.
pub fn announcement_insert_if_absent(
    conn: &Connection,
    counter: u64,
    data: &[u8],
    fetched_at: u64,
) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO pending_announcements (counter, data, fetched_at)
         VALUES (?1, ?2, ?3)",
        rusqlite::params![counter as i64, data, fetched_at as i64],
    )?;
    Ok(n > 0)
}

/// All parked announcements, board order.
pub fn announcement_list(conn: &Connection) -> Result<Vec<PendingAnnouncement>> {
    let mut stmt = conn.prepare(
        "SELECT counter, data, fetched_at FROM pending_announcements
         ORDER BY counter ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PendingAnnouncement {
                counter: col_u64(row, 0)?,
                data: row.get(1)?,
                fetched_at: col_u64(row, 2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Drop a parked announcement once processed.
pub fn announcement_remove(conn: &Connection, counter: u64) -> Result<()> {
    conn.execute(
        "DELETE FROM pending_announcements WHERE counter = ?1",
        [counter as i64],
    )?;
    Ok(())
}

/// Drop parked announcements fetched before the cutoff. Returns the count.
pub fn announcement_expire_before(conn: &Connection, cutoff: u64) -> Result<usize> {
    let n = conn.execute(
        "DELETE FROM pending_announcements WHERE fetched_at < ?1",
        [cutoff as i64],
    )?;
    Ok(n)
}
