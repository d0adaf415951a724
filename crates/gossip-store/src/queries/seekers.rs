//! Active-seeker snapshot: the union of all read-seekers the crypto
//! primitive currently instructs us to monitor. Replaced atomically after
//! each primitive state change; membership is the sole ACK signal.

use std::collections::HashSet;

use gossip_types::{Seeker, UserId};
use rusqlite::Connection;

use crate::queries::col_seeker_opt;
use crate::Result;

/// Atomic truncate + insert of the owner's snapshot.
pub fn replace_all(conn: &Connection, owner: &UserId, seekers: &HashSet<Seeker>) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM active_seekers WHERE owner = ?1",
        [owner.as_bytes().as_slice()],
    )?;
    {
        let mut stmt =
            tx.prepare("INSERT INTO active_seekers (owner, seeker) VALUES (?1, ?2)")?;
        for seeker in seekers {
            stmt.execute(rusqlite::params![
                owner.as_bytes().as_slice(),
                seeker.as_bytes().as_slice()
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// The stored snapshot.
pub fn list(conn: &Connection, owner: &UserId) -> Result<HashSet<Seeker>> {
    let mut stmt = conn.prepare("SELECT seeker FROM active_seekers WHERE owner = ?1")?;
    let rows = stmt
        .query_map([owner.as_bytes().as_slice()], |row| {
            col_seeker_opt(row, 0)?.ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(0, "seeker".into(), rusqlite::types::Type::Null)
            })
        })?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(rows)
}
