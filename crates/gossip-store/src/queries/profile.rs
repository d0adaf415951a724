//! User profile queries.

use gossip_types::{UserId, UserProfile};
use rusqlite::Connection;

use crate::queries::{col_u64_opt, col_user_id};
use crate::{Result, StoreError};

/// Insert or replace the profile row.
pub fn upsert(conn: &Connection, profile: &UserProfile) -> Result<()> {
    conn.execute(
        "INSERT INTO user_profile
             (user_id, username, mnemonic_backup, last_bulletin_counter, last_public_key_push)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
             username = excluded.username,
             mnemonic_backup = excluded.mnemonic_backup,
             last_bulletin_counter = excluded.last_bulletin_counter,
             last_public_key_push = excluded.last_public_key_push",
        rusqlite::params![
            profile.user_id.as_bytes().as_slice(),
            profile.username,
            profile.mnemonic_backup,
            profile.last_bulletin_counter.map(|v| v as i64),
            profile.last_public_key_push.map(|v| v as i64),
        ],
    )?;
    Ok(())
}

/// Get the profile for an owner. The profile must exist once a session is
/// open.
pub fn get(conn: &Connection, owner: &UserId) -> Result<UserProfile> {
    conn.query_row(
        "SELECT user_id, username, mnemonic_backup, last_bulletin_counter, last_public_key_push
         FROM user_profile WHERE user_id = ?1",
        [owner.as_bytes().as_slice()],
        |row| {
            Ok(UserProfile {
                user_id: col_user_id(row, 0)?,
                username: row.get(1)?,
                mnemonic_backup: row.get(2)?,
                last_bulletin_counter: col_u64_opt(row, 3)?,
                last_public_key_push: col_u64_opt(row, 4)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("profile".into()),
        other => StoreError::Sqlite(other),
    })
}

/// Advance the announcement board cursor.
pub fn set_last_bulletin_counter(conn: &Connection, owner: &UserId, counter: u64) -> Result<()> {
    conn.execute(
        "UPDATE user_profile SET last_bulletin_counter = ?2 WHERE user_id = ?1",
        rusqlite::params![owner.as_bytes().as_slice(), counter as i64],
    )?;
    Ok(())
}

/// Record a successful public-key republish.
pub fn set_last_public_key_push(conn: &Connection, owner: &UserId, at: u64) -> Result<()> {
    conn.execute(
        "UPDATE user_profile SET last_public_key_push = ?2 WHERE user_id = ?1",
        rusqlite::params![owner.as_bytes().as_slice(), at as i64],
    )?;
    Ok(())
}

/// Replace the encrypted mnemonic backup metadata.
pub fn set_mnemonic_backup(
    conn: &Connection,
    owner: &UserId,
    backup: Option<&[u8]>,
) -> Result<()> {
    conn.execute(
        "UPDATE user_profile SET mnemonic_backup = ?2 WHERE user_id = ?1",
        rusqlite::params![owner.as_bytes().as_slice(), backup],
    )?;
    Ok(())
}

/// Rename the account.
pub fn set_username(conn: &Connection, owner: &UserId, username: &str) -> Result<()> {
    conn.execute(
        "UPDATE user_profile SET username = ?2 WHERE user_id = ?1",
        rusqlite::params![owner.as_bytes().as_slice(), username],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_get() {
        let conn = crate::open_memory().expect("open");
        let owner = UserId::from_bytes([1; 32]);
        upsert(&conn, &UserProfile::new(owner, "alice")).expect("upsert");

        let profile = get(&conn, &owner).expect("get");
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.last_bulletin_counter, None);
    }

    #[test]
    fn test_cursor_advance() {
        let conn = crate::open_memory().expect("open");
        let owner = UserId::from_bytes([1; 32]);
        upsert(&conn, &UserProfile::new(owner, "alice")).expect("upsert");

        set_last_bulletin_counter(&conn, &owner, 42).expect("set");
        assert_eq!(
            get(&conn, &owner).expect("get").last_bulletin_counter,
            Some(42)
        );
    }

    #[test]
    fn test_missing_profile_is_not_found() {
        let conn = crate::open_memory().expect("open");
        let result = get(&conn, &UserId::from_bytes([9; 32]));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
