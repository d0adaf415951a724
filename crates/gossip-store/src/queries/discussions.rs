//! Discussion queries.

use gossip_types::{Discussion, DiscussionDirection, PendingSend, UserId};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};

use crate::queries::{col_u64, col_u64_opt, col_user_id, EnumParseError};
use crate::Result;

const COLUMNS: &str = "owner, contact, direction, we_accepted, was_active, \
     send_announcement, send_announcement_at, last_sync_at, last_message_id, \
     last_message_content, last_message_at, unread_count, custom_name, \
     last_announcement_message, created_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Discussion> {
    let direction: String = row.get(2)?;
    let direction = DiscussionDirection::parse(&direction).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(EnumParseError(direction)))
    })?;
    let data: Option<Vec<u8>> = row.get(5)?;
    let when: Option<u64> = col_u64_opt(row, 6)?;
    let send_announcement = match (data, when) {
        (Some(data), Some(when_to_send)) => Some(PendingSend { data, when_to_send }),
        _ => None,
    };
    Ok(Discussion {
        owner: col_user_id(row, 0)?,
        contact: col_user_id(row, 1)?,
        direction,
        we_accepted: row.get(3)?,
        was_active: row.get(4)?,
        send_announcement,
        last_sync_at: col_u64_opt(row, 7)?,
        last_message_id: row.get(8)?,
        last_message_content: row.get(9)?,
        last_message_at: col_u64_opt(row, 10)?,
        unread_count: row.get::<_, i64>(11)? as u32,
        custom_name: row.get(12)?,
        last_announcement_message: row.get(13)?,
        created_at: col_u64(row, 14)?,
    })
}

/// Insert a new discussion. Fails if the pair already has one.
pub fn insert(conn: &Connection, d: &Discussion) -> Result<()> {
    conn.execute(
        "INSERT INTO discussions
             (owner, contact, direction, we_accepted, was_active,
              send_announcement, send_announcement_at, last_sync_at,
              last_message_id, last_message_content, last_message_at,
              unread_count, custom_name, last_announcement_message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        rusqlite::params![
            d.owner.as_bytes().as_slice(),
            d.contact.as_bytes().as_slice(),
            d.direction.as_str(),
            d.we_accepted,
            d.was_active,
            d.send_announcement.as_ref().map(|p| p.data.as_slice()),
            d.send_announcement.as_ref().map(|p| p.when_to_send as i64),
            d.last_sync_at.map(|v| v as i64),
            d.last_message_id,
            d.last_message_content,
            d.last_message_at.map(|v| v as i64),
            d.unread_count as i64,
            d.custom_name,
            d.last_announcement_message,
            d.created_at as i64,
        ],
    )?;
    Ok(())
}

/// Get the pair's discussion, if present.
pub fn get(conn: &Connection, owner: &UserId, contact: &UserId) -> Result<Option<Discussion>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM discussions WHERE owner = ?1 AND contact = ?2"
    ))?;
    let mut rows = stmt.query_map(
        rusqlite::params![owner.as_bytes().as_slice(), contact.as_bytes().as_slice()],
        map_row,
    )?;
    rows.next().transpose().map_err(Into::into)
}

/// List discussions, most recent message first; discussions that never
/// carried a message sort last, ties broken by newest row first.
pub fn list(conn: &Connection, owner: &UserId) -> Result<Vec<Discussion>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM discussions WHERE owner = ?1
         ORDER BY last_message_at IS NULL, last_message_at DESC, created_at DESC"
    ))?;
    let rows = stmt
        .query_map([owner.as_bytes().as_slice()], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Discussions with an announcement armed for (re)publication.
pub fn list_armed(conn: &Connection, owner: &UserId) -> Result<Vec<Discussion>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM discussions
         WHERE owner = ?1 AND send_announcement IS NOT NULL"
    ))?;
    let rows = stmt
        .query_map([owner.as_bytes().as_slice()], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Arm or clear the pending announcement. `None` clears the retry.
pub fn set_send_announcement(
    conn: &Connection,
    owner: &UserId,
    contact: &UserId,
    pending: Option<&PendingSend>,
) -> Result<()> {
    conn.execute(
        "UPDATE discussions SET send_announcement = ?3, send_announcement_at = ?4
         WHERE owner = ?1 AND contact = ?2",
        rusqlite::params![
            owner.as_bytes().as_slice(),
            contact.as_bytes().as_slice(),
            pending.map(|p| p.data.as_slice()),
            pending.map(|p| p.when_to_send as i64),
        ],
    )?;
    Ok(())
}

/// Record local intent to converse.
pub fn set_we_accepted(conn: &Connection, owner: &UserId, contact: &UserId) -> Result<()> {
    conn.execute(
        "UPDATE discussions SET we_accepted = 1 WHERE owner = ?1 AND contact = ?2",
        rusqlite::params![owner.as_bytes().as_slice(), contact.as_bytes().as_slice()],
    )?;
    Ok(())
}

/// Record that the pair reached ACTIVE; sticky once set.
pub fn set_was_active(conn: &Connection, owner: &UserId, contact: &UserId) -> Result<()> {
    conn.execute(
        "UPDATE discussions SET was_active = 1 WHERE owner = ?1 AND contact = ?2",
        rusqlite::params![owner.as_bytes().as_slice(), contact.as_bytes().as_slice()],
    )?;
    Ok(())
}

/// Store the free-text blurb of the latest incoming announcement.
pub fn set_last_announcement_message(
    conn: &Connection,
    owner: &UserId,
    contact: &UserId,
    message: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE discussions SET last_announcement_message = ?3
         WHERE owner = ?1 AND contact = ?2",
        rusqlite::params![
            owner.as_bytes().as_slice(),
            contact.as_bytes().as_slice(),
            message
        ],
    )?;
    Ok(())
}

/// Record a completed inbound sync.
pub fn set_last_sync_at(conn: &Connection, owner: &UserId, contact: &UserId, at: u64) -> Result<()> {
    conn.execute(
        "UPDATE discussions SET last_sync_at = ?3 WHERE owner = ?1 AND contact = ?2",
        rusqlite::params![
            owner.as_bytes().as_slice(),
            contact.as_bytes().as_slice(),
            at as i64
        ],
    )?;
    Ok(())
}

/// Override the contact name shown for this discussion.
pub fn set_custom_name(
    conn: &Connection,
    owner: &UserId,
    contact: &UserId,
    name: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE discussions SET custom_name = ?3 WHERE owner = ?1 AND contact = ?2",
        rusqlite::params![
            owner.as_bytes().as_slice(),
            contact.as_bytes().as_slice(),
            name
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discussion(owner: [u8; 32], contact: [u8; 32], created_at: u64) -> Discussion {
        Discussion {
            owner: UserId::from_bytes(owner),
            contact: UserId::from_bytes(contact),
            direction: DiscussionDirection::Initiated,
            we_accepted: true,
            was_active: false,
            send_announcement: None,
            last_sync_at: None,
            last_message_id: None,
            last_message_content: None,
            last_message_at: None,
            unread_count: 0,
            custom_name: None,
            last_announcement_message: None,
            created_at,
        }
    }

    #[test]
    fn test_insert_get_roundtrip() {
        let conn = crate::open_memory().expect("open");
        let mut d = discussion([1; 32], [2; 32], 1000);
        d.send_announcement = Some(PendingSend {
            data: vec![9, 9, 9],
            when_to_send: 1234,
        });
        insert(&conn, &d).expect("insert");

        let found = get(&conn, &d.owner, &d.contact)
            .expect("get")
            .expect("present");
        assert_eq!(found.direction, DiscussionDirection::Initiated);
        assert_eq!(
            found.send_announcement,
            Some(PendingSend {
                data: vec![9, 9, 9],
                when_to_send: 1234
            })
        );
    }

    #[test]
    fn test_one_discussion_per_pair() {
        let conn = crate::open_memory().expect("open");
        insert(&conn, &discussion([1; 32], [2; 32], 1000)).expect("insert");
        assert!(insert(&conn, &discussion([1; 32], [2; 32], 2000)).is_err());
    }

    #[test]
    fn test_list_ordering() {
        let conn = crate::open_memory().expect("open");
        let owner = UserId::from_bytes([1; 32]);

        // No messages yet, created later.
        insert(&conn, &discussion([1; 32], [2; 32], 300)).expect("insert");
        // Old message.
        let mut with_old = discussion([1; 32], [3; 32], 100);
        with_old.last_message_at = Some(1_000);
        insert(&conn, &with_old).expect("insert");
        // Fresh message.
        let mut with_new = discussion([1; 32], [4; 32], 200);
        with_new.last_message_at = Some(2_000);
        insert(&conn, &with_new).expect("insert");

        let listed = list(&conn, &owner).expect("list");
        let order: Vec<[u8; 32]> = listed.iter().map(|d| *d.contact.as_bytes()).collect();
        assert_eq!(order, vec![[4; 32], [3; 32], [2; 32]]);
    }

    #[test]
    fn test_clear_send_announcement() {
        let conn = crate::open_memory().expect("open");
        let mut d = discussion([1; 32], [2; 32], 1000);
        d.send_announcement = Some(PendingSend {
            data: vec![1],
            when_to_send: 5,
        });
        insert(&conn, &d).expect("insert");
        assert_eq!(list_armed(&conn, &d.owner).expect("armed").len(), 1);

        set_send_announcement(&conn, &d.owner, &d.contact, None).expect("clear");
        assert!(list_armed(&conn, &d.owner).expect("armed").is_empty());
        let found = get(&conn, &d.owner, &d.contact)
            .expect("get")
            .expect("present");
        assert_eq!(found.send_announcement, None);
    }

    #[test]
    fn test_was_active_sticky_flag() {
        let conn = crate::open_memory().expect("open");
        let d = discussion([1; 32], [2; 32], 1000);
        insert(&conn, &d).expect("insert");
        set_was_active(&conn, &d.owner, &d.contact).expect("set");
        assert!(get(&conn, &d.owner, &d.contact)
            .expect("get")
            .expect("present")
            .was_active);
    }
}
