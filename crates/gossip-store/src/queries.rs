//! Query functions, one module per entity family.

pub mod contacts;
pub mod discussions;
pub mod messages;
pub mod pending;
pub mod profile;
pub mod seekers;

use gossip_types::{Seeker, UserId};
use rusqlite::types::Type;
use rusqlite::Row;

/// Enum column held a value no current version writes.
#[derive(Debug, thiserror::Error)]
#[error("invalid enum value: {0}")]
pub(crate) struct EnumParseError(pub String);

pub(crate) fn col_user_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<UserId> {
    let bytes: Vec<u8> = row.get(idx)?;
    UserId::from_slice(&bytes)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e)))
}

pub(crate) fn col_seeker_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Seeker>> {
    let bytes: Option<Vec<u8>> = row.get(idx)?;
    bytes
        .map(|b| {
            Seeker::from_slice(&b).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e))
            })
        })
        .transpose()
}

pub(crate) fn col_u64_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<u64>> {
    let value: Option<i64> = row.get(idx)?;
    Ok(value.map(|v| v as u64))
}

pub(crate) fn col_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    Ok(value as u64)
}
