//! Stage file repository: the change feed of arrivals in the stage directory.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_timestamp, now_timestamp, parse_timestamp, Database, DatabaseError};

/// One arrival event: a file that appeared (or changed) in the stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageEntry {
    pub seq: i64,
    pub file_name: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

impl StageEntry {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let modified_at: String = row.get("modified_at")?;
        let registered_at: String = row.get("registered_at")?;
        Ok(Self {
            seq: row.get("seq")?,
            file_name: row.get("file_name")?,
            size_bytes: row.get("size_bytes")?,
            modified_at: parse_timestamp(3, &modified_at)?,
            registered_at: parse_timestamp(4, &registered_at)?,
        })
    }
}

/// Appends an arrival unless the newest entry for this name already has the
/// same size and modification time. Returns the new sequence number, if any.
pub fn register_if_changed(
    db: &Database,
    file_name: &str,
    size_bytes: u64,
    modified_at: DateTime<Utc>,
) -> Result<Option<i64>, DatabaseError> {
    let modified = format_timestamp(modified_at);
    db.with_conn(|conn| {
        let latest: Option<(u64, String)> = conn
            .query_row(
                "SELECT size_bytes, modified_at FROM stage_files
                 WHERE file_name = ?1 ORDER BY seq DESC LIMIT 1",
                params![file_name],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        if let Some((size, mtime)) = latest {
            if size == size_bytes && mtime == modified {
                return Ok(None);
            }
        }

        conn.execute(
            "INSERT INTO stage_files (file_name, size_bytes, modified_at, registered_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![file_name, size_bytes, modified, now_timestamp()],
        )?;
        Ok(Some(conn.last_insert_rowid()))
    })
}

/// Unconsumed arrivals in delivery order.
pub fn pending(db: &Database) -> Result<Vec<StageEntry>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT seq, file_name, size_bytes, modified_at, registered_at
             FROM stage_files WHERE consumed_at IS NULL ORDER BY seq",
        )?;
        let rows = stmt
            .query_map([], StageEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Advances the feed past one arrival.
pub fn mark_consumed(db: &Database, seq: i64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE stage_files SET consumed_at = ?2 WHERE seq = ?1 AND consumed_at IS NULL",
            params![seq, now_timestamp()],
        )?;
        Ok(())
    })
}
