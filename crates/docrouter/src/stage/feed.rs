//! The stage change feed: new arrivals in the order they were noticed.

use log::info;

use super::StageScanner;
use crate::db::stage_repo::{self, StageEntry};
use crate::db::Database;
use crate::error::StageError;

/// Scans the stage and appends a feed entry for each file that is new or
/// whose size or modification time changed. Returns the number appended.
pub fn refresh(scanner: &StageScanner, db: &Database) -> Result<usize, StageError> {
    let mut appended = 0;
    for file in scanner.scan()? {
        if stage_repo::register_if_changed(db, &file.file_name, file.size, file.modified_at)?
            .is_some()
        {
            appended += 1;
        }
    }
    if appended > 0 {
        info!("{} new arrival(s) in the stage feed", appended);
    }
    Ok(appended)
}

/// Unconsumed arrivals, oldest first.
pub fn pending_feed(db: &Database) -> Result<Vec<StageEntry>, StageError> {
    Ok(stage_repo::pending(db)?)
}

pub fn mark_consumed(db: &Database, seq: i64) -> Result<(), StageError> {
    Ok(stage_repo::mark_consumed(db, seq)?)
}
