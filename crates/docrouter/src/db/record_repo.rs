//! Record repository: one row per processing run of a staged file.
//!
//! Rows are append-only: processing the same file name twice yields two rows.
//! Validation is attached by row id, so a later run never rewrites an
//! earlier (possibly approved) row.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;
use serde_json::Value;

use super::{format_timestamp, now_timestamp, parse_timestamp, Database, DatabaseError};

/// Where a record is in the validation phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationState {
    /// Inserted, validator not yet run (or interrupted).
    Pending,
    /// Validator ran; `validation_json` holds its verdict.
    Complete,
    /// Validation was not applicable; `validation_json` holds the skip marker.
    Skipped,
    /// Validator call failed; `validation_error` holds the reason.
    Failed,
}

impl ValidationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationState {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            "skipped" => Ok(Self::Skipped),
            "failed" => Ok(Self::Failed),
            other => Err(DatabaseError::UnexpectedValue {
                column: "validation_state",
                value: other.to_string(),
            }),
        }
    }
}

/// A processed file's full pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: i64,
    pub file_name: String,
    pub file_url: Option<String>,
    pub document_type: String,
    pub schema_version: u32,
    pub extract_json: Value,
    pub validation_json: Option<Value>,
    pub validation_state: ValidationState,
    pub validation_error: Option<String>,
    pub approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn json_column(idx: usize, raw: &str) -> Result<Value, rusqlite::Error> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl Record {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let extract_raw: String = row.get("extract_json")?;
        let validation_raw: Option<String> = row.get("validation_json")?;
        let state_raw: String = row.get("validation_state")?;
        let approved_at: Option<String> = row.get("approved_at")?;
        let created_at: String = row.get("created_at")?;

        Ok(Self {
            id: row.get("id")?,
            file_name: row.get("file_name")?,
            file_url: row.get("file_url")?,
            document_type: row.get("document_type")?,
            schema_version: row.get("schema_version")?,
            extract_json: json_column(5, &extract_raw)?,
            validation_json: validation_raw
                .as_deref()
                .map(|raw| json_column(6, raw))
                .transpose()?,
            validation_state: state_raw.parse().map_err(|e: DatabaseError| {
                rusqlite::Error::FromSqlConversionFailure(
                    7,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            validation_error: row.get("validation_error")?,
            approved: row.get("approved")?,
            approved_at: approved_at
                .as_deref()
                .map(|raw| parse_timestamp(10, raw))
                .transpose()?,
            created_at: parse_timestamp(11, &created_at)?,
        })
    }
}

/// Values written by the first (insert) phase of the pipeline.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub file_name: String,
    pub file_url: Option<String>,
    pub document_type: String,
    pub schema_version: u32,
    pub extract_json: Value,
}

/// Approval filter used by the review listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApprovalFilter {
    #[default]
    All,
    Approved,
    NotApproved,
}

/// Query filter parameters for record listing.
#[derive(Debug, Default, Clone)]
pub struct RecordFilter {
    pub document_type: Option<String>,
    pub approval: ApprovalFilter,
    pub validation_state: Option<ValidationState>,
    pub file_name: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

const SELECT_COLUMNS: &str = "id, file_name, file_url, document_type, schema_version, extract_json,
     validation_json, validation_state, validation_error, approved, approved_at, created_at";

/// Inserts a new record in `pending` validation state and returns its id.
pub fn insert(db: &Database, record: &NewRecord) -> Result<i64, DatabaseError> {
    let extract = serde_json::to_string(&record.extract_json)?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO records (file_name, file_url, document_type, schema_version, extract_json,
             validation_state, approved, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6)",
            params![
                record.file_name,
                record.file_url,
                record.document_type,
                record.schema_version,
                extract,
                now_timestamp(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Attaches a validation outcome to one record.
pub fn set_validation(
    db: &Database,
    id: i64,
    state: ValidationState,
    validation_json: Option<&Value>,
    error: Option<&str>,
) -> Result<(), DatabaseError> {
    let validation = validation_json.map(serde_json::to_string).transpose()?;
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE records SET validation_state = ?2, validation_json = ?3, validation_error = ?4
             WHERE id = ?1",
            params![id, state.as_str(), validation, error],
        )?;
        Ok(())
    })
}

/// Overwrites the extraction with the reviewer's snapshot and marks the row approved.
///
/// `approved_at` never moves backwards: re-approving keeps the later of the
/// stored and the supplied time. Returns `false` if no row has this id.
pub fn approve(
    db: &Database,
    id: i64,
    edited: &Value,
    at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let payload = serde_json::to_string(edited)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE records SET extract_json = ?2, approved = 1,
             approved_at = CASE
                 WHEN approved_at IS NOT NULL AND approved_at > ?3 THEN approved_at
                 ELSE ?3
             END
             WHERE id = ?1",
            params![id, payload, format_timestamp(at)],
        )?;
        Ok(changed > 0)
    })
}

/// Finds a record by id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Record>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT {} FROM records WHERE id = ?1", SELECT_COLUMNS))?;
        let mut rows = stmt.query_map(params![id], Record::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds the most recent record for a file name.
pub fn find_latest_by_file_name(
    db: &Database,
    file_name: &str,
) -> Result<Option<Record>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM records WHERE file_name = ?1 ORDER BY id DESC LIMIT 1",
            SELECT_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![file_name], Record::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns rows whose validation still has to run (pending or failed), oldest first.
pub fn list_needing_validation(db: &Database) -> Result<Vec<Record>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM records WHERE validation_state IN ('pending', 'failed') ORDER BY id",
            SELECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], Record::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Queries records with filters, returning (rows, total_count).
pub fn query(db: &Database, filter: &RecordFilter) -> Result<(Vec<Record>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref document_type) = filter.document_type {
            conditions.push(format!("document_type = ?{}", param_values.len() + 1));
            param_values.push(Box::new(document_type.clone()));
        }
        match filter.approval {
            ApprovalFilter::All => {}
            ApprovalFilter::Approved => conditions.push("approved = 1".to_string()),
            ApprovalFilter::NotApproved => conditions.push("approved = 0".to_string()),
        }
        if let Some(state) = filter.validation_state {
            conditions.push(format!("validation_state = ?{}", param_values.len() + 1));
            param_values.push(Box::new(state.as_str()));
        }
        if let Some(ref file_name) = filter.file_name {
            conditions.push(format!("file_name = ?{}", param_values.len() + 1));
            param_values.push(Box::new(file_name.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM records {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT {} FROM records {} ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
            SELECT_COLUMNS,
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<Record> = stmt
            .query_map(params_ref.as_slice(), Record::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample(file_name: &str, document_type: &str) -> NewRecord {
        NewRecord {
            file_name: file_name.to_string(),
            file_url: Some(format!("file:///stage/{}", file_name)),
            document_type: document_type.to_string(),
            schema_version: 1,
            extract_json: json!({"permit_number": "P-1"}),
        }
    }

    #[test]
    fn test_insert_starts_pending_and_unapproved() {
        let db = test_db();
        let id = insert(&db, &sample("a.pdf", "PERMIT")).unwrap();

        let found = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(found.file_name, "a.pdf");
        assert_eq!(found.validation_state, ValidationState::Pending);
        assert!(found.validation_json.is_none());
        assert!(!found.approved);
        assert!(found.approved_at.is_none());
        assert_eq!(found.extract_json, json!({"permit_number": "P-1"}));
    }

    #[test]
    fn test_reprocessing_appends_rows() {
        let db = test_db();
        let first = insert(&db, &sample("a.pdf", "PERMIT")).unwrap();
        let second = insert(&db, &sample("a.pdf", "PERMIT")).unwrap();
        assert_ne!(first, second);

        let latest = find_latest_by_file_name(&db, "a.pdf").unwrap().unwrap();
        assert_eq!(latest.id, second);

        let (_, total) = query(
            &db,
            &RecordFilter {
                file_name: Some("a.pdf".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_set_validation_targets_single_row() {
        let db = test_db();
        let first = insert(&db, &sample("a.pdf", "PERMIT")).unwrap();
        let second = insert(&db, &sample("a.pdf", "PERMIT")).unwrap();

        let verdict = json!({"valid": true, "notes": "ok"});
        set_validation(&db, second, ValidationState::Complete, Some(&verdict), None).unwrap();

        let untouched = find_by_id(&db, first).unwrap().unwrap();
        assert_eq!(untouched.validation_state, ValidationState::Pending);
        let updated = find_by_id(&db, second).unwrap().unwrap();
        assert_eq!(updated.validation_state, ValidationState::Complete);
        assert_eq!(updated.validation_json, Some(verdict));
    }

    #[test]
    fn test_approve_overwrites_extraction() {
        let db = test_db();
        let id = insert(&db, &sample("a.pdf", "PERMIT")).unwrap();

        let edited = json!({"permit_number": "P-2", "added": "yes"});
        assert!(approve(&db, id, &edited, Utc::now()).unwrap());

        let found = find_by_id(&db, id).unwrap().unwrap();
        assert!(found.approved);
        assert!(found.approved_at.is_some());
        assert_eq!(found.extract_json, edited);
    }

    #[test]
    fn test_approve_never_moves_timestamp_backwards() {
        let db = test_db();
        let id = insert(&db, &sample("a.pdf", "PERMIT")).unwrap();
        let later = Utc::now();
        let earlier = later - chrono::Duration::hours(1);

        approve(&db, id, &json!({}), later).unwrap();
        approve(&db, id, &json!({}), earlier).unwrap();

        let found = find_by_id(&db, id).unwrap().unwrap();
        let stamped = found.approved_at.unwrap();
        assert_eq!(format_timestamp(stamped), format_timestamp(later));
    }

    #[test]
    fn test_approve_unknown_id() {
        let db = test_db();
        assert!(!approve(&db, 42, &json!({}), Utc::now()).unwrap());
    }

    #[test]
    fn test_query_filters() {
        let db = test_db();
        let permit = insert(&db, &sample("a.pdf", "PERMIT")).unwrap();
        insert(&db, &sample("b.pdf", "NO_MATCH")).unwrap();
        insert(&db, &sample("c.pdf", "PERMIT")).unwrap();
        approve(&db, permit, &json!({}), Utc::now()).unwrap();

        let (rows, total) = query(
            &db,
            &RecordFilter {
                document_type: Some("PERMIT".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 2);
        assert!(rows.iter().all(|r| r.document_type == "PERMIT"));

        let (rows, _) = query(
            &db,
            &RecordFilter {
                approval: ApprovalFilter::Approved,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, permit);

        let (_, not_approved) = query(
            &db,
            &RecordFilter {
                approval: ApprovalFilter::NotApproved,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(not_approved, 2);
    }

    #[test]
    fn test_query_orders_newest_first_and_paginates() {
        let db = test_db();
        for i in 0..5 {
            insert(&db, &sample(&format!("f{}.pdf", i), "PERMIT")).unwrap();
        }

        let (rows, total) = query(
            &db,
            &RecordFilter {
                limit: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 5);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].file_name, "f4.pdf");
        assert_eq!(rows[1].file_name, "f3.pdf");
    }

    #[test]
    fn test_query_by_validation_state_and_needing_validation() {
        let db = test_db();
        let a = insert(&db, &sample("a.pdf", "PERMIT")).unwrap();
        let b = insert(&db, &sample("b.pdf", "PERMIT")).unwrap();
        let c = insert(&db, &sample("c.pdf", "PERMIT")).unwrap();
        set_validation(&db, a, ValidationState::Complete, Some(&json!({"valid": true})), None)
            .unwrap();
        set_validation(&db, b, ValidationState::Failed, None, Some("timeout")).unwrap();

        let (pending, _) = query(
            &db,
            &RecordFilter {
                validation_state: Some(ValidationState::Pending),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, c);

        let ids: Vec<i64> = list_needing_validation(&db)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![b, c]);
    }

    #[test]
    fn test_validation_state_parse() {
        assert_eq!("skipped".parse::<ValidationState>().unwrap(), ValidationState::Skipped);
        assert!("bogus".parse::<ValidationState>().is_err());
        assert_eq!(ValidationState::Failed.to_string(), "failed");
    }
}
