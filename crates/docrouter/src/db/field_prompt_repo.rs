//! Field prompt repository: per-type extraction schema rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{now_timestamp, parse_timestamp, Database, DatabaseError};

/// A stored extraction instruction for one field of a document type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldPrompt {
    pub document_type: String,
    pub field_name: String,
    pub retrieval_prompt: String,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

impl FieldPrompt {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let created_at: String = row.get("created_at")?;
        Ok(Self {
            document_type: row.get("document_type")?,
            field_name: row.get("field_name")?,
            retrieval_prompt: row.get("retrieval_prompt")?,
            sort_order: row.get("sort_order")?,
            created_at: parse_timestamp(4, &created_at)?,
        })
    }
}

/// An already-normalized prompt ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFieldPrompt {
    pub field_name: String,
    pub retrieval_prompt: String,
    pub sort_order: i64,
}

/// Replaces every prompt of `document_type` with `prompts` in one transaction
/// and bumps the type's schema version. Returns the new version.
pub fn replace_all(
    db: &Database,
    document_type: &str,
    prompts: &[NewFieldPrompt],
) -> Result<u32, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let now = now_timestamp();

        tx.execute(
            "DELETE FROM field_prompts WHERE document_type = ?1",
            params![document_type],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO field_prompts (document_type, field_name, retrieval_prompt, sort_order, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for prompt in prompts {
                stmt.execute(params![
                    document_type,
                    prompt.field_name,
                    prompt.retrieval_prompt,
                    prompt.sort_order,
                    now,
                ])?;
            }
        }

        tx.execute(
            "INSERT INTO field_schema_versions (document_type, version, updated_at)
             VALUES (?1, 1, ?2)
             ON CONFLICT(document_type) DO UPDATE SET version = version + 1, updated_at = excluded.updated_at",
            params![document_type, now],
        )?;
        let version: u32 = tx.query_row(
            "SELECT version FROM field_schema_versions WHERE document_type = ?1",
            params![document_type],
            |r| r.get(0),
        )?;

        tx.commit()?;
        Ok(version)
    })
}

/// Lists prompts of a type in canonical order: `(sort_order, field_name)`.
pub fn list_for_type(db: &Database, document_type: &str) -> Result<Vec<FieldPrompt>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT document_type, field_name, retrieval_prompt, sort_order, created_at
             FROM field_prompts WHERE document_type = ?1
             ORDER BY sort_order, field_name",
        )?;
        let rows = stmt
            .query_map(params![document_type], FieldPrompt::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Current schema version of a type, `0` if its prompts were never replaced.
pub fn schema_version(db: &Database, document_type: &str) -> Result<u32, DatabaseError> {
    db.with_conn(|conn| {
        let version: Option<u32> = conn
            .query_row(
                "SELECT version FROM field_schema_versions WHERE document_type = ?1",
                params![document_type],
                |r| r.get(0),
            )
            .optional()?;
        Ok(version.unwrap_or(0))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn prompt(name: &str, order: i64) -> NewFieldPrompt {
        NewFieldPrompt {
            field_name: name.to_string(),
            retrieval_prompt: format!("What is the {}?", name),
            sort_order: order,
        }
    }

    #[test]
    fn test_replace_and_list_in_canonical_order() {
        let db = test_db();
        replace_all(
            &db,
            "PERMIT",
            &[prompt("zone", 1), prompt("address", 1), prompt("permit_number", 0)],
        )
        .unwrap();

        let names: Vec<String> = list_for_type(&db, "PERMIT")
            .unwrap()
            .into_iter()
            .map(|p| p.field_name)
            .collect();
        assert_eq!(names, vec!["permit_number", "address", "zone"]);
    }

    #[test]
    fn test_replace_discards_previous_set() {
        let db = test_db();
        replace_all(&db, "PERMIT", &[prompt("a", 0), prompt("b", 1)]).unwrap();
        replace_all(&db, "PERMIT", &[prompt("c", 0)]).unwrap();

        let prompts = list_for_type(&db, "PERMIT").unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].field_name, "c");
    }

    #[test]
    fn test_replace_only_touches_one_type() {
        let db = test_db();
        replace_all(&db, "PERMIT", &[prompt("a", 0)]).unwrap();
        replace_all(&db, "INVOICE", &[prompt("total", 0)]).unwrap();
        replace_all(&db, "PERMIT", &[]).unwrap();

        assert!(list_for_type(&db, "PERMIT").unwrap().is_empty());
        assert_eq!(list_for_type(&db, "INVOICE").unwrap().len(), 1);
    }

    #[test]
    fn test_schema_version_increments_per_replace() {
        let db = test_db();
        assert_eq!(schema_version(&db, "PERMIT").unwrap(), 0);
        assert_eq!(replace_all(&db, "PERMIT", &[prompt("a", 0)]).unwrap(), 1);
        assert_eq!(replace_all(&db, "PERMIT", &[]).unwrap(), 2);
        assert_eq!(schema_version(&db, "PERMIT").unwrap(), 2);
        assert_eq!(schema_version(&db, "INVOICE").unwrap(), 0);
    }

    #[test]
    fn test_duplicate_field_names_are_stored() {
        let db = test_db();
        replace_all(&db, "PERMIT", &[prompt("a", 0), prompt("a", 1)]).unwrap();
        assert_eq!(list_for_type(&db, "PERMIT").unwrap().len(), 2);
    }
}
