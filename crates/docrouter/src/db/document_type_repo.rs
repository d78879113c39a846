//! Document type repository: the classification vocabulary.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

use super::{now_timestamp, parse_timestamp, Database, DatabaseError};

/// A registered document type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentType {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl DocumentType {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let created_at: String = row.get("created_at")?;
        Ok(Self {
            name: row.get("name")?,
            description: row.get("description")?,
            created_at: parse_timestamp(2, &created_at)?,
        })
    }
}

/// Inserts the type unless a row with the same name exists.
///
/// An existing description is left untouched. Returns `true` if a row was inserted.
pub fn insert_if_absent(
    db: &Database,
    name: &str,
    description: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT INTO document_types (name, description, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO NOTHING",
            params![name, description, now_timestamp()],
        )?;
        Ok(changed > 0)
    })
}

/// Overwrites the description of an existing type. Returns `false` if the type is unknown.
pub fn update_description(
    db: &Database,
    name: &str,
    description: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE document_types SET description = ?2 WHERE name = ?1",
            params![name, description],
        )?;
        Ok(changed > 0)
    })
}

/// Finds a document type by exact name.
pub fn find(db: &Database, name: &str) -> Result<Option<DocumentType>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT name, description, created_at FROM document_types WHERE name = ?1",
        )?;
        let mut rows = stmt.query_map(params![name], DocumentType::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists all document types ordered by name.
pub fn list(db: &Database) -> Result<Vec<DocumentType>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT name, description, created_at FROM document_types ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], DocumentType::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists only the type names, ordered by name.
pub fn names(db: &Database) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM document_types ORDER BY name")?;
        let rows = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        assert!(insert_if_absent(&db, "PERMIT", "Building permits").unwrap());

        let found = find(&db, "PERMIT").unwrap().unwrap();
        assert_eq!(found.name, "PERMIT");
        assert_eq!(found.description, "Building permits");
    }

    #[test]
    fn test_insert_existing_keeps_description() {
        let db = test_db();
        assert!(insert_if_absent(&db, "PERMIT", "Original").unwrap());
        assert!(!insert_if_absent(&db, "PERMIT", "Replacement").unwrap());

        let found = find(&db, "PERMIT").unwrap().unwrap();
        assert_eq!(found.description, "Original");
    }

    #[test]
    fn test_update_description() {
        let db = test_db();
        insert_if_absent(&db, "PERMIT", "Original").unwrap();
        assert!(update_description(&db, "PERMIT", "Changed").unwrap());
        assert!(!update_description(&db, "MISSING", "Changed").unwrap());

        assert_eq!(find(&db, "PERMIT").unwrap().unwrap().description, "Changed");
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find(&db, "NOPE").unwrap().is_none());
    }

    #[test]
    fn test_list_and_names_are_sorted() {
        let db = test_db();
        insert_if_absent(&db, "RECEIPT", "").unwrap();
        insert_if_absent(&db, "INVOICE", "").unwrap();
        insert_if_absent(&db, "PERMIT", "").unwrap();

        assert_eq!(names(&db).unwrap(), vec!["INVOICE", "PERMIT", "RECEIPT"]);
        let listed: Vec<String> = list(&db).unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(listed, vec!["INVOICE", "PERMIT", "RECEIPT"]);
    }
}
