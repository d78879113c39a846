//! Document type and field prompt registries.
//!
//! Document types form the closed vocabulary the classifier picks from; field
//! prompts are the per-type extraction schema. Both are configuration and are
//! only read while the pipeline runs.

use log::{debug, info};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ai::FieldSpec;
use crate::db::document_type_repo::{self, DocumentType};
use crate::db::field_prompt_repo::{self, FieldPrompt, NewFieldPrompt};
use crate::db::{Database, DatabaseError};

/// Sentinel document type for files the classifier could not place.
pub const NO_MATCH: &str = "NO_MATCH";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Document type name must not be empty")]
    EmptyName,

    #[error("'{0}' is reserved and cannot be registered as a document type")]
    ReservedName(String),

    #[error("Unknown document type: {0}")]
    UnknownType(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

fn normalize_type_name(name: &str) -> Result<String, RegistryError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    if trimmed.eq_ignore_ascii_case(NO_MATCH) {
        return Err(RegistryError::ReservedName(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Registers a document type if no type with that name exists.
///
/// An existing description is never overwritten; use
/// [`update_document_type_description`] for that. Returns `true` on insert.
pub fn upsert_document_type(
    db: &Database,
    name: &str,
    description: &str,
) -> Result<bool, RegistryError> {
    let name = normalize_type_name(name)?;
    let inserted = document_type_repo::insert_if_absent(db, &name, description.trim())?;
    if inserted {
        info!("Registered document type {}", name);
    } else {
        debug!("Document type {} already registered, keeping description", name);
    }
    Ok(inserted)
}

pub fn update_document_type_description(
    db: &Database,
    name: &str,
    description: &str,
) -> Result<(), RegistryError> {
    let name = normalize_type_name(name)?;
    if document_type_repo::update_description(db, &name, description.trim())? {
        Ok(())
    } else {
        Err(RegistryError::UnknownType(name))
    }
}

/// All registered types ordered by name.
pub fn list_document_types(db: &Database) -> Result<Vec<DocumentType>, RegistryError> {
    Ok(document_type_repo::list(db)?)
}

/// The classifier vocabulary, ordered by name.
pub fn document_type_names(db: &Database) -> Result<Vec<String>, RegistryError> {
    Ok(document_type_repo::names(db)?)
}

/// Description of a type, or `None` if it is not registered.
pub fn describe(db: &Database, name: &str) -> Result<Option<String>, RegistryError> {
    Ok(document_type_repo::find(db, name.trim())?.map(|t| t.description))
}

/// A field prompt as entered by a user or read from a file, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptInput {
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default)]
    pub retrieval_prompt: Option<String>,
    #[serde(default, deserialize_with = "lenient_sort_order")]
    pub sort_order: Option<i64>,
}

impl PromptInput {
    pub fn new(field_name: &str, retrieval_prompt: &str, sort_order: i64) -> Self {
        Self {
            field_name: Some(field_name.to_string()),
            retrieval_prompt: Some(retrieval_prompt.to_string()),
            sort_order: Some(sort_order),
        }
    }

    /// Applies the entry rules; `None` means the entry is dropped.
    ///
    /// - `"name: instruction"` in the field column with no instruction is split on the first `:`.
    /// - Both parts are trimmed; an empty part drops the entry.
    /// - A missing sort order becomes `0`.
    pub fn normalize(&self) -> Option<NewFieldPrompt> {
        let mut field = self.field_name.clone().unwrap_or_default();
        let mut prompt = self.retrieval_prompt.clone().unwrap_or_default();

        if prompt.trim().is_empty() {
            if let Some((name, instruction)) = field.split_once(':') {
                let (name, instruction) = (name.to_string(), instruction.to_string());
                field = name;
                prompt = instruction;
            }
        }

        let field = field.trim();
        let prompt = prompt.trim();
        if field.is_empty() || prompt.is_empty() {
            return None;
        }

        Some(NewFieldPrompt {
            field_name: field.to_string(),
            retrieval_prompt: prompt.to_string(),
            sort_order: self.sort_order.unwrap_or(0),
        })
    }
}

fn lenient_sort_order<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// Replaces every prompt of `document_type` with the valid entries of `prompts`.
///
/// Invalid entries are dropped silently. The type need not be registered.
/// Returns the number of prompts stored.
pub fn replace_field_prompts(
    db: &Database,
    document_type: &str,
    prompts: &[PromptInput],
) -> Result<usize, RegistryError> {
    let document_type = document_type.trim();
    if document_type.is_empty() {
        return Err(RegistryError::EmptyName);
    }

    let normalized: Vec<NewFieldPrompt> = prompts.iter().filter_map(PromptInput::normalize).collect();
    let version = field_prompt_repo::replace_all(db, document_type, &normalized)?;

    info!(
        "Stored {} of {} prompt(s) for {} (schema v{})",
        normalized.len(),
        prompts.len(),
        document_type,
        version
    );
    Ok(normalized.len())
}

/// Prompts of a type in canonical `(sort_order, field_name)` order.
pub fn field_prompts(db: &Database, document_type: &str) -> Result<Vec<FieldPrompt>, RegistryError> {
    Ok(field_prompt_repo::list_for_type(db, document_type)?)
}

/// Everything the extractor and validator need to know about one type,
/// loaded once per file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSchema {
    pub document_type: String,
    pub description: String,
    pub fields: Vec<FieldSpec>,
    pub version: u32,
}

impl FieldSchema {
    /// The schema of the no-match sentinel: no description, no fields.
    pub fn no_match() -> Self {
        Self {
            document_type: NO_MATCH.to_string(),
            description: String::new(),
            fields: Vec::new(),
            version: 0,
        }
    }

    pub fn is_no_match(&self) -> bool {
        self.document_type == NO_MATCH
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Loads the field schema for a classified type.
pub fn load_field_schema(db: &Database, document_type: &str) -> Result<FieldSchema, RegistryError> {
    if document_type == NO_MATCH {
        return Ok(FieldSchema::no_match());
    }

    let description = describe(db, document_type)?.unwrap_or_default();
    let fields = field_prompt_repo::list_for_type(db, document_type)?
        .into_iter()
        .map(|p| FieldSpec::new(p.field_name, p.retrieval_prompt))
        .collect();
    let version = field_prompt_repo::schema_version(db, document_type)?;

    Ok(FieldSchema {
        document_type: document_type.to_string(),
        description,
        fields,
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_upsert_trims_and_keeps_first_description() {
        let db = test_db();
        assert!(upsert_document_type(&db, "  PERMIT ", "Building permits").unwrap());
        assert!(!upsert_document_type(&db, "PERMIT", "Something else").unwrap());

        assert_eq!(describe(&db, "PERMIT").unwrap().as_deref(), Some("Building permits"));
    }

    #[test]
    fn test_upsert_rejects_empty_and_reserved_names() {
        let db = test_db();
        assert!(matches!(
            upsert_document_type(&db, "   ", "x"),
            Err(RegistryError::EmptyName)
        ));
        assert!(matches!(
            upsert_document_type(&db, "no_match", "x"),
            Err(RegistryError::ReservedName(_))
        ));
        assert!(document_type_names(&db).unwrap().is_empty());
    }

    #[test]
    fn test_update_description() {
        let db = test_db();
        upsert_document_type(&db, "PERMIT", "Old").unwrap();
        update_document_type_description(&db, "PERMIT", "New").unwrap();
        assert_eq!(describe(&db, "PERMIT").unwrap().as_deref(), Some("New"));

        assert!(matches!(
            update_document_type_description(&db, "INVOICE", "x"),
            Err(RegistryError::UnknownType(_))
        ));
    }

    #[test]
    fn test_normalize_splits_colon_form() {
        let input = PromptInput {
            field_name: Some("total : The invoice total".to_string()),
            retrieval_prompt: None,
            sort_order: None,
        };
        let normalized = input.normalize().unwrap();
        assert_eq!(normalized.field_name, "total");
        assert_eq!(normalized.retrieval_prompt, "The invoice total");
        assert_eq!(normalized.sort_order, 0);
    }

    #[test]
    fn test_normalize_keeps_colon_when_prompt_present() {
        let input = PromptInput::new("time:utc", "When was it issued?", 2);
        let normalized = input.normalize().unwrap();
        assert_eq!(normalized.field_name, "time:utc");
        assert_eq!(normalized.sort_order, 2);
    }

    #[test]
    fn test_normalize_drops_blank_entries() {
        assert!(PromptInput::new("   ", "prompt", 0).normalize().is_none());
        assert!(PromptInput::new("field", "  ", 0).normalize().is_none());
        assert!(PromptInput::default().normalize().is_none());
        assert!(PromptInput {
            field_name: Some("field:".to_string()),
            ..Default::default()
        }
        .normalize()
        .is_none());
    }

    #[test]
    fn test_prompt_input_lenient_sort_order() {
        let inputs: Vec<PromptInput> = serde_json::from_str(
            r#"[
                {"field_name": "a", "retrieval_prompt": "A", "sort_order": 3},
                {"field_name": "b", "retrieval_prompt": "B", "sort_order": "4"},
                {"field_name": "c", "retrieval_prompt": "C", "sort_order": "soon"},
                {"field_name": "d", "retrieval_prompt": "D"}
            ]"#,
        )
        .unwrap();
        let orders: Vec<i64> = inputs
            .iter()
            .map(|p| p.normalize().unwrap().sort_order)
            .collect();
        assert_eq!(orders, vec![3, 4, 0, 0]);
    }

    #[test]
    fn test_replace_counts_only_valid_entries() {
        let db = test_db();
        let prompts = vec![
            PromptInput::new("permit_number", "The permit number", 0),
            PromptInput::new("", "orphan instruction", 1),
            PromptInput::new("address", "Site address", 1),
        ];
        let stored = replace_field_prompts(&db, "PERMIT", &prompts).unwrap();
        assert_eq!(stored, prompts.len() - 1);
        assert_eq!(field_prompts(&db, "PERMIT").unwrap().len(), 2);
    }

    #[test]
    fn test_load_field_schema() {
        let db = test_db();
        upsert_document_type(&db, "PERMIT", "Building permits").unwrap();
        replace_field_prompts(
            &db,
            "PERMIT",
            &[
                PromptInput::new("zone", "Zoning code", 1),
                PromptInput::new("permit_number", "The permit number", 0),
            ],
        )
        .unwrap();

        let schema = load_field_schema(&db, "PERMIT").unwrap();
        assert_eq!(schema.description, "Building permits");
        assert_eq!(schema.field_names(), vec!["permit_number", "zone"]);
        assert_eq!(schema.version, 1);
        assert!(!schema.is_no_match());
    }

    #[test]
    fn test_load_field_schema_for_no_match_and_unregistered() {
        let db = test_db();
        let schema = load_field_schema(&db, NO_MATCH).unwrap();
        assert!(schema.is_no_match());
        assert!(schema.fields.is_empty());

        let schema = load_field_schema(&db, "GHOST").unwrap();
        assert!(schema.fields.is_empty());
        assert!(schema.description.is_empty());
    }
}
