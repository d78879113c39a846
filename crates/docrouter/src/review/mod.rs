//! Read-side projection of a record for human review, and the inverse
//! mapping from edited rows back to an approval payload.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::db::record_repo::{Record, ValidationState};
use crate::stage::FileKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalBadge {
    Approved,
    NotApproved,
}

impl ApprovalBadge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::NotApproved => "NOT APPROVED",
        }
    }
}

/// How the reviewer sees the validation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationLabel {
    Valid,
    /// The validator flagged the extraction, or its output could not be read as a pass.
    Review,
    /// No verdict yet (not run, or the call failed).
    Pending,
    /// A skip marker; validation did not apply.
    NotApplicable,
}

impl ValidationLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Review => "REVIEW",
            Self::Pending => "PENDING",
            Self::NotApplicable => "NOT APPLICABLE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub label: ValidationLabel,
    pub notes: String,
}

/// Coerces stored JSON into an object the way the review screen expects.
///
/// JSON-encoded strings are parsed; other scalars end up under `raw`/`value`.
fn ensure_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => {
                let mut map = Map::new();
                map.insert("raw".to_string(), Value::String(raw.clone()));
                map
            }
        },
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    }
}

/// Reads the payload out of a `{"response": {...}}` wrapper when present.
fn response_payload(value: &Value) -> Map<String, Value> {
    let outer = ensure_object(value);
    match outer.get("response") {
        Some(inner) => ensure_object(inner),
        None => outer,
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Maps a record's validation state and stored JSON to a label and notes.
pub fn summarize_validation(
    state: ValidationState,
    validation_json: Option<&Value>,
    validation_error: Option<&str>,
) -> ValidationSummary {
    let Some(json) = validation_json else {
        let notes = match (state, validation_error) {
            (ValidationState::Failed, Some(error)) => format!("Validation failed: {}", error),
            _ => String::new(),
        };
        return ValidationSummary {
            label: ValidationLabel::Pending,
            notes,
        };
    };

    let payload = response_payload(json);
    if state == ValidationState::Skipped
        || payload.get("status").and_then(Value::as_str) == Some("skipped")
    {
        return ValidationSummary {
            label: ValidationLabel::NotApplicable,
            notes: payload.get("reason").map(display_text).unwrap_or_default(),
        };
    }

    let notes = ["notes", "message"]
        .iter()
        .filter_map(|key| payload.get(*key))
        .map(display_text)
        .find(|text| !text.is_empty())
        .unwrap_or_default();

    ValidationSummary {
        label: if truthy(payload.get("valid")) {
            ValidationLabel::Valid
        } else {
            ValidationLabel::Review
        },
        notes,
    }
}

/// One editable `(field, value)` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldRow {
    pub name: String,
    pub value: Value,
}

impl FieldRow {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Extracted fields as editable rows, sorted by name; array values are joined with `", "`.
pub fn field_rows(extract_json: &Value) -> Vec<FieldRow> {
    let mut rows: Vec<FieldRow> = response_payload(extract_json)
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::Array(items) => Value::String(
                    items
                        .iter()
                        .map(display_text)
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
                other => other,
            };
            FieldRow { name, value }
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

/// Rebuilds the approval payload from edited rows. Rows with a blank name are
/// dropped; names are trimmed and a later duplicate wins.
pub fn rows_to_payload(rows: &[FieldRow]) -> Value {
    let mut payload = Map::new();
    for row in rows {
        let name = row.name.trim();
        if name.is_empty() {
            continue;
        }
        payload.insert(name.to_string(), row.value.clone());
    }
    Value::Object(payload)
}

/// Everything the review screen shows for one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordReview {
    pub record_id: i64,
    pub file_name: String,
    pub file_url: Option<String>,
    pub file_kind: FileKind,
    pub document_type: String,
    pub schema_version: u32,
    pub status: ApprovalBadge,
    pub approved_at: Option<DateTime<Utc>>,
    pub validation: ValidationSummary,
    pub fields: Vec<FieldRow>,
    pub created_at: DateTime<Utc>,
}

impl RecordReview {
    pub fn from_record(record: &Record) -> Self {
        Self {
            record_id: record.id,
            file_name: record.file_name.clone(),
            file_url: record.file_url.clone(),
            file_kind: FileKind::from_file_name(&record.file_name),
            document_type: record.document_type.to_uppercase(),
            schema_version: record.schema_version,
            status: if record.approved {
                ApprovalBadge::Approved
            } else {
                ApprovalBadge::NotApproved
            },
            approved_at: record.approved_at,
            validation: summarize_validation(
                record.validation_state,
                record.validation_json.as_ref(),
                record.validation_error.as_deref(),
            ),
            fields: field_rows(&record.extract_json),
            created_at: record.created_at,
        }
    }
}
