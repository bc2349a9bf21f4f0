//! Field-level validation with actionable diagnostics.
//!
//! Tool arguments pass serde deserialization first; this module enforces
//! the constraints serde cannot express: custom-metadata values must be
//! strings, relationships need a target, status and relationship types
//! come from closed sets, UUIDs and dates must parse. Every violation is
//! reported with its field path and a remediation hint, in stable order.

use crate::types::{DocumentStatus, FrameRecord, Relationship, RelationshipType};
use serde_json::{json, Value};
use std::fmt;

/// A single field diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiagnostic {
    /// Dotted path to the offending field, e.g. `custom_metadata.priority`
    pub field: String,
    /// What went wrong
    pub message: String,
    /// How to fix it
    pub hint: String,
}

/// An ordered set of field diagnostics raised by one validation pass.
#[derive(Debug)]
pub struct ValidationReport {
    diagnostics: Vec<FieldDiagnostic>,
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl std::error::Error for ValidationReport {}

impl ValidationReport {
    /// Wraps a non-empty diagnostic list.
    #[must_use]
    pub fn new(diagnostics: Vec<FieldDiagnostic>) -> Self {
        Self { diagnostics }
    }

    /// Single-field convenience constructor.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            diagnostics: vec![FieldDiagnostic {
                field: field.into(),
                message: message.into(),
                hint: hint.into(),
            }],
        }
    }

    /// The diagnostics in insertion order.
    #[must_use]
    pub fn diagnostics(&self) -> &[FieldDiagnostic] {
        &self.diagnostics
    }

    /// JSON entries for the error `data` payload.
    #[must_use]
    pub fn to_entries(&self) -> Vec<Value> {
        self.diagnostics
            .iter()
            .map(|d| {
                json!({
                    "field": d.field,
                    "message": d.message,
                    "hint": d.hint,
                })
            })
            .collect()
    }

    fn render(&self) -> String {
        if self.diagnostics.len() == 1 {
            let d = &self.diagnostics[0];
            return format!("Field '{}': {}. {}", d.field, d.message, d.hint);
        }
        let mut out = String::from("Validation failed:");
        for d in &self.diagnostics {
            out.push_str(&format!("\n  - {}: {}. {}", d.field, d.message, d.hint));
        }
        out
    }
}

/// Collects diagnostics across one validation pass.
#[derive(Debug, Default)]
pub struct Validator {
    diagnostics: Vec<FieldDiagnostic>,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic.
    pub fn push(
        &mut self,
        field: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.diagnostics.push(FieldDiagnostic {
            field: field.into(),
            message: message.into(),
            hint: hint.into(),
        });
    }

    /// Finishes the pass: `Ok(())` if nothing was recorded.
    pub fn finish(self) -> Result<(), ValidationReport> {
        if self.diagnostics.is_empty() {
            Ok(())
        } else {
            Err(ValidationReport::new(self.diagnostics))
        }
    }
}

/// Validates custom metadata supplied as raw JSON, enforcing the
/// string-values contract and reporting each non-string value with its
/// type and a stringification hint.
pub fn check_custom_metadata(validator: &mut Validator, prefix: &str, values: &Value) {
    let Some(map) = values.as_object() else {
        validator.push(
            prefix,
            format!("expected an object, got {}", json_type_name(values)),
            "Provide custom_metadata as an object of string values.",
        );
        return;
    };
    for (key, value) in map {
        if !value.is_string() {
            validator.push(
                format!("{prefix}.{key}"),
                format!("value {} is not of type 'string'", value),
                format!(
                    "All custom_metadata values must be strings. Convert the {} to a string.",
                    json_type_name(value)
                ),
            );
        }
    }
}

/// Validates a relationship: the type must come from the closed set
/// (already guaranteed by the typed enum) and at least one target
/// identifier must be present.
pub fn check_relationship(validator: &mut Validator, prefix: &str, rel: &Relationship) {
    if !rel.has_target() {
        validator.push(
            prefix,
            "no target identifier".to_string(),
            "Relationships must include at least one of target_uuid, target_uri, target_path, or target_cid.",
        );
    }
}

/// Validates a relationship type supplied as a raw string.
pub fn check_relationship_type(validator: &mut Validator, field: &str, raw: &str) {
    if raw.parse::<RelationshipType>().is_err() {
        validator.push(
            field,
            format!("invalid relationship type '{raw}'"),
            format!("Valid types are: {}.", RelationshipType::VALID.join(", ")),
        );
    }
}

/// Validates a status supplied as a raw string.
pub fn check_status(validator: &mut Validator, field: &str, raw: &str) {
    if raw.parse::<DocumentStatus>().is_err() {
        validator.push(
            field,
            format!("invalid status '{raw}'"),
            format!("Valid values are: {}.", DocumentStatus::VALID.join(", ")),
        );
    }
}

/// Validates a UUID supplied as a raw string.
pub fn check_uuid(validator: &mut Validator, field: &str, raw: &str) {
    if uuid::Uuid::parse_str(raw).is_err() {
        validator.push(
            field,
            format!("'{raw}' is not a valid UUID"),
            "UUID must be in format: xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx.",
        );
    }
}

/// Validates an RFC 3339 timestamp supplied as a raw string.
pub fn check_datetime(validator: &mut Validator, field: &str, raw: &str) {
    if chrono::DateTime::parse_from_rfc3339(raw).is_err() {
        validator.push(
            field,
            format!("'{raw}' is not a valid timestamp"),
            "Timestamps must be in ISO 8601 / RFC 3339 format (e.g. 2024-01-31T12:00:00Z).",
        );
    }
}

/// Validates a full record before it is written to the dataset.
///
/// Typed fields already constrain most of the model; what remains is the
/// relationship target invariant.
pub fn validate_record(record: &FrameRecord) -> Result<(), ValidationReport> {
    let mut validator = Validator::new();
    for (i, rel) in record.relationships.iter().enumerate() {
        check_relationship(&mut validator, &format!("relationships[{i}]"), rel);
    }
    validator.finish()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelationshipType;

    #[test]
    fn test_custom_metadata_number_rejected_with_path() {
        let mut v = Validator::new();
        check_custom_metadata(&mut v, "custom_metadata", &json!({"priority": 1}));
        let report = v.finish().unwrap_err();
        let d = &report.diagnostics()[0];
        assert_eq!(d.field, "custom_metadata.priority");
        assert!(d.hint.contains("string"));
    }

    #[test]
    fn test_custom_metadata_strings_accepted() {
        let mut v = Validator::new();
        check_custom_metadata(&mut v, "custom_metadata", &json!({"priority": "1"}));
        assert!(v.finish().is_ok());
    }

    #[test]
    fn test_multi_field_report_is_ordered() {
        let mut v = Validator::new();
        check_custom_metadata(
            &mut v,
            "custom_metadata",
            &json!({"a": 1, "b": true, "c": "fine"}),
        );
        check_status(&mut v, "status", "live");
        let report = v.finish().unwrap_err();
        let fields: Vec<_> = report.diagnostics().iter().map(|d| d.field.clone()).collect();
        assert_eq!(fields, vec!["custom_metadata.a", "custom_metadata.b", "status"]);
        let rendered = report.to_string();
        assert!(rendered.contains("  - custom_metadata.a"));
        assert!(rendered.contains("  - status"));
    }

    #[test]
    fn test_relationship_without_target() {
        let rel = Relationship {
            relationship_type: RelationshipType::Related,
            target_uuid: None,
            target_uri: None,
            target_path: None,
            target_cid: None,
            title: None,
            description: None,
        };
        let mut v = Validator::new();
        check_relationship(&mut v, "relationships[0]", &rel);
        let report = v.finish().unwrap_err();
        assert!(report.to_string().contains("target_uuid"));
    }

    #[test]
    fn test_relationship_type_diagnostic_lists_valid_set() {
        let mut v = Validator::new();
        check_relationship_type(&mut v, "relationships[0].type", "sibling");
        let report = v.finish().unwrap_err();
        assert!(report.to_string().contains("member_of"));
    }

    #[test]
    fn test_uuid_and_date_formats() {
        let mut v = Validator::new();
        check_uuid(&mut v, "document_id", "not-a-uuid");
        check_datetime(&mut v, "start_time", "31/01/2024");
        let report = v.finish().unwrap_err();
        assert_eq!(report.diagnostics().len(), 2);
        assert!(report.to_string().contains("xxxxxxxx-xxxx"));
        assert!(report.to_string().contains("ISO 8601"));
    }
}
