//! Data models for Airtable API entities.
//!
//! All models use `#[serde(default)]` for optional fields and
//! `#[serde(rename_all = "camelCase")]` to match API naming.

mod inputs;

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use inputs::*;

/// An Airtable base visible to the configured API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Base {
    /// Base ID (`appXXXXXXXXXXXXXX`).
    pub id: String,

    /// Base name.
    pub name: String,

    /// Permission the API key holds on this base.
    #[serde(default)]
    pub permission_level: Option<String>,
}

/// Response from the base listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasesResponse {
    /// Accessible bases.
    #[serde(default)]
    pub bases: Vec<Base>,

    /// Pagination offset, present when more bases exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

/// A field definition in a table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    /// Field ID (`fldXXXXXXXXXXXXXX`).
    pub id: String,

    /// Field name.
    pub name: String,

    /// Field type (e.g. `singleLineText`, `number`, `multipleSelects`).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,

    /// Field description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Type-specific options, passed through untyped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// A view in a table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSchema {
    /// View ID (`viwXXXXXXXXXXXXXX`).
    pub id: String,

    /// View name.
    pub name: String,

    /// View type (e.g. `grid`, `calendar`).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub view_type: Option<String>,
}

/// A table schema. With reduced detail levels Airtable omits most fields,
/// so everything beyond id and name is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Table ID (`tblXXXXXXXXXXXXXX`).
    pub id: String,

    /// Table name.
    pub name: String,

    /// ID of the primary field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_field_id: Option<String>,

    /// Table description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Field definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSchema>,

    /// Views.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<ViewSchema>,
}

/// Response from the table listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesResponse {
    /// Tables in the base.
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

/// A record in a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Record ID (`recXXXXXXXXXXXXXX`).
    pub id: String,

    /// Creation timestamp (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,

    /// Cell values keyed by field name.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Response from record listing/search/mutation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    /// Records returned by the call.
    #[serde(default)]
    pub records: Vec<Record>,

    /// Pagination offset, present when more records exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

/// One deletion result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedRecord {
    /// Record ID that was deleted.
    pub id: String,

    /// Always true on success.
    #[serde(default)]
    pub deleted: bool,
}

/// Response from the record deletion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedRecordsResponse {
    /// Deletion results.
    #[serde(default)]
    pub records: Vec<DeletedRecord>,
}

/// A record update: id plus the fields to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPatch {
    /// Record ID to update.
    pub id: String,

    /// Fields to write.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// A field definition for table/field creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,

    /// Field type.
    #[serde(rename = "type")]
    pub field_type: String,

    /// Field description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Type-specific options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// Sort order for record listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// Wire value for Airtable query parameters.
    #[must_use]
    pub const fn as_param(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One sort clause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field name to sort by.
    pub field: String,

    /// Sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

/// How much table schema detail to request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DetailLevel {
    /// Only table ids and names.
    TableIdentifiersOnly,
    /// Table, field, and view ids and names.
    IdentifiersOnly,
    /// Complete schema.
    #[default]
    Full,
}

impl DetailLevel {
    /// Query parameter value, or `None` for the full default.
    #[must_use]
    pub const fn as_param(self) -> Option<&'static str> {
        match self {
            Self::TableIdentifiersOnly => Some("tableIdentifiersOnly"),
            Self::IdentifiersOnly => Some("identifiersOnly"),
            Self::Full => None,
        }
    }
}

/// Options for record listing.
#[derive(Debug, Clone, Default)]
pub struct ListRecordsOptions {
    /// Airtable formula to filter records.
    pub filter_by_formula: Option<String>,

    /// Maximum records to return.
    pub max_records: Option<u32>,

    /// Sort clauses.
    pub sort: Vec<SortSpec>,

    /// View name or ID.
    pub view: Option<String>,
}

// ─── Identifier validation ───────────────────────────────────────────────────

fn id_regex() -> &'static Regex {
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    ID_RE.get_or_init(|| {
        Regex::new(r"^(app|tbl|viw|fld|rec)[a-zA-Z0-9]{14,}$").expect("valid id regex pattern")
    })
}

/// Check an Airtable identifier against the expected `prefix` (`app`,
/// `tbl`, `fld`, `rec`).
#[must_use]
pub fn is_valid_id(value: &str, prefix: &str) -> bool {
    value.starts_with(prefix) && id_regex().is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_validation() {
        assert!(is_valid_id("appABCDEF12345678", "app"));
        assert!(is_valid_id("tblABCDEF12345678", "tbl"));
        assert!(is_valid_id("recABCDEF12345678", "rec"));
        assert!(is_valid_id("fldABCDEF12345678", "fld"));

        // Wrong prefix for the expected kind
        assert!(!is_valid_id("tblABCDEF12345678", "app"));
        // Too short
        assert!(!is_valid_id("app123", "app"));
        // Illegal characters
        assert!(!is_valid_id("appABCDEF1234567!", "app"));
        assert!(!is_valid_id("", "app"));
    }

    #[test]
    fn test_detail_level_params() {
        assert_eq!(DetailLevel::Full.as_param(), None);
        assert_eq!(
            DetailLevel::TableIdentifiersOnly.as_param(),
            Some("tableIdentifiersOnly")
        );
        assert_eq!(DetailLevel::IdentifiersOnly.as_param(), Some("identifiersOnly"));
    }

    #[test]
    fn test_detail_level_wire_names() {
        let parsed: DetailLevel = serde_json::from_str("\"tableIdentifiersOnly\"").unwrap();
        assert_eq!(parsed, DetailLevel::TableIdentifiersOnly);
        let parsed: DetailLevel = serde_json::from_str("\"full\"").unwrap();
        assert_eq!(parsed, DetailLevel::Full);
    }

    #[test]
    fn test_record_roundtrip() {
        let json = serde_json::json!({
            "id": "recABCDEF12345678",
            "createdTime": "2024-01-15T10:30:00.000Z",
            "fields": {"Name": "Widget", "Count": 3}
        });
        let record: Record = serde_json::from_value(json).unwrap();
        assert_eq!(record.id, "recABCDEF12345678");
        assert_eq!(record.fields.get("Count"), Some(&serde_json::json!(3)));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back.get("createdTime").and_then(|v| v.as_str()),
            Some("2024-01-15T10:30:00.000Z"));
    }

    #[test]
    fn test_table_schema_partial_detail() {
        // tableIdentifiersOnly responses carry only id and name
        let json = serde_json::json!({"id": "tblABCDEF12345678", "name": "Tasks"});
        let table: TableSchema = serde_json::from_value(json).unwrap();
        assert!(table.fields.is_empty());
        assert!(table.views.is_empty());
        assert!(table.primary_field_id.is_none());
    }
}
