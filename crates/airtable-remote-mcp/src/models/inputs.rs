//! Input models for MCP tool parameters.
//!
//! Property names follow the wire schema (camelCase) announced in
//! `tools/list`.

use serde::{Deserialize, Serialize};

use super::{DetailLevel, FieldSpec, RecordPatch, SortSpec};

/// Input for listing tables in a base.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTablesInput {
    /// The Airtable base ID.
    pub base_id: String,

    /// Level of schema detail to return.
    #[serde(default)]
    pub detail_level: DetailLevel,
}

/// Input for describing a single table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeTableInput {
    /// The Airtable base ID.
    pub base_id: String,

    /// The table ID.
    pub table_id: String,

    /// Level of schema detail to return.
    #[serde(default)]
    pub detail_level: DetailLevel,
}

/// Input for listing records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecordsInput {
    /// The Airtable base ID.
    pub base_id: String,

    /// The table ID.
    pub table_id: String,

    /// Airtable formula to filter records.
    #[serde(default)]
    pub filter_by_formula: Option<String>,

    /// Maximum number of records to return.
    #[serde(default)]
    pub max_records: Option<u32>,

    /// Sort clauses.
    #[serde(default)]
    pub sort: Vec<SortSpec>,

    /// View name or ID to read from.
    #[serde(default)]
    pub view: Option<String>,
}

/// Input for text search over records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRecordsInput {
    /// The Airtable base ID.
    pub base_id: String,

    /// The table ID.
    pub table_id: String,

    /// Text to search for.
    pub search_term: String,

    /// Specific field IDs to search in. Defaults to the record ID.
    #[serde(default)]
    pub field_ids: Vec<String>,

    /// Maximum number of records to return.
    #[serde(default)]
    pub max_records: Option<u32>,

    /// View name or ID to read from.
    #[serde(default)]
    pub view: Option<String>,
}

/// Input for fetching one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRecordInput {
    /// The Airtable base ID.
    pub base_id: String,

    /// The table ID.
    pub table_id: String,

    /// The record ID.
    pub record_id: String,
}

/// Input for creating a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordInput {
    /// The Airtable base ID.
    pub base_id: String,

    /// The table ID.
    pub table_id: String,

    /// Record fields as key-value pairs.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Input for updating up to 10 records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordsInput {
    /// The Airtable base ID.
    pub base_id: String,

    /// The table ID.
    pub table_id: String,

    /// Records to update.
    pub records: Vec<RecordPatch>,
}

/// Input for deleting up to 10 records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRecordsInput {
    /// The Airtable base ID.
    pub base_id: String,

    /// The table ID.
    pub table_id: String,

    /// Record IDs to delete.
    pub record_ids: Vec<String>,
}

/// Input for creating a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTableInput {
    /// The Airtable base ID.
    pub base_id: String,

    /// Table name.
    pub name: String,

    /// Table description.
    #[serde(default)]
    pub description: Option<String>,

    /// Field definitions for the new table.
    pub fields: Vec<FieldSpec>,
}

/// Input for renaming/redescribing a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTableInput {
    /// The Airtable base ID.
    pub base_id: String,

    /// The table ID.
    pub table_id: String,

    /// New table name.
    #[serde(default)]
    pub name: Option<String>,

    /// New table description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Input for adding a field to a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFieldInput {
    /// The Airtable base ID.
    pub base_id: String,

    /// The table ID.
    pub table_id: String,

    /// The field definition.
    pub field: FieldSpec,
}

/// Input for renaming/redescribing a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFieldInput {
    /// The Airtable base ID.
    pub base_id: String,

    /// The table ID.
    pub table_id: String,

    /// The field ID.
    pub field_id: String,

    /// New field name.
    #[serde(default)]
    pub name: Option<String>,

    /// New field description.
    #[serde(default)]
    pub description: Option<String>,
}
