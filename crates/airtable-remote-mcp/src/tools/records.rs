//! Record tools: list_records, search_records, get_record, create_record,
//! update_records, delete_records.

use serde_json::json;

use super::{McpTool, ToolContext};
use crate::error::{ToolError, ToolResult};
use crate::models::{
    CreateRecordInput, DeleteRecordsInput, GetRecordInput, ListRecordsInput, ListRecordsOptions,
    SearchRecordsInput, UpdateRecordsInput,
};

/// Record listing tool.
pub struct ListRecordsTool;

#[async_trait::async_trait]
impl McpTool for ListRecordsTool {
    fn name(&self) -> &'static str {
        "list_records"
    }

    fn description(&self) -> &'static str {
        "List records from a table with optional filtering and sorting"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "filterByFormula": {"type": "string", "description": "Airtable formula to filter records"},
                "maxRecords": {"type": "number", "description": "Maximum number of records to return"},
                "sort": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "field": {"type": "string"},
                            "direction": {"type": "string", "enum": ["asc", "desc"]}
                        },
                        "required": ["field"]
                    }
                },
                "view": {"type": "string", "description": "View name or ID to use"}
            },
            "required": ["baseId", "tableId"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: ListRecordsInput = serde_json::from_value(input)?;

        let options = ListRecordsOptions {
            filter_by_formula: params.filter_by_formula,
            max_records: params.max_records,
            sort: params.sort,
            view: params.view,
        };

        let records = ctx
            .client
            .list_records(&params.base_id, &params.table_id, &options)
            .await
            .map_err(ToolError::from)?;

        Ok(serde_json::to_string_pretty(&records)?)
    }
}

/// Record text search tool.
pub struct SearchRecordsTool;

#[async_trait::async_trait]
impl McpTool for SearchRecordsTool {
    fn name(&self) -> &'static str {
        "search_records"
    }

    fn description(&self) -> &'static str {
        "Search for records containing specific text"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "searchTerm": {"type": "string", "description": "Text to search for"},
                "fieldIds": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Specific field IDs to search in"
                },
                "maxRecords": {"type": "number", "description": "Maximum number of records to return"},
                "view": {"type": "string", "description": "View name or ID to use"}
            },
            "required": ["baseId", "tableId", "searchTerm"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: SearchRecordsInput = serde_json::from_value(input)?;

        let records = ctx
            .client
            .search_records(
                &params.base_id,
                &params.table_id,
                &params.search_term,
                &params.field_ids,
                params.max_records,
                params.view.as_deref(),
            )
            .await
            .map_err(ToolError::from)?;

        Ok(serde_json::to_string_pretty(&records)?)
    }
}

/// Single-record fetch tool.
pub struct GetRecordTool;

#[async_trait::async_trait]
impl McpTool for GetRecordTool {
    fn name(&self) -> &'static str {
        "get_record"
    }

    fn description(&self) -> &'static str {
        "Get a specific record by ID"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "recordId": {"type": "string", "description": "The record ID"}
            },
            "required": ["baseId", "tableId", "recordId"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: GetRecordInput = serde_json::from_value(input)?;

        let record = ctx
            .client
            .get_record(&params.base_id, &params.table_id, &params.record_id)
            .await
            .map_err(ToolError::from)?;

        Ok(serde_json::to_string_pretty(&record)?)
    }
}

/// Record creation tool.
pub struct CreateRecordTool;

#[async_trait::async_trait]
impl McpTool for CreateRecordTool {
    fn name(&self) -> &'static str {
        "create_record"
    }

    fn description(&self) -> &'static str {
        "Create a new record in a table"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "fields": {"type": "object", "description": "Record fields as key-value pairs"}
            },
            "required": ["baseId", "tableId", "fields"]
        })
    }

    fn requires_write(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: CreateRecordInput = serde_json::from_value(input)?;

        let record = ctx
            .client
            .create_record(&params.base_id, &params.table_id, &params.fields)
            .await
            .map_err(ToolError::from)?;

        Ok(serde_json::to_string_pretty(&record)?)
    }
}

/// Batch record update tool.
pub struct UpdateRecordsTool;

#[async_trait::async_trait]
impl McpTool for UpdateRecordsTool {
    fn name(&self) -> &'static str {
        "update_records"
    }

    fn description(&self) -> &'static str {
        "Update existing records (up to 10 at once)"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "records": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string", "description": "Record ID"},
                            "fields": {"type": "object", "description": "Fields to update"}
                        },
                        "required": ["id", "fields"]
                    },
                    "maxItems": 10
                }
            },
            "required": ["baseId", "tableId", "records"]
        })
    }

    fn requires_write(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: UpdateRecordsInput = serde_json::from_value(input)?;

        let records = ctx
            .client
            .update_records(&params.base_id, &params.table_id, &params.records)
            .await
            .map_err(ToolError::from)?;

        Ok(serde_json::to_string_pretty(&records)?)
    }
}

/// Batch record deletion tool.
pub struct DeleteRecordsTool;

#[async_trait::async_trait]
impl McpTool for DeleteRecordsTool {
    fn name(&self) -> &'static str {
        "delete_records"
    }

    fn description(&self) -> &'static str {
        "Delete records from a table"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "recordIds": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Array of record IDs to delete"
                }
            },
            "required": ["baseId", "tableId", "recordIds"]
        })
    }

    fn requires_write(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: DeleteRecordsInput = serde_json::from_value(input)?;

        let deleted = ctx
            .client
            .delete_records(&params.base_id, &params.table_id, &params.record_ids)
            .await
            .map_err(ToolError::from)?;

        Ok(serde_json::to_string_pretty(&deleted)?)
    }
}
