//! Schema tools: list_bases, list_tables, describe_table, create_table,
//! update_table, create_field, update_field.

use serde_json::json;

use super::{McpTool, ToolContext};
use crate::error::{ToolError, ToolResult};
use crate::models::{
    CreateFieldInput, CreateTableInput, DescribeTableInput, ListTablesInput, UpdateFieldInput,
    UpdateTableInput,
};

/// Base listing tool.
pub struct ListBasesTool;

#[async_trait::async_trait]
impl McpTool for ListBasesTool {
    fn name(&self) -> &'static str {
        "list_bases"
    }

    fn description(&self) -> &'static str {
        "List all accessible Airtable bases"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> ToolResult<String> {
        let bases = ctx.client.list_bases().await.map_err(ToolError::from)?;
        Ok(serde_json::to_string_pretty(&bases)?)
    }
}

/// Table listing tool.
pub struct ListTablesTool;

#[async_trait::async_trait]
impl McpTool for ListTablesTool {
    fn name(&self) -> &'static str {
        "list_tables"
    }

    fn description(&self) -> &'static str {
        "List all tables in a specific base"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "detailLevel": {
                    "type": "string",
                    "enum": ["tableIdentifiersOnly", "identifiersOnly", "full"],
                    "default": "full",
                    "description": "Level of detail to return"
                }
            },
            "required": ["baseId"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: ListTablesInput = serde_json::from_value(input)?;

        let tables = ctx
            .client
            .list_tables(&params.base_id, params.detail_level)
            .await
            .map_err(ToolError::from)?;

        Ok(serde_json::to_string_pretty(&tables)?)
    }
}

/// Table schema inspection tool.
pub struct DescribeTableTool;

#[async_trait::async_trait]
impl McpTool for DescribeTableTool {
    fn name(&self) -> &'static str {
        "describe_table"
    }

    fn description(&self) -> &'static str {
        "Get detailed information about a specific table"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "detailLevel": {
                    "type": "string",
                    "enum": ["tableIdentifiersOnly", "identifiersOnly", "full"],
                    "default": "full"
                }
            },
            "required": ["baseId", "tableId"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: DescribeTableInput = serde_json::from_value(input)?;

        let table = ctx
            .client
            .describe_table(&params.base_id, &params.table_id, params.detail_level)
            .await
            .map_err(ToolError::from)?;

        Ok(serde_json::to_string_pretty(&table)?)
    }
}

/// Table creation tool.
pub struct CreateTableTool;

#[async_trait::async_trait]
impl McpTool for CreateTableTool {
    fn name(&self) -> &'static str {
        "create_table"
    }

    fn description(&self) -> &'static str {
        "Create a new table in a base"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "name": {"type": "string", "description": "Table name"},
                "description": {"type": "string", "description": "Table description"},
                "fields": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "type": {"type": "string"},
                            "description": {"type": "string"},
                            "options": {"type": "object"}
                        },
                        "required": ["name", "type"]
                    },
                    "description": "Table fields definition"
                }
            },
            "required": ["baseId", "name", "fields"]
        })
    }

    fn requires_write(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: CreateTableInput = serde_json::from_value(input)?;

        let table = ctx
            .client
            .create_table(
                &params.base_id,
                &params.name,
                params.description.as_deref(),
                &params.fields,
            )
            .await
            .map_err(ToolError::from)?;

        Ok(serde_json::to_string_pretty(&table)?)
    }
}

/// Table rename/redescribe tool.
pub struct UpdateTableTool;

#[async_trait::async_trait]
impl McpTool for UpdateTableTool {
    fn name(&self) -> &'static str {
        "update_table"
    }

    fn description(&self) -> &'static str {
        "Update table name or description"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "name": {"type": "string", "description": "New table name"},
                "description": {"type": "string", "description": "New table description"}
            },
            "required": ["baseId", "tableId"]
        })
    }

    fn requires_write(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: UpdateTableInput = serde_json::from_value(input)?;

        let table = ctx
            .client
            .update_table(
                &params.base_id,
                &params.table_id,
                params.name.as_deref(),
                params.description.as_deref(),
            )
            .await
            .map_err(ToolError::from)?;

        Ok(serde_json::to_string_pretty(&table)?)
    }
}

/// Field creation tool.
pub struct CreateFieldTool;

#[async_trait::async_trait]
impl McpTool for CreateFieldTool {
    fn name(&self) -> &'static str {
        "create_field"
    }

    fn description(&self) -> &'static str {
        "Add a new field to a table"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "field": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "type": {"type": "string"},
                        "description": {"type": "string"},
                        "options": {"type": "object"}
                    },
                    "required": ["name", "type"]
                }
            },
            "required": ["baseId", "tableId", "field"]
        })
    }

    fn requires_write(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: CreateFieldInput = serde_json::from_value(input)?;

        let field = ctx
            .client
            .create_field(&params.base_id, &params.table_id, &params.field)
            .await
            .map_err(ToolError::from)?;

        Ok(serde_json::to_string_pretty(&field)?)
    }
}

/// Field rename/redescribe tool.
pub struct UpdateFieldTool;

#[async_trait::async_trait]
impl McpTool for UpdateFieldTool {
    fn name(&self) -> &'static str {
        "update_field"
    }

    fn description(&self) -> &'static str {
        "Update field name or description"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "fieldId": {"type": "string", "description": "The field ID"},
                "name": {"type": "string", "description": "New field name"},
                "description": {"type": "string", "description": "New field description"}
            },
            "required": ["baseId", "tableId", "fieldId"]
        })
    }

    fn requires_write(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: UpdateFieldInput = serde_json::from_value(input)?;

        let field = ctx
            .client
            .update_field(
                &params.base_id,
                &params.table_id,
                &params.field_id,
                params.name.as_deref(),
                params.description.as_deref(),
            )
            .await
            .map_err(ToolError::from)?;

        Ok(serde_json::to_string_pretty(&field)?)
    }
}
