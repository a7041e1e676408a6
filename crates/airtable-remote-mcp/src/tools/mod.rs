//! MCP tool implementations.
//!
//! Each tool module provides types that:
//! 1. Parse and validate input parameters
//! 2. Call the Airtable API client
//! 3. Format results as pretty-printed JSON

mod records;
mod schema;

pub use records::*;
pub use schema::*;

use std::sync::Arc;

use crate::client::AirtableClient;
use crate::error::ToolResult;

/// Tool execution context.
pub struct ToolContext {
    /// API client.
    pub client: Arc<AirtableClient>,
}

impl ToolContext {
    /// Create a new tool context.
    #[must_use]
    pub fn new(client: Arc<AirtableClient>) -> Self {
        Self { client }
    }
}

/// Trait for MCP tools.
#[async_trait::async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (e.g., "list_records").
    fn name(&self) -> &'static str;

    /// Tool description for LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> serde_json::Value;

    /// Whether the tool mutates Airtable data. Calls to mutating tools
    /// require the `mcp:write` or `mcp:admin` scope.
    fn requires_write(&self) -> bool {
        false
    }

    /// Execute the tool with given input.
    async fn execute(
        &self,
        ctx: &ToolContext,
        input: serde_json::Value,
    ) -> ToolResult<String>;
}

/// Register all tools.
#[must_use]
pub fn register_all_tools() -> Vec<Box<dyn McpTool>> {
    vec![
        // Base and schema tools (3)
        Box::new(schema::ListBasesTool),
        Box::new(schema::ListTablesTool),
        Box::new(schema::DescribeTableTool),

        // Record tools (6)
        Box::new(records::ListRecordsTool),
        Box::new(records::SearchRecordsTool),
        Box::new(records::GetRecordTool),
        Box::new(records::CreateRecordTool),
        Box::new(records::UpdateRecordsTool),
        Box::new(records::DeleteRecordsTool),

        // Schema mutation tools (4)
        Box::new(schema::CreateTableTool),
        Box::new(schema::UpdateTableTool),
        Box::new(schema::CreateFieldTool),
        Box::new(schema::UpdateFieldTool),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order_matches_announcement() {
        let tools = register_all_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();

        assert_eq!(
            names,
            vec![
                "list_bases",
                "list_tables",
                "describe_table",
                "list_records",
                "search_records",
                "get_record",
                "create_record",
                "update_records",
                "delete_records",
                "create_table",
                "update_table",
                "create_field",
                "update_field",
            ]
        );
    }

    #[test]
    fn test_write_tools_flagged() {
        let tools = register_all_tools();

        for tool in &tools {
            let mutating = matches!(
                tool.name(),
                "create_record"
                    | "update_records"
                    | "delete_records"
                    | "create_table"
                    | "update_table"
                    | "create_field"
                    | "update_field"
            );
            assert_eq!(tool.requires_write(), mutating, "tool: {}", tool.name());
        }
    }

    #[test]
    fn test_all_schemas_are_objects() {
        for tool in register_all_tools() {
            let schema = tool.input_schema();
            assert_eq!(schema["type"], "object", "tool: {}", tool.name());
            assert!(schema["properties"].is_object(), "tool: {}", tool.name());
            assert!(schema["required"].is_array(), "tool: {}", tool.name());
        }
    }
}
