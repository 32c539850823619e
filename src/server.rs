//! MCP service surface.
//!
//! Implements `rmcp::ServerHandler` with a single tool, `verilog_compilation`:
//! a required `verilog_code` string in, the structured
//! [`CompilationReport`](crate::verilator::CompilationReport) out, serialized
//! as JSON text content. Each tool call runs as an independent future, so
//! concurrent compilations never serialize behind a lock.

use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, JsonObject, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::transport::stdio;
use rmcp::{ErrorData, RoleServer, ServerHandler, ServiceExt};
use serde::Deserialize;
use tracing::info;

use crate::source::ScratchDir;
use crate::verilator::{compile_verilog, VerilatorOptions};

const COMPILATION_TOOL: &str = "verilog_compilation";

#[derive(Debug, Deserialize)]
pub struct VerilogCompilationRequest {
    pub verilog_code: String,
}

/// Input schema for the compilation tool: one required string property.
fn compilation_input_schema() -> JsonObject {
    let mut code = JsonObject::new();
    code.insert("type".to_string(), "string".into());
    code.insert(
        "description".to_string(),
        "Verilog source code to compile".into(),
    );

    let mut properties = JsonObject::new();
    properties.insert("verilog_code".to_string(), code.into());

    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), "object".into());
    schema.insert("properties".to_string(), properties.into());
    schema.insert(
        "required".to_string(),
        serde_json::Value::Array(vec!["verilog_code".into()]),
    );
    schema
}

/// MCP server handle; cheap to clone, one per transport session.
#[derive(Debug, Clone)]
pub struct VerilatorServer {
    scratch: ScratchDir,
    options: Arc<VerilatorOptions>,
}

impl VerilatorServer {
    pub fn new(scratch: ScratchDir, options: VerilatorOptions) -> Self {
        Self {
            scratch,
            options: Arc::new(options),
        }
    }

    async fn verilog_compilation(
        &self,
        request: VerilogCompilationRequest,
    ) -> Result<CallToolResult, ErrorData> {
        let report = compile_verilog(&request.verilog_code, &self.scratch, &self.options).await;
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|err| ErrorData::internal_error(err.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(rendered)]))
    }
}

impl ServerHandler for VerilatorServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Verilator for Verilog simulation. Call verilog_compilation with Verilog \
                 source code to compile it and collect the compiler's diagnostics."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            next_cursor: None,
            tools: vec![Tool::new(
                COMPILATION_TOOL,
                "Compile Verilog code using Verilator and report the outcome",
                compilation_input_schema(),
            )],
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        match request.name.as_ref() {
            COMPILATION_TOOL => {
                let arguments = request.arguments.unwrap_or_default();
                let request: VerilogCompilationRequest =
                    serde_json::from_value(serde_json::Value::Object(arguments))
                        .map_err(|err| ErrorData::invalid_params(err.to_string(), None))?;
                self.verilog_compilation(request).await
            }
            other => Err(ErrorData::invalid_params(
                format!("unknown tool: {}", other),
                None,
            )),
        }
    }
}

/// Serve the MCP protocol over stdin/stdout until the client disconnects.
pub async fn serve_stdio(server: VerilatorServer) -> anyhow::Result<()> {
    info!("Serving MCP on stdio");
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_creation() {
        let _ = VerilatorServer::new(ScratchDir::default(), VerilatorOptions::default());
    }

    #[test]
    fn test_request_deserializes_from_tool_arguments() {
        let request: VerilogCompilationRequest = serde_json::from_value(serde_json::json!({
            "verilog_code": "module m(); endmodule"
        }))
        .unwrap();
        assert_eq!(request.verilog_code, "module m(); endmodule");
    }

    #[test]
    fn test_input_schema_requires_verilog_code() {
        let schema = compilation_input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(
            schema["required"],
            serde_json::Value::Array(vec!["verilog_code".into()])
        );
        assert!(schema["properties"]["verilog_code"].is_object());
    }
}
