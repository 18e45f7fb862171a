//! MCP server: JSON-RPC routing plus the stdio transport loop.

use crate::error::{GedmcpError, Result};
use crate::mcp::tools;
use crate::mcp::types::*;
use crate::service::GedmcpService;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};

/// MCP server over a query service.
pub struct McpServer {
    service: Arc<GedmcpService>,
}

impl McpServer {
    pub fn new(service: Arc<GedmcpService>) -> Self {
        Self { service }
    }

    /// Process one MCP JSON-RPC request (transport-agnostic).
    ///
    /// Returns `Ok(None)` for notifications, which get no response. Handler
    /// errors come back as JSON-RPC error responses, never as `Err`.
    pub async fn process_mcp_request(
        &self,
        request: JsonRpcRequest,
        initialized: &mut bool,
    ) -> Result<Option<JsonRpcResponse>> {
        let id = match &request.id {
            Some(id) => id.clone(),
            None => {
                if request.method == "notifications/initialized" {
                    *initialized = true;
                }
                return Ok(None);
            }
        };

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(&id, &request.params),
            "tools/list" => self.handle_tools_list(&id),
            "tools/call" => self.handle_tools_call(&id, &request.params).await,
            "shutdown" => Ok(JsonRpcResponse::result(id.clone(), Value::Null)),
            _ => Ok(JsonRpcResponse::error(
                id.clone(),
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            )),
        };

        Ok(Some(response.unwrap_or_else(|e| {
            JsonRpcResponse::error(
                id,
                error_codes::INTERNAL_ERROR,
                format!("Internal error: {}", e),
            )
        })))
    }

    /// Run the MCP server over stdin/stdout. Logs go to stderr per spec.
    pub async fn run(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdin_reader = AsyncBufReader::new(stdin);
        let mut stdout = tokio::io::stdout();

        let mut line = String::new();
        let mut initialized = false;

        log::info!("GedMCP MCP server v{} listening on stdio", env!("CARGO_PKG_VERSION"));

        loop {
            line.clear();
            let bytes_read = stdin_reader
                .read_line(&mut line)
                .await
                .map_err(GedmcpError::Io)?;

            // EOF - client disconnected
            if bytes_read == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(req) => req,
                Err(e) => {
                    if let Some(id) = extract_id_from_line(trimmed) {
                        let response = JsonRpcResponse::error(
                            id,
                            error_codes::PARSE_ERROR,
                            format!("Parse error: {}", e),
                        );
                        send_response(&mut stdout, &response).await?;
                    }
                    continue;
                }
            };

            match self.process_mcp_request(request, &mut initialized).await {
                Ok(Some(response)) => send_response(&mut stdout, &response).await?,
                Ok(None) => {
                    if initialized {
                        log::debug!("Client initialized");
                    }
                }
                Err(e) => log::error!("Unexpected error in process_mcp_request: {}", e),
            }
        }

        log::info!("MCP server shutting down");
        Ok(())
    }

    fn handle_initialize(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: InitializeParams =
            serde_json::from_value(params.clone().unwrap_or_else(|| serde_json::json!({})))
                .map_err(|e| GedmcpError::McpProtocol(format!("Invalid initialize params: {}", e)))?;

        // Pin known protocol generations to the stable version we implement
        let protocol_version = if params.protocol_version.starts_with("2024")
            || params.protocol_version.starts_with("2025")
        {
            "2024-11-05".to_string()
        } else {
            params.protocol_version.clone()
        };

        let result = InitializeResult {
            protocol_version,
            capabilities: serde_json::json!({ "tools": {} }),
            server_info: ServerInfo {
                name: "gedmcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok(JsonRpcResponse::result(
            id.clone(),
            serde_json::to_value(&result)
                .map_err(|e| GedmcpError::McpProtocol(format!("JSON serialization error: {}", e)))?,
        ))
    }

    fn handle_tools_list(&self, id: &JsonRpcId) -> Result<JsonRpcResponse> {
        let result = ToolsListResult {
            tools: tools::get_tool_definitions(),
        };
        Ok(JsonRpcResponse::result(
            id.clone(),
            serde_json::to_value(&result)
                .map_err(|e| GedmcpError::McpProtocol(format!("JSON serialization error: {}", e)))?,
        ))
    }

    async fn handle_tools_call(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: ToolsCallParams = serde_json::from_value(
            params
                .clone()
                .ok_or_else(|| GedmcpError::McpProtocol("Missing params for tools/call".to_string()))?,
        )
        .map_err(|e| GedmcpError::McpProtocol(format!("Invalid tools/call params: {}", e)))?;

        let service = self.service.as_ref();
        let args = &params.arguments;
        let result = match params.name.as_str() {
            "gedmcp_find_path" => tools::handle_find_path(service, args).await,
            "gedmcp_common_ancestors" => tools::handle_common_ancestors(service, args).await,
            "gedmcp_ancestor_tree" => tools::handle_ancestor_tree(service, args).await,
            "gedmcp_descendant_tree" => tools::handle_descendant_tree(service, args).await,
            "gedmcp_find_duplicates" => tools::handle_find_duplicates(service, args).await,
            "gedmcp_invalidate" => tools::handle_invalidate(service, args).await,
            "gedmcp_get_person" => tools::handle_get_person(service, args).await,
            "gedmcp_timeline" => tools::handle_timeline(service, args).await,
            "gedmcp_statistics" => tools::handle_statistics(service, args).await,
            _ => {
                return Ok(JsonRpcResponse::error(
                    id.clone(),
                    error_codes::INVALID_PARAMS,
                    format!("Unknown tool: {}", params.name),
                ));
            }
        };

        // Bad tool arguments are the caller's problem, not an internal error
        let result = match result {
            Ok(result) => result,
            Err(GedmcpError::InvalidInput(msg)) => {
                return Ok(JsonRpcResponse::error(
                    id.clone(),
                    error_codes::INVALID_PARAMS,
                    msg,
                ));
            }
            Err(e) => return Err(e),
        };

        Ok(JsonRpcResponse::result(
            id.clone(),
            serde_json::to_value(&result)
                .map_err(|e| GedmcpError::McpProtocol(format!("JSON serialization error: {}", e)))?,
        ))
    }
}

/// Send JSON-RPC response to stdout (newline-delimited)
async fn send_response(stdout: &mut tokio::io::Stdout, response: &JsonRpcResponse) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| GedmcpError::McpProtocol(format!("JSON serialization error: {}", e)))?;
    stdout.write_all(json.as_bytes()).await.map_err(GedmcpError::Io)?;
    stdout.write_all(b"\n").await.map_err(GedmcpError::Io)?;
    stdout.flush().await.map_err(GedmcpError::Io)?;
    Ok(())
}

/// Extract ID from JSON line (for error handling)
fn extract_id_from_line(line: &str) -> Option<Value> {
    if let Some(id_start) = line.find(r#""id":"#) {
        let id_str = &line[id_start + 5..];
        if let Some(id_end) = id_str.find(',') {
            let id_val = id_str[..id_end].trim();
            if id_val.starts_with('"') && id_val.ends_with('"') {
                return Some(Value::String(id_val[1..id_val.len() - 1].to_string()));
            } else if let Ok(num) = id_val.parse::<i64>() {
                return Some(Value::Number(num.into()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, DocumentCache};
    use crate::decode::GedcomDecoder;
    use crate::dedup::DuplicateWeights;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    fn server(temp_dir: &TempDir) -> McpServer {
        std::fs::write(
            temp_dir.path().join("family.ged"),
            "0 @I1@ INDI\n1 NAME John /Smith/\n",
        )
        .unwrap();
        let cache = Arc::new(DocumentCache::new(
            Arc::new(LocalStorage::new(temp_dir.path())),
            Arc::new(GedcomDecoder),
            CacheConfig::default(),
        ));
        McpServer::new(Arc::new(GedmcpService::new(
            cache,
            4,
            DuplicateWeights::default(),
            75.0,
        )))
    }

    fn request(json: &str) -> JsonRpcRequest {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(&temp_dir);
        let mut initialized = false;

        let req = request(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18"}}"#,
        );
        let response = server
            .process_mcp_request(req, &mut initialized)
            .await
            .unwrap()
            .unwrap();
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(encoded["result"]["serverInfo"]["name"], "gedmcp");
    }

    #[tokio::test]
    async fn test_notification_sets_initialized() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(&temp_dir);
        let mut initialized = false;

        let req = request(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
        let response = server.process_mcp_request(req, &mut initialized).await.unwrap();
        assert!(response.is_none());
        assert!(initialized);
    }

    #[tokio::test]
    async fn test_tools_list() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(&temp_dir);
        let mut initialized = true;

        let req = request(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#);
        let response = server
            .process_mcp_request(req, &mut initialized)
            .await
            .unwrap()
            .unwrap();
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["result"]["tools"].as_array().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn test_tools_call_statistics() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(&temp_dir);
        let mut initialized = true;

        let req = request(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"gedmcp_statistics","arguments":{"source_id":"family.ged"}}}"#,
        );
        let response = server
            .process_mcp_request(req, &mut initialized)
            .await
            .unwrap()
            .unwrap();
        let encoded = serde_json::to_value(&response).unwrap();
        let text = encoded["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Individuals: 1"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(&temp_dir);
        let mut initialized = true;

        let req = request(r#"{"jsonrpc":"2.0","id":4,"method":"bogus/method"}"#);
        let response = server
            .process_mcp_request(req, &mut initialized)
            .await
            .unwrap()
            .unwrap();
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["error"]["code"], error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(&temp_dir);
        let mut initialized = true;

        let req = request(
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"gedmcp_bogus","arguments":{}}}"#,
        );
        let response = server
            .process_mcp_request(req, &mut initialized)
            .await
            .unwrap()
            .unwrap();
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["error"]["code"], error_codes::INVALID_PARAMS);
    }

    #[test]
    fn test_extract_id_from_line() {
        let line = r#"{"jsonrpc":"2.0","id":"test-123","method":"test"}"#;
        assert_eq!(
            extract_id_from_line(line),
            Some(Value::String("test-123".to_string()))
        );

        let line = r#"{"jsonrpc":"2.0","id":42,"method":"test"}"#;
        assert_eq!(extract_id_from_line(line), Some(Value::Number(42.into())));
    }
}
