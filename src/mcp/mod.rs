//! MCP protocol layer: JSON-RPC types, tool registry, stdio and HTTP/SSE
//! transports. No algorithmic content lives here; every tool delegates to
//! the query service.

pub mod http;
pub mod server;
pub mod tools;
pub mod types;

pub use http::HttpMcpServer;
pub use server::McpServer;
