use thiserror::Error;

/// Main error type for GedMCP
#[derive(Error, Debug)]
pub enum GedmcpError {
    /// Person identifier absent from the resolved graph
    #[error("Person not found: {id} (source: {source_id})")]
    PersonNotFound { id: String, source_id: String },

    /// Source identifier unknown to the storage backend
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Storage or decoder could not produce an entity store
    #[error("Failed to load source {source_id}: {reason}")]
    SourceLoadFailed { source_id: String, reason: String },

    /// A load exceeded the configured timeout and was cancelled
    #[error("Timed out loading source: {0}")]
    CacheLoadTimeout(String),

    /// GEDCOM decode errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using GedmcpError
pub type Result<T> = std::result::Result<T, GedmcpError>;
