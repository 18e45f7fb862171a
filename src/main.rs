use anyhow::Result;
use gedmcp::cache::DocumentCache;
use gedmcp::decode::GedcomDecoder;
use gedmcp::mcp::{HttpMcpServer, McpServer};
use gedmcp::storage::{HttpStorage, LocalStorage, SourceStorage};
use gedmcp::{Config, GedmcpService};
use std::sync::Arc;

/// Build the query service from configuration: storage backend, decoder,
/// document cache (with its background sweeper) and graph cache.
fn build_service(config: &Config) -> Result<Arc<GedmcpService>> {
    let storage: Arc<dyn SourceStorage> = match config.storage.backend.as_str() {
        "http" => {
            let base_url = config.storage.base_url.as_deref().ok_or_else(|| {
                anyhow::anyhow!("storage.base_url is required when storage.backend is \"http\"")
            })?;
            Arc::new(HttpStorage::new(base_url)?)
        }
        _ => Arc::new(LocalStorage::new(&config.storage.source_root)),
    };

    let cache = Arc::new(DocumentCache::new(
        storage,
        Arc::new(GedcomDecoder),
        config.cache_config(),
    ));
    cache.spawn_sweeper();

    Ok(Arc::new(GedmcpService::new(
        cache,
        config.cache.graph_cache_entries,
        config.duplicate_weights(),
        config.duplicates.default_threshold,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    // MCP stdio transport owns stdout, so logs go to stderr
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "serve" => {
            // MCP server mode (stdio transport)
            run_mcp_server().await?;
        }
        "serve-http" => {
            // HTTP server mode (for remote MCP clients)
            run_http_server().await?;
        }
        "verify" | _ => {
            // Default: validate configuration, optionally probe one source
            run_verification(args.get(2).map(String::as_str)).await?;
        }
    }

    Ok(())
}

/// Run MCP server (stdio transport)
async fn run_mcp_server() -> Result<()> {
    let config = Config::load()?;
    let service = build_service(&config)?;
    let server = McpServer::new(service);
    server.run().await?;
    Ok(())
}

/// Run HTTP MCP server
async fn run_http_server() -> Result<()> {
    log::info!("Starting GedMCP HTTP server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let service = build_service(&config)?;
    let server = Arc::new(McpServer::new(service));

    let http_server = HttpMcpServer::new(server, config.clone())?;
    http_server.run(config.http_server.port).await?;
    Ok(())
}

/// Validate the configuration; with a source id, also load it and print
/// store statistics.
async fn run_verification(source_id: Option<&str>) -> Result<()> {
    log::info!("Starting GedMCP v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    log::info!("Configuration loaded successfully");
    log::info!("Storage backend: {}", config.storage.backend);
    if config.storage.backend == "local" {
        log::info!("Source root: {}", config.storage.source_root.display());
    }

    let service = build_service(&config)?;

    let Some(source_id) = source_id else {
        log::info!("Configuration OK. Pass a source id to probe a load (gedmcp verify <source>)");
        return Ok(());
    };

    let stats = service.get_statistics(source_id).await?;
    log::info!(
        "Loaded {}: {} individuals, {} families",
        source_id,
        stats.total_individuals,
        stats.total_families
    );
    if let Some((lo, hi)) = stats.birth_year_range {
        log::info!("Birth years span {} - {}", lo, hi);
    }
    for (surname, count) in stats.top_surnames.iter().take(5) {
        log::info!("Surname {}: {} individuals", surname, count);
    }
    Ok(())
}
