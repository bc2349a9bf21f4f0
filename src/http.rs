//! MCP over HTTP (streamable HTTP transport).
//!
//! Mounts the rmcp streamable HTTP service on an axum router. Each
//! session gets its own server value over the shared dataset and
//! monitoring system.

use crate::server::ContextFrameServer;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Keep-alive interval for SSE responses.
const SSE_KEEP_ALIVE_SECS: u64 = 15;

/// Builds the streamable HTTP MCP service around a server prototype.
pub fn create_mcp_service(
    server: ContextFrameServer,
) -> StreamableHttpService<ContextFrameServer, LocalSessionManager> {
    let service_factory = move || Ok(server.clone());
    let session_manager = Arc::new(LocalSessionManager::default());
    let config = StreamableHttpServerConfig {
        sse_keep_alive: Some(std::time::Duration::from_secs(SSE_KEEP_ALIVE_SECS)),
        stateful_mode: true,
        cancellation_token: CancellationToken::new(),
        ..Default::default()
    };
    StreamableHttpService::new(service_factory, session_manager, config)
}

/// Serves MCP over HTTP at `/mcp` until the process is stopped.
pub async fn serve(server: ContextFrameServer, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let service = create_mcp_service(server);
    let router = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("MCP HTTP transport listening on http://{addr}/mcp");
    axum::serve(listener, router).await?;
    Ok(())
}
