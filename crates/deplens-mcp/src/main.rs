//! Deplens MCP server binary.
//!
//! This binary runs the MCP server using stdio transport. Configuration is
//! read from `$DEPLENS_CONFIG` if set; see [`deplens::config`].

use deplens::config::DeplensConfig;
use deplens_mcp::DeplensMcpServer;
use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DeplensConfig::resolve(None).await?;

    // stdout carries the MCP protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        "Starting deplens-mcp server"
    );

    let server = DeplensMcpServer::new(&config)?;
    let sweeper = server.operations().spawn_sweeper();

    let service = server.serve(rmcp::transport::stdio()).await?;
    let reason = service.waiting().await?;
    tracing::info!(?reason, "Client disconnected");

    sweeper.shutdown().await;
    Ok(())
}
