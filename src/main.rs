//! contextframe-mcp: MCP server for a columnar document dataset.
//!
//! Usage:
//!   contextframe-mcp --mcp                  # stdio JSON-RPC server
//!   contextframe-mcp --http 127.0.0.1:8765  # HTTP streamable server
//!   contextframe-mcp stats                  # CLI mode against the demo dataset

use clap::{Parser, Subcommand};
use contextframe_mcp::config::ServerConfig;
use contextframe_mcp::dataset::{Dataset, MemoryDataset};
use contextframe_mcp::server::ContextFrameServer;
use rmcp::ServiceExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "contextframe-mcp")]
#[command(about = "MCP server exposing a columnar document dataset to LLM agents")]
#[command(version)]
struct Cli {
    /// Run as MCP server on stdin/stdout JSON-RPC
    #[arg(long)]
    mcp: bool,

    /// Run as MCP server over HTTP at this address
    #[arg(long)]
    http: Option<SocketAddr>,

    /// Per-request deadline in seconds
    #[arg(
        long,
        env = "CONTEXTFRAME_DEADLINE_SECS",
        default_value_t = contextframe_mcp::config::DEFAULT_DEADLINE_SECS
    )]
    deadline: u64,

    /// Pricing override file (JSON)
    #[arg(long)]
    pricing: Option<std::path::PathBuf>,

    /// Disable metric collection
    #[arg(long)]
    no_monitoring: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a document to the demo dataset and print its id
    Add {
        /// Document content
        content: String,

        /// Optional title
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Full-text search over the demo dataset
    Search {
        /// Search query
        query: String,

        /// Maximum results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Print dataset statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // CRITICAL: Log to stderr only (stdout is JSON-RPC for MCP)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("contextframe_mcp=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = ServerConfig::from_env();
    config.deadline_secs = cli.deadline;
    config.monitoring.enabled = !cli.no_monitoring;
    if let Some(path) = &cli.pricing {
        config.pricing = contextframe_mcp::config::PricingConfig::from_file(path)?;
    }

    // The production deployment plugs an engine-backed dataset in here;
    // the bundled in-memory dataset keeps the binary self-contained.
    let dataset: Arc<dyn Dataset> = Arc::new(MemoryDataset::new());

    if cli.mcp {
        run_stdio_server(dataset, config).await
    } else if let Some(addr) = cli.http {
        run_http_server(dataset, config, addr).await
    } else if let Some(cmd) = cli.command {
        run_cli(dataset, cmd).await
    } else {
        eprintln!("Use --mcp for stdio mode, --http <addr> for HTTP mode, or a subcommand.");
        eprintln!("Run with --help for more information.");
        std::process::exit(1);
    }
}

async fn run_stdio_server(
    dataset: Arc<dyn Dataset>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    tracing::info!("Starting MCP server on stdio");
    let server = ContextFrameServer::new(dataset, config);
    server.start_monitoring();

    let shutdown_handle = server.clone();
    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    shutdown_handle.shutdown().await;
    Ok(())
}

async fn run_http_server(
    dataset: Arc<dyn Dataset>,
    config: ServerConfig,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let server = ContextFrameServer::new(dataset, config);
    server.start_monitoring();
    contextframe_mcp::http::serve(server, addr).await
}

async fn run_cli(dataset: Arc<dyn Dataset>, cmd: Commands) -> anyhow::Result<()> {
    use contextframe_mcp::analytics::{StatsCollector, StatsOptions};
    use contextframe_mcp::types::FrameRecord;

    match cmd {
        Commands::Add { content, title } => {
            let mut record = FrameRecord::new(content);
            record.metadata.title = title;
            let id = record.uuid;
            dataset.add(record).await.map_err(|e| anyhow::anyhow!(e))?;
            println!("{id}");
        }

        Commands::Search { query, limit } => {
            let hits = dataset
                .full_text_search(&query, limit, None)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            for hit in hits {
                println!(
                    "{:.3}  {}  {}",
                    hit.score,
                    hit.record.uuid,
                    hit.record.metadata.title.as_deref().unwrap_or("(untitled)")
                );
            }
        }

        Commands::Stats => {
            let collector = StatsCollector::new(dataset);
            let stats = collector
                .collect(StatsOptions::default())
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            println!("{}", serde_json::to_string_pretty(&stats.to_value())?);
        }
    }

    Ok(())
}
