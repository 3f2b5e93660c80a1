//! xtrc daemon - local code navigation over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use xtrc::{build_router, AppState, Config};

/// xtrc - local code navigation daemon
#[derive(Parser)]
#[command(name = "xtrcd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bind address (loopback by default)
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Embedding model id (HuggingFace repo)
    #[arg(long)]
    embedding_model: Option<String>,

    /// Use deterministic mock embeddings (no model download)
    #[arg(long)]
    mock_embedding: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("xtrc=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("xtrc=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = Config::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(model) = cli.embedding_model {
        config.embedding_model = model;
    }
    if cli.mock_embedding {
        config.mock_embedding = true;
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppState::build(config)?;
    let router = build_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("xtrc daemon listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
