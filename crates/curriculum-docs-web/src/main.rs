//! Curriculum Docs Web - HTTP service for syllabus documents.

mod app;
mod error;
mod helpers;
mod routes;
mod state;


use anyhow::{Context, Result};
use clap::Parser;
use curriculum_docs_core::{MergeFallback, ServiceConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "curriculum-docs-web")]
#[command(author, version, about = "Curriculum document conversion service", long_about = None)]
struct Args {
    /// Host to bind to [default: 0.0.0.0]
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Port to bind to [default: 5001]
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Config file (defaults to ~/.config/curriculum-docs/config.toml or ./config.toml)
    #[arg(short, long, env = "CURRICULUM_DOCS_CONFIG")]
    config: Option<PathBuf>,

    /// Return only the first PDF when merging fails instead of an error
    #[arg(long, env = "MERGE_ALLOW_FIRST_ONLY")]
    allow_first_only: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let mut config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServiceConfig::load(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.allow_first_only {
        config.merge.fallback = MergeFallback::FirstDocument;
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    let state = Arc::new(AppState::new(config).context("Failed to initialize application state")?);

    let tool = state.pipeline.probe().await;
    if tool.available {
        info!(
            "Converter: {} ({})",
            tool.binary.as_deref().unwrap_or("unknown"),
            tool.version.as_deref().unwrap_or("unknown version")
        );
    } else {
        tracing::warn!(
            "Converter unavailable: {}",
            tool.error.as_deref().unwrap_or("not found")
        );
    }

    let app = app::build_router(state);

    info!("Starting server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
