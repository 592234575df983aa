use anyhow::Result;
use axum::Router;
use clap::Parser;
use mixer_core::search::ScoringConfig;
use server::{build_app, ServerConfig, DEFAULT_URL_BASE};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Store directory written by `indexer import`
    #[arg(long)]
    db: PathBuf,
    /// Corpus data file (one JSON page per line)
    #[arg(long)]
    data: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 10483)]
    port: u16,
    /// Prefix of result and category URLs
    #[arg(long, default_value = DEFAULT_URL_BASE)]
    url_base: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = ServerConfig { db: args.db, data: args.data, url_base: args.url_base, scoring: ScoringConfig::default() };
    let app: Router = build_app(&config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
