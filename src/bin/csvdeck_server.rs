//!
//! csvdeck server binary
//! ---------------------
//! Command-line entry point for the csvdeck HTTP server. Supports configuration
//! via CLI flags and environment variables.

use anyhow::{Context, Result};
use std::env;

use csvdeck::config::{has_flag, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("csvdeck Server\n\nUSAGE:\n  csvdeck_server [--bind ADDR] [--http-port N] [--upload-dir PATH] [--max-upload-mb N]\n\nOPTIONS:\n  --bind ADDR          Listen address (env: CSVDECK_BIND, default 0.0.0.0)\n  --http-port N        HTTP API port (env: CSVDECK_HTTP_PORT, default 5173)\n  --upload-dir PATH    Folder holding uploaded files (env: CSVDECK_UPLOAD_DIR, default uploads)\n  --max-upload-mb N    Largest accepted request body in MiB (env: CSVDECK_MAX_UPLOAD_MB, default 10)\n");
        return Ok(());
    }

    let cfg = ServerConfig::from_env_and_args(&args);
    println!(
        "csvdeck starting: http={}:{}, upload_dir={}",
        cfg.bind_addr,
        cfg.http_port,
        cfg.upload_dir.display()
    );
    tracing::info!("Using port: http={}, upload_dir={}", cfg.http_port, cfg.upload_dir.display());

    csvdeck::server::run_with_config(cfg).await.context("csvdeck server stopped")
}
