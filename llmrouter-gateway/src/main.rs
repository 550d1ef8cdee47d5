//! # Gateway Binary
//!
//! Loads a TOML config (applying env overrides and validation), builds the
//! routing engine, and serves the HTTP surface.
//!
//! ```bash
//! llmrouter-gateway --config gateway.toml
//! llmrouter-gateway --config gateway.toml --host 0.0.0.0 --port 8080
//! ```
//!
//! `--host`/`--port` override the config file's `[server]` section when
//! given; otherwise the config value (itself subject to `GATEWAY_HOST` /
//! `GATEWAY_PORT` env overrides) is used.

use clap::Parser;
use std::net::SocketAddr;
use llmrouter_gateway::{config::Config, server::create_server};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: String,

    /// Overrides `[server].port` from the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Overrides `[server].host` from the config file.
    #[arg(long)]
    host: Option<String>,

    /// Tracing filter directive, e.g. `info` or `llmrouter_core=debug,info`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt().with_env_filter(&args.log_level).init();

    let mut config = Config::load(&args.config)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let app = create_server(config).await?;

    let addr = SocketAddr::new(host.parse()?, port);
    tracing::info!(%addr, "starting gateway");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
