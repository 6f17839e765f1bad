//! Molstar RPC Relay - HTTP bridge between molstar-core clients and viewer pages.
//!
//! Clients post calls to `/run`. The relay pushes each call to the viewer
//! pages over server-sent events and returns the pages' WebSocket answers.
//! Viewer pages open their WebSocket on `/` or `/ws`.

mod handler;
mod relay;
mod server;

use anyhow::Result;
use clap::Parser;
use molstar_core::config::RelayConfig;
use relay::Relay;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "molstar-rpc")]
#[command(about = "HTTP relay between Molstar clients and viewer pages")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// How long to wait for viewers to answer a call
    #[arg(long, default_value_t = RelayConfig::RESPONSE_TIMEOUT.as_millis() as u64)]
    response_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Molstar RPC Relay");

    let relay = Arc::new(Relay::new(Duration::from_millis(args.response_timeout_ms)));
    info!("Viewer response timeout: {:?}", relay.response_timeout());
    let addr = server::start_server(relay, &args.host, args.port).await?;

    // Print port for the launching process to read (intentional stdout)
    println!("RELAY_PORT={}", addr.port());

    info!("Relay running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
