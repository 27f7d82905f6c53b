//! Reroute Daemon Binary Entry Point

use clap::Parser;
use reroute_daemon::{run_daemon, Args};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    tokio::select! {
        result = run_daemon(args) => {
            if let Err(e) = result {
                tracing::error!("daemon failed: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, stopping daemon...");
        }
    }

    Ok(())
}
