//! Reroute Daemon
//!
//! Wires the core pieces together: a JSON-file rule store, the in-memory
//! rule engine, the rewrite service running its recompile-on-change loop,
//! and an HTTP control API that a local UI (or curl) drives.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use reroute_core::{InMemoryEngine, JsonFileStore, RewriteService};
use tracing::info;

pub mod api;

#[derive(Debug, Parser)]
#[command(
    name = "reroute-daemon",
    about = "URL rewrite rule compiler with auth header mirroring"
)]
pub struct Args {
    /// Path of the persisted rule state (JSON)
    #[arg(long, default_value = "reroute-state.json")]
    pub state_file: PathBuf,

    /// Address the control API listens on
    #[arg(long, default_value = "127.0.0.1:7690")]
    pub listen: SocketAddr,
}

pub async fn run_daemon(args: Args) -> anyhow::Result<()> {
    let store = Arc::new(JsonFileStore::new(&args.state_file));
    let engine = Arc::new(InMemoryEngine::new());
    let service = Arc::new(RewriteService::new(store, engine.clone()));

    // Reactive loop: initial compile, then recompile per store revision
    let loop_service = service.clone();
    tokio::spawn(async move { loop_service.run().await });

    let app = api::router(api::ApiState { service, engine });
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!(
        addr = %args.listen,
        state_file = %args.state_file.display(),
        "control API listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["reroute-daemon"]);
        assert_eq!(args.state_file, PathBuf::from("reroute-state.json"));
        assert_eq!(args.listen, "127.0.0.1:7690".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_args_override() {
        let args = Args::parse_from([
            "reroute-daemon",
            "--state-file",
            "/tmp/rules.json",
            "--listen",
            "0.0.0.0:9000",
        ]);
        assert_eq!(args.state_file, PathBuf::from("/tmp/rules.json"));
        assert_eq!(args.listen.port(), 9000);
    }
}
