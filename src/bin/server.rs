//! Shard controller server binary
//!
//! Runs a single controller replica backed by a local consensus log.
//!
//! Usage: shardctrl-server --api-port <PORT> [--wait-timeout-ms N]
//!
//! Options:
//!   --api-port PORT         Port for the client API (/ctrl/* endpoints)
//!   --wait-timeout-ms N     Commit-wait timeout before replying wrong_leader
//!                           (default: 500)

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::info;

use shardctrl::api::http::create_router;
use shardctrl::consensus::local::LocalLog;
use shardctrl::controller::{ControllerServer, ControllerSettings};

fn parse_args() -> (u16, ControllerSettings) {
    let args: Vec<String> = env::args().collect();

    let mut api_port: Option<u16> = None;
    let mut settings = ControllerSettings::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                api_port = Some(args[i + 1].parse().expect("Invalid API port"));
                i += 2;
            }
            "--wait-timeout-ms" => {
                let millis: u64 = args[i + 1].parse().expect("Invalid wait timeout");
                settings = settings.with_wait_timeout(Duration::from_millis(millis));
                i += 2;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                i += 1;
            }
        }
    }

    let api_port = api_port.expect("--api-port is required");

    (api_port, settings)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shardctrl=info".into()),
        )
        .init();

    let (api_port, settings) = parse_args();

    let (log, commits) = LocalLog::new(settings.commit_capacity);
    let server = ControllerServer::with_settings(log, commits, settings);
    let handle = server.start();

    let app = create_router(handle);

    let api_addr: SocketAddr = format!("0.0.0.0:{}", api_port).parse().unwrap();
    info!(%api_addr, "controller API listening");
    info!("  POST /ctrl/join   - add replica groups");
    info!("  POST /ctrl/leave  - remove replica groups");
    info!("  POST /ctrl/move   - pin one shard to a group");
    info!("  POST /ctrl/query  - fetch a configuration version");
    info!("  GET  /ctrl/status - replica status");

    let api_listener = tokio::net::TcpListener::bind(api_addr).await.unwrap();
    axum::serve(api_listener, app).await.unwrap();
}
