//! Testing utilities for controller integration tests
//!
//! Provides `TestController` for spinning up an in-process controller replica
//! for testing, with direct access to the consensus log's failure knobs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::api::http::create_router;
use crate::consensus::local::LocalLog;
use crate::controller::{ControllerHandle, ControllerServer, ControllerSettings};

/// An in-process controller replica under test.
pub struct TestController {
    /// Handle for submitting operations directly.
    pub handle: ControllerHandle,
    /// The consensus log, exposed for leadership and commit-fault injection.
    pub log: Arc<LocalLog>,
    /// HTTP address, if `serve_http` was used.
    addr: Option<SocketAddr>,
    /// HTTP server shutdown channel.
    http_shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestController {
    /// Start a controller with no HTTP server, wired to a fresh local log.
    pub fn start() -> Self {
        Self::with_settings(test_settings())
    }

    /// Start a controller with the given settings and no HTTP server.
    pub fn with_settings(settings: ControllerSettings) -> Self {
        let (log, commits) = LocalLog::new(settings.commit_capacity);
        let server = ControllerServer::with_settings(log.clone(), commits, settings);
        let handle = server.start();

        TestController {
            handle,
            log,
            addr: None,
            http_shutdown_tx: None,
        }
    }

    /// Start a controller and serve its HTTP API on an ephemeral port.
    pub async fn serve_http() -> Self {
        let mut controller = Self::start();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(controller.handle.clone());

        let (http_shutdown_tx, http_shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = http_shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        controller.addr = Some(addr);
        controller.http_shutdown_tx = Some(http_shutdown_tx);

        // Give the server time to start
        tokio::time::sleep(Duration::from_millis(20)).await;
        controller
    }

    /// The HTTP address, panics if `serve_http` was not used.
    pub fn addr(&self) -> SocketAddr {
        self.addr.unwrap()
    }

    /// The HTTP address as a `host:port` string for clients.
    pub fn addr_string(&self) -> String {
        self.addr().to_string()
    }

    /// Shutdown the HTTP server gracefully, if one is running.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.http_shutdown_tx.take() {
            let _ = tx.send(());
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Faster wait timeout for tests than the production default.
pub fn test_settings() -> ControllerSettings {
    ControllerSettings::default().with_wait_timeout(Duration::from_millis(200))
}
