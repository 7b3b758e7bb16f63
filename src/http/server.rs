//! HTTP server implementation.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{GatekeeperError, Result};

/// HTTP server for the counter actors and the gateway-protected routes.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The assembled application
    app: Router,
}

impl HttpServer {
    /// Create a new server for `app`.
    pub fn new(addr: SocketAddr, app: Router) -> Self {
        Self { addr, app }
    }

    /// Start the server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            GatekeeperError::Io(e)
        })?;

        info!(
            addr = %listener.local_addr()?,
            "Starting HTTP server"
        );

        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            GatekeeperError::Io(e)
        })
    }
}
