//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::{router, AppState};
use crate::error::Result;

/// HTTP server for the rate limit service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Handler state
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will stop accepting connections when the provided signal
    /// resolves and return once in-flight requests finish.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;
        Self::serve_listener(listener, self.state, signal).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve_listener<F>(listener: TcpListener, state: AppState, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(addr = %addr, "Starting HTTP server for rate limit service");

        axum::serve(listener, router(state))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{InMemoryStore, RateLimiter};
    use std::sync::Arc;

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let limiter = Arc::new(RateLimiter::new(Arc::new(InMemoryStore::new())));
        let _server = HttpServer::new(addr, AppState::new(limiter));
    }

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let limiter = Arc::new(RateLimiter::new(Arc::new(InMemoryStore::new())));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(HttpServer::serve_listener(
            listener,
            AppState::new(limiter),
            async move {
                let _ = rx.await;
            },
        ));

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
