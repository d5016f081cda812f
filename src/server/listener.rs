//! Clipboard server listener
//!
//! Owns the shared services, binds the HTTP listener and runs the payload
//! sweep alongside it.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::auth::TokenAuthenticator;
use crate::error::Result;
use crate::history::HistoryStore;
use crate::registry::ConnectionRegistry;
use crate::relay::ClipboardRelay;
use crate::server::config::ServerConfig;
use crate::server::routes::{router, AppState};
use crate::server::ws::WsTransport;
use crate::storage::{FileCleanup, FileStore, FsFileStore};

/// Clipboard relay server
pub struct ClipServer<S: FileStore = FsFileStore> {
    config: ServerConfig,
    history: Arc<HistoryStore>,
    registry: Arc<ConnectionRegistry<WsTransport>>,
    store: Arc<S>,
    auth: Arc<TokenAuthenticator>,
}

impl ClipServer<FsFileStore> {
    /// Create a server storing payloads under `config.storage_dir`
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let store = FsFileStore::open_dir(&config.storage_dir).await?;
        Ok(Self::with_store(config, store))
    }
}

impl<S: FileStore> ClipServer<S> {
    /// Create a server over an existing payload store
    pub fn with_store(config: ServerConfig, store: S) -> Self {
        if config.tokens.is_empty() {
            tracing::warn!("No tokens configured, every request will be rejected");
        }

        Self {
            history: Arc::new(HistoryStore::with_capacity(config.history_capacity)),
            registry: Arc::new(ConnectionRegistry::with_config(config.registry.clone())),
            store: Arc::new(store),
            auth: Arc::new(TokenAuthenticator::new(config.tokens.iter().cloned())),
            config,
        }
    }

    /// Get a reference to the history store
    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry<WsTransport>> {
        &self.registry
    }

    /// Get a reference to the payload store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Build the HTTP router over this server's services
    pub fn router(&self) -> Router {
        let relay = ClipboardRelay::new(
            Arc::clone(&self.history),
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            self.config.max_request_body,
        );
        router(AppState::new(Arc::new(relay), Arc::clone(&self.auth)))
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(
            addr = %listener.local_addr()?,
            tokens = self.auth.token_count(),
            "Clipboard server listening"
        );

        let cleanup = Arc::new(FileCleanup::new(
            Arc::clone(&self.store),
            Arc::clone(&self.history),
            self.config.cleanup.clone(),
        ));
        let cleanup_handle = cleanup.spawn();

        // Live sockets are closed as soon as the signal fires so the graceful
        // shutdown is not held up by idle devices
        let registry = Arc::clone(&self.registry);
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            registry.shutdown().await;
        };

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await;

        // Stop cleanup task on shutdown
        cleanup_handle.abort();

        result.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    use super::*;
    use crate::auth::TokenSetting;

    #[tokio::test]
    async fn test_new_creates_storage_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = dir.path().join("payloads");

        let server = ClipServer::new(ServerConfig::default().storage_dir(&storage))
            .await
            .unwrap();

        assert!(storage.is_dir());
        assert_eq!(server.store().root(), storage.as_path());
        assert_eq!(server.bind_addr().port(), 5000);
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::default()
            .storage_dir(dir.path())
            .token(TokenSetting::new("secret"));
        let server = Arc::new(ClipServer::new(config).await.unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let running = Arc::clone(&server);
        let task = tokio::spawn(async move {
            running
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));

        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(server.registry().connection_count().await, 0);
    }
}
