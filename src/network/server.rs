//! Session Server
//!
//! Accept loop shared by the token and account services. Every accepted
//! connection becomes a responder [`SocketSession`] handed to a handler;
//! a semaphore bounds how many handlers run at once.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, instrument};

use crate::network::session::{SessionConfig, SocketSession};

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum sessions handled concurrently.
    pub workers: usize,
    /// Limits applied to every session.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], crate::DEFAULT_TOKEN_PORT)),
            workers: 4,
            session: SessionConfig::default(),
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Listener I/O error.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bound listener that serves sessions until shut down.
pub struct SessionServer {
    name: &'static str,
    listener: TcpListener,
    config: ServerConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl SessionServer {
    /// Bind the listening socket.
    pub async fn bind(name: &'static str, config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::BindFailed { addr: config.bind_addr, source })?;
        let (shutdown_tx, _) = watch::channel(false);
        info!("{} listening on {}", name, listener.local_addr()?);
        Ok(Self { name, listener, config, shutdown_tx })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Session limits for accepted connections.
    pub fn session_config(&self) -> SessionConfig {
        self.config.session
    }

    /// Stop accepting. Sessions already running finish on their own.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Accept connections and hand each one to `handler`.
    #[instrument(skip(self, handler), fields(service = self.name))]
    pub async fn serve<F, Fut>(&self, handler: F) -> Result<(), ServerError>
    where
        F: Fn(SocketSession<TcpStream>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let workers = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New connection from {}", addr);
                            let session = SocketSession::responder(stream, addr, self.config.session);
                            let handler = handler.clone();
                            let workers = workers.clone();
                            tokio::spawn(async move {
                                let Ok(_permit) = workers.acquire_owned().await else {
                                    return;
                                };
                                handler(session).await;
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {}
            }
        }

        info!("{} stopped", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn local() -> ServerConfig {
        ServerConfig { bind_addr: "127.0.0.1:0".parse().unwrap(), ..Default::default() }
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 6002);
        assert_eq!(config.workers, 4);
        assert_eq!(config.session.attempts, 3);
    }

    #[tokio::test]
    async fn test_bind_conflict_reported() {
        let first = SessionServer::bind("first", local()).await.unwrap();
        let taken = ServerConfig { bind_addr: first.local_addr().unwrap(), ..local() };
        let second = SessionServer::bind("second", taken).await;
        assert!(matches!(second, Err(ServerError::BindFailed { .. })));
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let server = Arc::new(SessionServer::bind("test", local()).await.unwrap());
        let addr = server.local_addr().unwrap();
        let seen = Arc::new(AtomicUsize::new(0));

        let runner = {
            let server = server.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                server
                    .serve(move |_session| {
                        let seen = seen.clone();
                        async move {
                            seen.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                    .await
            })
        };

        let _conn = TcpStream::connect(addr).await.unwrap();
        for _ in 0..50 {
            if seen.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(1), runner).await.unwrap().unwrap().unwrap();
    }
}
