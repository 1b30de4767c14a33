mod accept;
mod shutdown;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use hyper_util::server::graceful::GracefulShutdown;
use tilecache_cache::CacheStore;
use tilecache_config::TilecacheConfig;
use tilecache_proxy::RotationCounter;
use tokio::{net::TcpListener, sync::Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use self::accept::{ConnSettings, accept_with_permit, bind_listener, serve_connection};
use crate::Dispatcher;

pub use self::shutdown::shutdown_signal;

/// Owns the listener, the dispatcher and the store for the life of the process.
pub struct Master {
    cfg: Arc<TilecacheConfig>,
    cache: CacheStore,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

impl Master {
    pub fn new(cfg: TilecacheConfig, cache: CacheStore) -> anyhow::Result<Self> {
        let counter = Arc::new(RotationCounter::new());
        let dispatcher = Dispatcher::from_config(cfg.upstream(), cache.clone(), counter)
            .context("failed to set up the upstream proxy")?;

        Ok(Self {
            cfg: Arc::new(cfg),
            cache,
            dispatcher: Arc::new(dispatcher),
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops the accept loop once cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Binds the configured address and serves until SIGINT/SIGTERM.
    #[instrument(skip(self), fields(
        listen = %self.cfg.server().listen(),
        worker_connections = self.cfg.server().worker_connections(),
    ))]
    pub async fn run(self) -> anyhow::Result<()> {
        info!(target: "tilecache::master", "Starting tilecache master");

        let listener = bind_listener(self.cfg.server().listen()).await?;

        let token = self.shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            token.cancel();
        });

        self.serve(listener).await
    }

    /// Accept loop on an already bound listener.
    ///
    /// Returns after the shutdown token is cancelled, open connections have
    /// drained (or the grace period ran out) and the store is closed.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let server = self.cfg.server();
        let max_conns = server.worker_connections() as usize;
        let semaphore = Arc::new(Semaphore::new(max_conns));
        let settings = ConnSettings {
            header_read_timeout: Duration::from_secs(server.header_read_timeout_secs()),
            keepalive: server.keepalive(),
        };
        let graceful = GracefulShutdown::new();

        info!(
            target: "tilecache::master",
            max_conns,
            upstream = %self.cfg.upstream().url(),
            "Master initialized. Waiting for incoming connections (Ctrl+C to stop)..."
        );

        loop {
            let conn = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = accept_with_permit(&listener, &semaphore) => accepted,
            };

            match conn {
                Ok(conn) => serve_connection(conn, self.dispatcher.clone(), settings, &graceful),
                Err(e) => {
                    // EMFILE and friends are transient.
                    warn!(
                        target: "tilecache::master",
                        error = ?e,
                        "Accept failed; retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }

        drop(listener);
        info!(target: "tilecache::master", "Shutdown requested; draining connections");

        let grace = Duration::from_secs(server.shutdown_grace_secs());
        tokio::select! {
            _ = graceful.shutdown() => {
                info!(target: "tilecache::master", "All connections closed");
            }
            _ = tokio::time::sleep(grace) => {
                warn!(
                    target: "tilecache::master",
                    grace_secs = grace.as_secs(),
                    "Grace period elapsed; dropping remaining connections"
                );
            }
        }

        if let Err(e) = self.cache.close() {
            error!(target: "tilecache::master", error = %e, "Failed to close cache store");
        } else {
            info!(target: "tilecache::master", "Cache store closed");
        }

        Ok(())
    }
}
