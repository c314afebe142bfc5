//! Startup, serving and graceful shutdown

use anyhow::Context;
use keystone_auth::{AuthConfig, HttpKeyFetcher, KeyCache, RefreshLoop, TokenValidator};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::routes::router;
use crate::state::AppState;

/// A bound server whose key refresh loop is already running
///
/// [`Server::bind`] performs the whole startup sequence up to the listening
/// socket; [`Server::serve_until`] serves until the shutdown future resolves.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
    refresh: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl Server {
    /// Start the key refresh loop, wait for the first key set and bind
    ///
    /// # Errors
    ///
    /// Invalid authentication settings, no key set within the startup
    /// timeout when keys are required, or a bind failure.
    pub async fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        let auth_config = config.auth_config();
        auth_config
            .validate()
            .context("invalid authentication configuration")?;

        let cache = KeyCache::new();
        let fetcher = Arc::new(
            HttpKeyFetcher::from_config(&auth_config).context("cannot build JWKS fetcher")?,
        );
        let validator = Arc::new(
            TokenValidator::from_config(cache.clone(), &auth_config)
                .context("cannot build token validator")?,
        );

        let shutdown = CancellationToken::new();
        let refresh = RefreshLoop::from_config(fetcher, cache.clone(), &auth_config)
            .spawn(shutdown.child_token());

        if let Err(e) = wait_for_keys(&cache, &auth_config).await {
            shutdown.cancel();
            stop_refresh(refresh, config.shutdown_timeout()).await;
            return Err(e);
        }

        let addr = config.bind_addr();
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                shutdown.cancel();
                stop_refresh(refresh, config.shutdown_timeout()).await;
                return Err(e).with_context(|| format!("cannot bind {addr}"));
            }
        };

        Ok(Self {
            listener,
            state: AppState::new(validator, cache),
            shutdown,
            refresh,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Address the listener is bound to
    ///
    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `signal` resolves, then drain
    ///
    /// In-flight requests and the refresh loop each get the shutdown timeout
    /// to finish.
    ///
    /// # Errors
    ///
    /// The HTTP server failed or its task panicked.
    pub async fn serve_until<F>(self, signal: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            listener,
            state,
            shutdown,
            refresh,
            shutdown_timeout,
        } = self;

        info!(addr = %listener.local_addr()?, "Keystone server listening");

        let graceful = shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router(state))
                .with_graceful_shutdown(async move { graceful.cancelled().await })
                .await
        });

        tokio::select! {
            () = signal => {
                info!("Shutdown requested, draining connections");
                shutdown.cancel();
            }
            result = &mut server => {
                shutdown.cancel();
                stop_refresh(refresh, shutdown_timeout).await;
                return result
                    .context("HTTP server task panicked")?
                    .context("HTTP server failed");
            }
        }

        let served = match tokio::time::timeout(shutdown_timeout, server).await {
            Ok(Ok(result)) => result.context("HTTP server failed"),
            Ok(Err(e)) => Err(e).context("HTTP server task panicked"),
            Err(_) => {
                warn!(timeout = ?shutdown_timeout, "Connections still open after shutdown timeout");
                Ok(())
            }
        };
        stop_refresh(refresh, shutdown_timeout).await;

        info!("Keystone server stopped");
        served
    }
}

/// Bind and serve until Ctrl-C or SIGTERM
///
/// # Errors
///
/// See [`Server::bind`] and [`Server::serve_until`].
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    Server::bind(&config)
        .await?
        .serve_until(shutdown_signal())
        .await
}

/// Cold-start decision: wait up to the startup timeout, then either fail or
/// serve without keys
async fn wait_for_keys(cache: &KeyCache, config: &AuthConfig) -> anyhow::Result<()> {
    if cache.wait_initialized(config.startup_timeout).await {
        let keys = cache.current();
        info!(key_count = keys.len(), "Signing keys loaded");
        return Ok(());
    }

    if config.require_keys_on_startup {
        error!(timeout = ?config.startup_timeout, "No signing keys fetched, refusing to start");
        anyhow::bail!(
            "no signing keys fetched within {:?}",
            config.startup_timeout
        );
    }

    warn!(
        timeout = ?config.startup_timeout,
        "No signing keys fetched yet, serving anyway; tokens are rejected until the first refresh succeeds"
    );
    Ok(())
}

async fn stop_refresh(refresh: JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, refresh).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Key refresh task failed"),
        Err(_) => warn!(timeout = ?timeout, "Key refresh loop did not stop in time"),
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received, initiating shutdown"),
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("SIGTERM received, initiating shutdown");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
