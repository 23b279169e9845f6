//! Connection Server: HTTP metadata routes plus the WebSocket dispatch
//! protocol, parameterized by a single `ServerConfig`.

pub mod health;
pub mod socket;

use std::future::{Future, IntoFuture};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use remoteme_core::ServerConfig;

use crate::executor::Executor;
use crate::registry::ConnectionRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: ConnectionRegistry,
    pub executor: Arc<Executor>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let executor = Executor::from_server_config(&config);
        Self {
            config: Arc::new(config),
            registry: ConnectionRegistry::new(),
            executor: Arc::new(executor),
        }
    }
}

/// Build the axum router with all routes and CORS.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    Router::new()
        .route("/health", get(health::health))
        .route("/modes", get(health::modes))
        .route("/ws", get(socket::ws_handler))
        .layer(cors)
        .with_state(state)
}

/// The relay server.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: AppState::new(config),
        }
    }

    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind `0.0.0.0:<port>`. A bind failure is fatal to the caller.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.state.config.port));
        TcpListener::bind(addr).await
    }

    /// Serve on `listener` until `shutdown` resolves.
    ///
    /// After the signal, open connections get the configured grace period
    /// to finish before the server stops regardless.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            project_root = %self.state.config.project_root.display(),
            "Relay server listening"
        );

        let (signalled_tx, mut signalled_rx) = watch::channel(false);
        let graceful = async move {
            shutdown.await;
            info!("Received shutdown signal");
            signalled_tx.send_replace(true);
        };

        let app = build_router(self.state.clone())
            .into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .into_future();

        let grace = self.state.config.shutdown_grace();
        let force = async move {
            let sender_gone = signalled_rx.wait_for(|signalled| *signalled).await.is_err();
            if sender_gone {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            result = serve => result?,
            () = force => {
                warn!(grace_secs = grace.as_secs(), "Graceful shutdown timed out, forcing stop");
            }
        }

        self.state.registry.clear().await;
        info!("Relay stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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
