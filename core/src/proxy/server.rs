//! Proxy Server - Axum HTTP server

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::proxy::stats::RelayStats;
use crate::proxy::upstream::UpstreamClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
    pub stats: Arc<RelayStats>,
    /// Bearer credential for the upstream, read from the environment at
    /// startup. None or empty means every chat request fails fast with a 500.
    pub api_key: Option<String>,
    pub emit_error_frame: bool,
}

impl AppState {
    pub fn from_config(config: &Config, api_key: Option<String>) -> Self {
        let upstream = Arc::new(UpstreamClient::new(
            &config.upstream.base_url,
            config.timeouts.connect_timeout,
            config.timeouts.request_timeout,
        ));

        Self {
            upstream,
            stats: Arc::new(RelayStats::new()),
            api_key,
            emit_error_frame: config.stream.emit_error_frame,
        }
    }
}

/// Proxy server instance
pub struct ProxyServer {
    host: String,
    port: u16,
    state: AppState,
}

impl ProxyServer {
    pub fn new(config: &Config, api_key: Option<String>) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            state: AppState::from_config(config, api_key),
        }
    }

    /// Run the proxy server (blocking)
    pub async fn run(self) -> anyhow::Result<()> {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = Router::new()
            // Liveness / health / counters
            .route("/", get(crate::proxy::handlers::status::handle_root))
            .route("/health", get(crate::proxy::handlers::status::handle_health))
            .route("/stats", get(crate::proxy::handlers::status::handle_stats))

            // Chat completions (alias kept for clients that skip the /v1 prefix)
            .route("/v1/chat/completions", post(crate::proxy::handlers::chat::handle_chat_completions))
            .route("/chat/completions", post(crate::proxy::handlers::chat::handle_chat_completions))

            .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10MB
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state);

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Relay server listening on {}", addr);

        // Handle graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Relay server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
