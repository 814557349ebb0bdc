use std::path::PathBuf;

use thinkrelay_core::config::load_config;
use thinkrelay_core::proxy::ProxyServer;

pub async fn run(config_path: Option<PathBuf>, port_override: Option<u16>) -> anyhow::Result<()> {
    // Load configuration
    let mut config = load_config(config_path)?;

    // Apply port override if provided
    if let Some(port) = port_override {
        config.server.port = port;
    }

    tracing::info!("Starting Thinkrelay...");
    tracing::info!("  Port: {}", config.server.port);
    tracing::info!("  Host: {}", config.server.host);
    tracing::info!("  Upstream: {}", config.upstream.base_url);
    tracing::info!("  Request timeout: {}s", config.timeouts.request_timeout);

    // The bearer credential lives in the environment, never in the config file
    let api_key = std::env::var(&config.upstream.api_key_env).ok();
    match api_key.as_deref() {
        Some(key) if !key.is_empty() => {
            tracing::info!("  Credential: {} is set", config.upstream.api_key_env);
        }
        _ => {
            tracing::warn!(
                "{} is not set. The relay will start but chat requests will fail with 500.",
                config.upstream.api_key_env
            );
        }
    }

    let server = ProxyServer::new(&config, api_key);

    tracing::info!(
        "Relay server starting on http://{}:{}",
        config.server.host,
        config.server.port
    );
    tracing::info!("Press Ctrl+C to stop");

    // Run server (blocks until shutdown)
    server.run().await?;

    Ok(())
}
