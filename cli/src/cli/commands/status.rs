use std::path::PathBuf;

use thinkrelay_core::config::{default_config_path, load_config};

pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    println!("Thinkrelay Status");
    println!("=================");
    println!();
    println!("Configuration:");
    println!("  Config file: {:?}", default_config_path());
    println!();
    println!("Server settings:");
    println!("  Host: {}", config.server.host);
    println!("  Port: {}", config.server.port);
    println!("  Upstream: {}", config.upstream.base_url);
    println!("  Credential env: {}", config.upstream.api_key_env);
    println!();

    // Check if server is reachable and fetch its counters
    let url = format!("http://{}:{}/stats", config.server.host, config.server.port);
    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => {
            println!("Server: RUNNING");
            if let Ok(stats) = resp.json::<serde_json::Value>().await {
                println!();
                println!("Counters:");
                println!("  Total requests:     {}", stats["total_requests"]);
                println!("  Streaming requests: {}", stats["streaming_requests"]);
                println!("  Thinking requests:  {}", stats["thinking_requests"]);
                println!("  Errors:             {}", stats["errors"]);
            }
        }
        _ => {
            println!("Server: NOT RUNNING");
        }
    }

    Ok(())
}
