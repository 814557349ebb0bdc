use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Relay proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the upstream chat-completions API.
    /// The proxy POSTs to `{base_url}/chat/completions`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the bearer credential.
    /// The key itself never lives in the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Total budget for one upstream call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamConfig {
    /// When an upstream stream fails after response headers were already sent,
    /// inject a final `data: {"error": ...}` frame before closing. Off by
    /// default: the connection is simply terminated.
    #[serde(default)]
    pub emit_error_frame: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            timeouts: TimeoutsConfig::default(),
            stream: StreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// Default value functions
fn default_port() -> u16 { 8787 }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_base_url() -> String { "https://api.deepseek.com".to_string() }
fn default_api_key_env() -> String { "DEEPSEEK_API_KEY".to_string() }
fn default_request_timeout() -> u64 { 120 }
fn default_connect_timeout() -> u64 { 20 }
fn default_log_level() -> String { "info".to_string() }

/// Get default config file path
/// Uses ~/.config/thinkrelay/config.toml for Unix-like CLI experience
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("thinkrelay")
        .join("config.toml")
}

/// Load config from file, or return defaults if not found.
///
/// Loading order:
/// 1. Specified path (if provided)
/// 2. ./config.toml (if exists)
/// 3. default_config_path() (usually ~/.config/thinkrelay/config.toml)
pub fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    if let Some(config_path) = path {
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::info!("Loaded config from specified path {:?}", config_path);
            return Ok(config);
        } else {
            anyhow::bail!("Specified config file not found: {:?}", config_path);
        }
    }

    // Try current directory config.toml
    let local_config = PathBuf::from("config.toml");
    if local_config.exists() {
        match std::fs::read_to_string(&local_config) {
            Ok(content) => match toml::from_str::<Config>(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from current directory {:?}", local_config);
                    return Ok(config);
                }
                Err(e) => {
                    tracing::error!("Failed to parse ./config.toml: {}. Falling back to default path.", e);
                }
            },
            Err(e) => {
                tracing::error!("Failed to read ./config.toml: {}. Falling back to default path.", e);
            }
        }
    }

    let default_path = default_config_path();
    if default_path.exists() {
        let content = std::fs::read_to_string(&default_path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::info!("Loaded config from default path {:?}", default_path);
        Ok(config)
    } else {
        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.timeouts.request_timeout, 120);
        assert_eq!(config.upstream.api_key_env, "DEEPSEEK_API_KEY");
        assert!(!config.stream.emit_error_frame);
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [upstream]
            base_url = "https://api.example.com/v1"

            [stream]
            emit_error_frame = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.upstream.base_url, "https://api.example.com/v1");
        assert_eq!(config.upstream.api_key_env, "DEEPSEEK_API_KEY");
        assert!(config.stream.emit_error_frame);
    }

    #[test]
    fn parses_empty_toml_as_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.timeouts.connect_timeout, 20);
    }
}
