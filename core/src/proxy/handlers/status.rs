//! Liveness, health, and stats endpoints

use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::proxy::server::AppState;

/// Handle GET / - liveness plus config sanity.
pub async fn handle_root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "api_key_configured": state.api_key.as_deref().map_or(false, |k| !k.is_empty()),
    }))
}

/// Handle GET /health
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.stats.uptime().as_secs(),
        "memory_rss_bytes": rss_bytes(),
    }))
}

/// Handle GET /stats - process-wide counters.
pub async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.stats.snapshot())
}

#[cfg(target_os = "linux")]
fn rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

#[cfg(not(target_os = "linux"))]
fn rss_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn root_reports_credential_state() {
        let state = AppState::from_config(&Config::default(), Some("sk-test".into()));
        let response = handle_root(State(state)).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let state = AppState::from_config(&Config::default(), None);
        let response = handle_root(State(state)).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn rss_is_readable_on_linux() {
        assert!(rss_bytes().unwrap() > 0);
    }
}
