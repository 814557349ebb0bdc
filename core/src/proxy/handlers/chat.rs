//! Chat-completions handler
//! Handles POST /v1/chat/completions and its /chat/completions alias

use axum::{
    body::Body,
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::proxy::relay::{relay_stream, RequestContext};
use crate::proxy::server::AppState;
use crate::proxy::sse::inspector;
use crate::proxy::upstream::CallError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Handle one chat-completion request: pass the body through to the single
/// upstream, relay the response (streamed or buffered), and watch the side
/// channel for reasoning content.
pub async fn handle_chat_completions(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let ctx = RequestContext::from_body(&body);
    state.stats.record_request(ctx.stream);

    info!(
        "[{}] Chat request | Model: {} | Stream: {} | Messages: {}",
        ctx.id, ctx.model, ctx.stream, ctx.message_count
    );

    // Fail fast before any outbound call when the credential is absent.
    let api_key = match state.api_key.as_deref() {
        Some(key) if !key.is_empty() => key,
        _ => {
            state.stats.record_error();
            warn!("[{}] Rejected: upstream credential is not configured", ctx.id);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                "Upstream API key is not configured. Set the credential environment variable and restart.",
                &ctx.id,
            );
        }
    };

    let response = match state
        .upstream
        .chat_completions(api_key, &body, ctx.stream)
        .await
    {
        Ok(r) => r,
        Err(e) => {
            state.stats.record_error();
            error!("[{}] Upstream call failed: {}", ctx.id, e);
            let status = match e {
                // Both mean "no answer from upstream" at the gateway level
                CallError::Timeout(_) | CallError::Network(_) => StatusCode::GATEWAY_TIMEOUT,
            };
            return error_response(status, "upstream_error", &e.to_string(), &ctx.id);
        }
    };

    let status = response.status();

    // Upstream answered with an error status: relay it and the body untouched.
    if !status.is_success() {
        state.stats.record_error();
        let body_bytes = response.bytes().await.unwrap_or_default();
        error!(
            "[{}] Upstream error {} | {} bytes | {}ms",
            ctx.id,
            status,
            body_bytes.len(),
            ctx.elapsed_ms()
        );
        return Response::builder()
            .status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY))
            .header(header::CONTENT_TYPE, "application/json")
            .header(REQUEST_ID_HEADER, &ctx.id)
            .body(Body::from(body_bytes))
            .unwrap();
    }

    if ctx.stream {
        // Headers go out before any body byte; the relay stream owns the
        // upstream response from here on.
        let request_id = ctx.id.clone();
        let sse = relay_stream(
            response.bytes_stream(),
            ctx,
            state.stats.clone(),
            state.emit_error_frame,
        );

        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .header(REQUEST_ID_HEADER, request_id)
            .body(Body::from_stream(sse))
            .unwrap();
    }

    // Buffered mode: accumulate the whole body, one reasoning check, relay as
    // a single response with the upstream's status.
    let body_bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            state.stats.record_error();
            error!("[{}] Failed to read upstream body: {}", ctx.id, e);
            return error_response(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                &format!("Failed to read upstream body: {}", e),
                &ctx.id,
            );
        }
    };

    if let Ok(payload) = serde_json::from_slice::<Value>(&body_bytes) {
        if let Some(fragment) = inspector::extract_thinking(&payload) {
            state.stats.record_thinking();
            info!(
                "[{}] Reasoning content detected ({} chars)",
                ctx.id,
                fragment.chars().count()
            );
        }
    }

    info!(
        "[{}] Completed | Status: {} | {} bytes | {}ms",
        ctx.id,
        status,
        body_bytes.len(),
        ctx.elapsed_ms()
    );

    Response::builder()
        .status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK))
        .header(header::CONTENT_TYPE, "application/json")
        .header(REQUEST_ID_HEADER, &ctx.id)
        .body(Body::from(body_bytes))
        .unwrap()
}

fn error_response(status: StatusCode, error_type: &str, message: &str, request_id: &str) -> Response {
    (
        status,
        [(REQUEST_ID_HEADER, request_id)],
        Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    fn state_with_key(api_key: Option<&str>) -> AppState {
        AppState::from_config(&Config::default(), api_key.map(str::to_string))
    }

    #[tokio::test]
    async fn missing_credential_fails_fast_with_500() {
        let state = state_with_key(None);
        let stats = Arc::clone(&state.stats);

        let response = handle_chat_completions(
            State(state),
            Json(json!({"model": "deepseek-chat", "messages": [], "stream": false})),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(stats.total_requests(), 1);
        assert_eq!(stats.errors(), 1);
    }

    #[tokio::test]
    async fn empty_credential_counts_as_missing() {
        let state = state_with_key(Some(""));
        let stats = Arc::clone(&state.stats);

        let response =
            handle_chat_completions(State(state), Json(json!({"stream": true}))).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(stats.streaming_requests(), 1);
        assert_eq!(stats.errors(), 1);
    }

    #[test]
    fn error_response_carries_structured_body() {
        let response = error_response(
            StatusCode::GATEWAY_TIMEOUT,
            "upstream_error",
            "upstream timed out after 120s",
            "abc123",
        );
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            "abc123"
        );
    }
}
