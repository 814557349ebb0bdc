//! Relay pipeline: forward upstream bytes verbatim while watching the SSE
//! side channel for reasoning content.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::proxy::sse::{inspect_line, LineEvent, LineSplitter};
use crate::proxy::stats::RelayStats;

const THINKING_PREVIEW_CHARS: usize = 120;

/// Per-request metadata, created at request entry and read-only afterwards.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id carried in logs and the x-request-id response header.
    pub id: String,
    pub model: String,
    pub stream: bool,
    pub message_count: usize,
    pub started: Instant,
}

impl RequestContext {
    pub fn from_body(body: &Value) -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(12);

        Self {
            id,
            model: body
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            stream: body.get("stream").and_then(Value::as_bool).unwrap_or(false),
            message_count: body
                .get("messages")
                .and_then(Value::as_array)
                .map_or(0, |m| m.len()),
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

/// Ordered reasoning fragments extracted from one request's stream.
#[derive(Debug, Default)]
pub struct ThinkingAccumulator {
    fragments: Vec<String>,
    detected: bool,
}

impl ThinkingAccumulator {
    /// Append a fragment. Returns true only for the first fragment of the
    /// request, so detection side effects fire exactly once.
    pub fn record(&mut self, fragment: &str) -> bool {
        self.fragments.push(fragment.to_string());
        if self.detected {
            false
        } else {
            self.detected = true;
            true
        }
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    pub fn concatenated(&self) -> String {
        self.fragments.concat()
    }
}

/// Wrap the upstream byte stream for the client response body.
///
/// Every chunk is yielded to the client verbatim before it is inspected, so
/// inspection can never delay or corrupt forwarding. Lines closed by the
/// chunk then feed the inspector; thinking fragments accumulate and the first
/// one bumps the process-wide counter.
///
/// On a mid-stream upstream error the stream terminates (headers are already
/// out); a final `data: {"error": ...}` frame is injected only when
/// `emit_error_frame` is set. Dropping the returned stream - axum does this
/// when the client disconnects - drops the upstream stream with it, aborting
/// the upstream read.
pub fn relay_stream<S, E>(
    upstream: S,
    ctx: RequestContext,
    stats: Arc<RelayStats>,
    emit_error_frame: bool,
) -> impl Stream<Item = Result<Bytes, io::Error>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut splitter = LineSplitter::new();
        let mut thinking = ThinkingAccumulator::default();
        let mut chunk_count = 0u64;

        futures::pin_mut!(upstream);

        while let Some(item) = upstream.next().await {
            match item {
                Ok(chunk) => {
                    chunk_count += 1;
                    // Forward first, inspect after.
                    yield Ok(chunk.clone());

                    for line in splitter.push(&chunk) {
                        match inspect_line(&line) {
                            LineEvent::Event { thinking: Some(fragment), .. } => {
                                if thinking.record(&fragment) {
                                    stats.record_thinking();
                                    info!("[{}] Reasoning content detected", ctx.id);
                                }
                            }
                            LineEvent::Event { has_content: true, .. } => {
                                debug!("[{}] content delta", ctx.id);
                            }
                            // Done, Noise, Ignored and empty events need no action
                            _ => {}
                        }
                    }
                }
                Err(e) => {
                    stats.record_error();
                    error!(
                        "[{}] Upstream stream error after {} chunk(s): {}",
                        ctx.id, chunk_count, e
                    );
                    if emit_error_frame {
                        let frame = serde_json::json!({ "error": e.to_string() });
                        yield Ok(Bytes::from(format!("data: {}\n\n", frame)));
                    }
                    return;
                }
            }
        }

        info!(
            "[{}] Stream complete | Chunks: {} | Duration: {}ms | Thinking: {}",
            ctx.id,
            chunk_count,
            ctx.elapsed_ms(),
            thinking.detected()
        );
        if thinking.detected() {
            let text = thinking.concatenated();
            let preview: String = text.chars().take(THINKING_PREVIEW_CHARS).collect();
            debug!(
                "[{}] Reasoning transcript ({} chars): {}",
                ctx.id,
                text.chars().count(),
                preview
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    fn test_ctx(stream: bool) -> RequestContext {
        RequestContext::from_body(&json!({
            "model": "deepseek-reasoner",
            "stream": stream,
            "messages": [{"role": "user", "content": "hi"}],
        }))
    }

    async fn run_relay(
        chunks: Vec<Result<Bytes, &'static str>>,
        emit_error_frame: bool,
    ) -> (Vec<Bytes>, Arc<RelayStats>) {
        let stats = Arc::new(RelayStats::new());
        let out: Vec<Bytes> = relay_stream(
            stream::iter(chunks),
            test_ctx(true),
            stats.clone(),
            emit_error_frame,
        )
        .map(|r| r.unwrap())
        .collect()
        .await;
        (out, stats)
    }

    #[test]
    fn context_reads_body_fields() {
        let ctx = test_ctx(true);
        assert_eq!(ctx.model, "deepseek-reasoner");
        assert!(ctx.stream);
        assert_eq!(ctx.message_count, 1);
        assert_eq!(ctx.id.len(), 12);
    }

    #[test]
    fn context_tolerates_missing_fields() {
        let ctx = RequestContext::from_body(&json!({}));
        assert_eq!(ctx.model, "unknown");
        assert!(!ctx.stream);
        assert_eq!(ctx.message_count, 0);
    }

    #[test]
    fn accumulator_first_detection_only_once() {
        let mut acc = ThinkingAccumulator::default();
        assert!(acc.record("a"));
        assert!(!acc.record("b"));
        assert!(!acc.record("c"));
        assert_eq!(acc.concatenated(), "abc");
        assert!(acc.detected());
    }

    #[tokio::test]
    async fn bytes_pass_through_unchanged_and_in_order() {
        // SSE frames split at awkward boundaries
        let chunks: Vec<Result<Bytes, &'static str>> = vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"del")),
            Ok(Bytes::from_static(b"ta\":{\"content\":\"Hi\"}}]}\n\ndata: [D")),
            Ok(Bytes::from_static(b"ONE]\n\n")),
        ];
        let expected: Vec<u8> = chunks
            .iter()
            .map(|c| c.as_ref().unwrap().to_vec())
            .flatten()
            .collect();

        let (out, stats) = run_relay(chunks, false).await;

        let forwarded: Vec<u8> = out.iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(forwarded, expected);
        assert_eq!(out.len(), 3, "chunk boundaries must be preserved");
        assert_eq!(stats.thinking_requests(), 0);
        assert_eq!(stats.errors(), 0);
    }

    #[tokio::test]
    async fn thinking_counter_increments_once_per_request() {
        let chunks: Vec<Result<Bytes, &'static str>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"x\"}}]}\n\n",
            )),
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"y\"}}]}\n\n",
            )),
            Ok(Bytes::from_static(b"data: [DONE]\n\n")),
        ];

        let (_, stats) = run_relay(chunks, false).await;
        assert_eq!(stats.thinking_requests(), 1);
    }

    #[tokio::test]
    async fn noise_and_done_do_not_interrupt_forwarding() {
        let chunks: Vec<Result<Bytes, &'static str>> = vec![
            Ok(Bytes::from_static(b"data: not-json\n\n")),
            Ok(Bytes::from_static(b": keep-alive\n\n")),
            Ok(Bytes::from_static(b"data: [DONE]\n\n")),
        ];

        let (out, stats) = run_relay(chunks, false).await;
        assert_eq!(out.len(), 3);
        assert_eq!(stats.errors(), 0);
        assert_eq!(stats.thinking_requests(), 0);
    }

    #[tokio::test]
    async fn mid_stream_error_terminates_silently_by_default() {
        let chunks: Vec<Result<Bytes, &'static str>> = vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n")),
            Err("connection reset"),
        ];

        let (out, stats) = run_relay(chunks, false).await;
        assert_eq!(out.len(), 1, "no synthetic frame is injected");
        assert_eq!(stats.errors(), 1);
    }

    #[tokio::test]
    async fn mid_stream_error_frame_is_opt_in() {
        let chunks: Vec<Result<Bytes, &'static str>> =
            vec![Ok(Bytes::from_static(b"data: x\n")), Err("connection reset")];

        let (out, stats) = run_relay(chunks, true).await;
        assert_eq!(out.len(), 2);
        let frame = String::from_utf8(out[1].to_vec()).unwrap();
        assert!(frame.starts_with("data: {"));
        assert!(frame.contains("connection reset"));
        assert_eq!(stats.errors(), 1);
    }
}
