//! Classifies SSE lines and extracts reasoning side-channel content.
//!
//! Inspection is observation only: whatever this module decides about a line,
//! the original bytes have already been forwarded to the client. Malformed
//! payloads are noise, never errors.

use serde_json::Value;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Outcome of inspecting one complete line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Not a `data:` line: comment, blank keep-alive, or other framing.
    Ignored,
    /// The stream-end sentinel. Carries no payload and is not an error.
    Done,
    /// A `data:` line whose payload did not parse as JSON.
    Noise,
    /// A parsed payload.
    Event {
        thinking: Option<String>,
        has_content: bool,
    },
}

/// Inspect one line emitted by the splitter.
pub fn inspect_line(line: &str) -> LineEvent {
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return LineEvent::Ignored;
    };

    let payload = rest.trim();
    if payload == DONE_SENTINEL {
        return LineEvent::Done;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => LineEvent::Event {
            thinking: extract_thinking(&value).map(str::to_owned),
            has_content: has_content(&value),
        },
        Err(_) => LineEvent::Noise,
    }
}

/// Pull a reasoning fragment out of a chat-completion payload, if present.
///
/// Streaming deltas are probed first (`reasoning_content` as DeepSeek emits
/// it, then the `reasoning`/`thinking` spellings other upstreams use), then
/// the message-level field of the final non-streaming shape. Empty strings do
/// not count.
pub fn extract_thinking(payload: &Value) -> Option<&str> {
    let choice = payload.get("choices").and_then(|c| c.get(0))?;

    if let Some(delta) = choice.get("delta") {
        for key in ["reasoning_content", "reasoning", "thinking"] {
            if let Some(text) = delta.get(key).and_then(Value::as_str) {
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
    }

    choice
        .get("message")
        .and_then(|m| m.get("reasoning_content"))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

/// Whether ordinary completion text is present. Used for progress logging
/// only; the text itself is never stored.
pub fn has_content(payload: &Value) -> bool {
    let Some(choice) = payload.get("choices").and_then(|c| c.get(0)) else {
        return false;
    };

    let delta_text = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str);
    let message_text = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str);

    delta_text.or(message_text).map_or(false, |s| !s.is_empty())
}
