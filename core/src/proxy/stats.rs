//! Process-wide request counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

/// Counters shared by every request pipeline. Injected via `Arc` from
/// `AppState` rather than living in a global; atomics because axum runs
/// handlers on a multi-threaded runtime.
pub struct RelayStats {
    started: Instant,
    total_requests: AtomicU64,
    streaming_requests: AtomicU64,
    thinking_requests: AtomicU64,
    errors: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total_requests: AtomicU64::new(0),
            streaming_requests: AtomicU64::new(0),
            thinking_requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Count one inbound chat request.
    pub fn record_request(&self, streaming: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if streaming {
            self.streaming_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count one request in which reasoning content was detected.
    /// The caller guarantees at most one call per request.
    pub fn record_thinking(&self) {
        self.thinking_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one failed request. At most one call per request, whatever the
    /// failure mode.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn streaming_requests(&self) -> u64 {
        self.streaming_requests.load(Ordering::Relaxed)
    }

    pub fn thinking_requests(&self) -> u64 {
        self.thinking_requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Snapshot for the /stats endpoint.
    pub fn snapshot(&self) -> Value {
        json!({
            "total_requests": self.total_requests(),
            "streaming_requests": self.streaming_requests(),
            "thinking_requests": self.thinking_requests(),
            "errors": self.errors(),
        })
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}
