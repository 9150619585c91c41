//! Retry throttle (C10, §3, §4.10): a per-channel token bucket that caps how
//! much retry/hedging traffic a run of failures can generate, independent of
//! any one call's own `max_attempts`.
//!
//! Modeled as a plain [`std::sync::Mutex`] over the bucket state, never held
//! across an `.await` — `permits()`/`on_success()`/`on_failure()` are all
//! synchronous and return immediately, the same "no I/O under lock" shape
//! [`grpc_core::events::CollectingEventSink`] uses for its own bookkeeping.

use std::sync::Mutex;

/// Token-bucket state (§4.10): `tokens` only ever moves between `0` and
/// `max_tokens`, accruing by `token_ratio` on every successful attempt and
/// dropping by `1.0` on every failed one.
struct ThrottleState {
    tokens: f64,
    max_tokens: f64,
    token_ratio: f64,
}

/// Per-channel retry throttle. Clone to share one bucket across every call
/// issued through the same invoker; the retry engine consults
/// [`RetryThrottle::permits`] before spawning a non-initial attempt and
/// reports [`RetryThrottle::on_success`]/[`RetryThrottle::on_failure`] after
/// every attempt completes, initial attempt included (§4.10: the bucket
/// tracks the whole channel's health, not just retried calls).
#[derive(Clone)]
pub struct RetryThrottle {
    state: std::sync::Arc<Mutex<ThrottleState>>,
}

impl RetryThrottle {
    /// `max_tokens` caps the bucket; `token_ratio` is how many tokens one
    /// success adds back (grpc's canonical default is `max_tokens=10`,
    /// `token_ratio=0.1`, i.e. ten successes repay one failure).
    pub fn new(max_tokens: f64, token_ratio: f64) -> Self {
        Self {
            state: std::sync::Arc::new(Mutex::new(ThrottleState {
                tokens: max_tokens,
                max_tokens,
                token_ratio,
            })),
        }
    }

    /// The default bucket grpc-go ships when a service config requests
    /// retries but no explicit `retryThrottling` policy.
    pub fn default_policy() -> Self {
        Self::new(10.0, 0.1)
    }

    /// Whether a new (non-initial) attempt may be spawned right now:
    /// `tokens > max_tokens / 2` (§4.10). Does not itself consume a token —
    /// consumption happens via [`Self::on_failure`] when the spawned attempt
    /// later fails.
    pub fn permits(&self) -> bool {
        let state = self.state.lock().expect("throttle mutex poisoned");
        state.tokens > state.max_tokens / 2.0
    }

    /// Record a successful attempt: tokens accrue by `token_ratio`, capped
    /// at `max_tokens`. Never resets to full — a single success does not
    /// erase a run of prior failures (§4.10).
    pub fn on_success(&self) {
        let mut state = self.state.lock().expect("throttle mutex poisoned");
        state.tokens = (state.tokens + state.token_ratio).min(state.max_tokens);
    }

    /// Record a failed attempt: tokens drop by `1.0`, floored at `0.0`.
    pub fn on_failure(&self) {
        let mut state = self.state.lock().expect("throttle mutex poisoned");
        state.tokens = (state.tokens - 1.0).max(0.0);
    }
}
