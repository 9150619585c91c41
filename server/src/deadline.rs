//! The deadline manager (C4, §4.4): cancels a call when its `grpc-timeout`
//! elapses.
//!
//! Grounded in the workspace's `ConnectTimeout`/`compute_effective_timeout`
//! machinery (`connectrpc-axum/src/context/timeout.rs`), replacing
//! millisecond-only `Connect-Timeout-Ms` parsing with the multi-unit
//! `grpc-timeout` codec (`grpc_core::timeout`) and adding the single-fire
//! timer/dispose state machine the distilled spec calls for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use grpc_core::{timeout::parse_timeout, CollectingEventSink, Code, Event, EventSink, GrpcError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// `u32::MAX` milliseconds (~49 days): documents the reasoning for chained
/// rescheduling even though `tokio::time::Sleep` has no such ceiling itself
/// (§4.4).
pub const MAX_TIMER_DUE_TIME: Duration = Duration::from_millis(u32::MAX as u64);

#[derive(Debug, Clone)]
struct DeadlineState {
    status: Option<GrpcError>,
}

/// Per-call deadline tracker. Installed only when the call carries a valid
/// `grpc-timeout`; absent otherwise (no deadline).
pub struct DeadlineManager {
    deadline: tokio::time::Instant,
    original: Duration,
    state: Mutex<DeadlineState>,
    cancel: CancellationToken,
    disposed: AtomicBool,
}

impl DeadlineManager {
    /// Parse `grpc-timeout` and, if valid, return an installed manager
    /// driving a background fire task. Returns `None` for a missing or
    /// invalid header (§4.3: invalid values are ignored with a warning, not
    /// rejected).
    pub fn from_header(
        value: Option<&str>,
        events: &Arc<dyn EventSink>,
    ) -> Option<Arc<Self>> {
        let raw = value?;
        let duration = match parse_timeout(raw) {
            Some(d) => d,
            None => {
                tracing::warn!(value = raw, "InvalidTimeoutIgnored: malformed grpc-timeout");
                return None;
            }
        };
        Some(Self::new(duration, events))
    }

    fn new(duration: Duration, events: &Arc<dyn EventSink>) -> Arc<Self> {
        let manager = Arc::new(Self {
            deadline: tokio::time::Instant::now() + duration,
            original: duration,
            state: Mutex::new(DeadlineState { status: None }),
            cancel: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        });
        tokio::spawn(Self::run(Arc::clone(&manager), duration, Arc::clone(events)));
        manager
    }

    async fn run(manager: Arc<Self>, total: Duration, events: Arc<dyn EventSink>) {
        let mut remaining = total;
        loop {
            let step = remaining.min(MAX_TIMER_DUE_TIME);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
            if remaining.is_zero() {
                break;
            }
            tracing::debug!(remaining_ms = remaining.as_millis(), "DeadlineTimerRescheduled");
        }
        manager.fire(&events).await;
    }

    async fn fire(&self, events: &Arc<dyn EventSink>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let mut state = self.state.lock().await;
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        state.status = Some(GrpcError::status(
            Code::DeadlineExceeded,
            format!(
                "Request with timeout of {} has exceeded its deadline.",
                grpc_core::timeout::format_timeout(self.original)
            ),
        ));
        drop(state);
        events.emit(Event::CallDeadlineExceeded);
        self.cancel.cancel();
    }

    /// The token cancelled when the deadline fires; callers select on
    /// `cancellation_token().cancelled()` alongside their normal work.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The terminal status if the deadline has already fired, else `None`.
    pub async fn status(&self) -> Option<GrpcError> {
        self.state.lock().await.status.clone()
    }

    pub fn deadline(&self) -> tokio::time::Instant {
        self.deadline
    }

    /// Mark the manager disposed: a currently-running fire completes (the
    /// lock serializes with it), but any later spurious fire is a no-op.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sink() -> Arc<dyn EventSink> {
        Arc::new(CollectingEventSink::new())
    }

    #[test]
    fn missing_header_yields_no_manager() {
        assert!(DeadlineManager::from_header(None, &sink()).is_none());
    }

    #[test]
    fn invalid_header_yields_no_manager() {
        assert!(DeadlineManager::from_header(Some("0S"), &sink()).is_none());
        assert!(DeadlineManager::from_header(Some("bogus"), &sink()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_and_cancels_token() {
        let events = sink();
        let manager = DeadlineManager::from_header(Some("10m"), &events).unwrap();
        assert!(manager.status().await.is_none());

        tokio::time::advance(Duration::from_millis(11)).await;
        tokio::task::yield_now().await;

        assert!(manager.cancellation_token().is_cancelled());
        let status = manager.status().await.unwrap();
        assert_eq!(status.code(), Code::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_suppresses_subsequent_fire_effects() {
        let events = sink();
        let manager = DeadlineManager::from_header(Some("5m"), &events).unwrap();
        manager.dispose();

        tokio::time::advance(Duration::from_millis(6)).await;
        tokio::task::yield_now().await;

        // Disposed before the timer fired: no status is ever recorded.
        assert!(manager.status().await.is_none());
    }
}
