//! Retry/hedging engine (C9, §4.9): drives one call through however many
//! attempts its [`MethodPolicy`] allows, replaying buffered request messages
//! against each new attempt and committing to the first attempt whose
//! outcome is final.
//!
//! The engine is transport-agnostic: [`RetryEngine::run`] takes a closure
//! that performs one attempt and returns an [`AttemptResult`]; `invoker`
//! supplies that closure, wiring the engine to [`crate::transport::HyperTransport`].

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use grpc_core::events::{CommitReason, Event, EventSink};
use grpc_core::{Code, Status};
use http::HeaderMap;
use tokio_util::sync::CancellationToken;

use super::policy::{HedgingPolicy, MethodPolicy};
use super::throttle::RetryThrottle;
use crate::ClientError;

/// Header carrying how many prior attempts preceded this one (§4.9). Sent
/// only on attempt 2 and later.
pub const GRPC_PREVIOUS_RPC_ATTEMPTS: &str = "grpc-previous-rpc-attempts";

/// Header a server may return to override the client's computed backoff, or
/// forbid further retries outright (§4.9).
pub const GRPC_RETRY_PUSHBACK_MS: &str = "grpc-retry-pushback-ms";

/// Parsed form of a `grpc-retry-pushback-ms` trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushback {
    /// No pushback trailer was present; use the policy's own backoff.
    None,
    /// The server named an exact delay, in milliseconds, to wait before the
    /// next attempt.
    DelayMs(u64),
    /// The server asked the client not to retry at all: a negative value,
    /// the literal `"stop"`, or any value that doesn't parse (§9 Open
    /// Question: treat an unparseable pushback as a stop request rather
    /// than ignoring it).
    Stop,
}

impl Pushback {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None => Pushback::None,
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.eq_ignore_ascii_case("stop") {
                    return Pushback::Stop;
                }
                match trimmed.parse::<i64>() {
                    Ok(ms) if ms >= 0 => Pushback::DelayMs(ms as u64),
                    _ => Pushback::Stop,
                }
            }
        }
    }
}

/// What the engine learns from driving one attempt to completion.
pub struct AttemptResult {
    /// `Some` once the attempt's response headers arrived — per §4.9 this
    /// alone is what commits the call, independent of the final status.
    pub headers: Option<HeaderMap>,
    pub status: Status,
    pub pushback: Pushback,
}

/// What one attempt closure is handed: its 1-indexed attempt number and how
/// many attempts preceded it (for the `grpc-previous-rpc-attempts` header),
/// plus the buffered messages to replay before sending anything new.
pub struct AttemptContext {
    pub attempt_number: u32,
    pub previous_attempts: u32,
    pub replay: Vec<Bytes>,
}

type AttemptFuture = Pin<Box<dyn Future<Output = AttemptResult> + Send>>;

/// Buffers every outbound message until the call commits, tagging each with
/// its sequence number so a new attempt can replay exactly the messages the
/// committed attempt never got a chance to send (§4.9). Cloneable; every
/// clone shares the same underlying buffer.
#[derive(Clone, Default)]
pub struct MessageBuffer {
    inner: Arc<Mutex<BufferState>>,
}

#[derive(Default)]
struct BufferState {
    messages: Vec<Bytes>,
    released: bool,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer one outbound message. A no-op once [`Self::release`] has been
    /// called — there is nothing left to replay after commit.
    pub fn push(&self, payload: Bytes) {
        let mut state = self.inner.lock().expect("message buffer mutex poisoned");
        if !state.released {
            state.messages.push(payload);
        }
    }

    /// Every buffered message, in send order, for replay against a new
    /// attempt.
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.inner
            .lock()
            .expect("message buffer mutex poisoned")
            .messages
            .clone()
    }

    /// Stop retaining messages and drop whatever is buffered: called once
    /// the engine commits, since no further attempt will ever need replay.
    pub fn release(&self) {
        let mut state = self.inner.lock().expect("message buffer mutex poisoned");
        state.released = true;
        state.messages.clear();
    }
}

/// Drives one call through its configured retry or hedging policy (§4.9),
/// emitting [`Event::AttemptSpawned`]/[`Event::CallCommitted`] as it goes.
pub struct RetryEngine {
    policy: Option<MethodPolicy>,
    throttle: RetryThrottle,
    sink: Arc<dyn EventSink>,
}

impl RetryEngine {
    pub fn new(policy: Option<MethodPolicy>, throttle: RetryThrottle, sink: Arc<dyn EventSink>) -> Self {
        Self { policy, throttle, sink }
    }

    /// Run one call to commit. `attempt` performs a single attempt and must
    /// resolve even when the call is never going to retry (the engine, not
    /// the closure, decides whether the failure is retryable).
    pub async fn run<A>(
        &self,
        cancel: CancellationToken,
        attempt: A,
    ) -> Result<(Option<HeaderMap>, Status), ClientError>
    where
        A: FnMut(AttemptContext) -> AttemptFuture,
    {
        match &self.policy {
            None => self.run_single(cancel, attempt).await,
            Some(policy) if policy.hedging.is_some() => {
                let hedging = policy.hedging.clone().expect("checked above");
                self.run_hedged(policy, hedging, cancel, attempt).await
            }
            Some(policy) => self.run_retried(policy, cancel, attempt).await,
        }
    }

    async fn run_single<A>(
        &self,
        cancel: CancellationToken,
        mut attempt: A,
    ) -> Result<(Option<HeaderMap>, Status), ClientError>
    where
        A: FnMut(AttemptContext) -> AttemptFuture,
    {
        self.sink.emit(Event::AttemptSpawned { attempt_number: 1 });
        let fut = attempt(AttemptContext {
            attempt_number: 1,
            previous_attempts: 0,
            replay: Vec::new(),
        });
        tokio::select! {
            _ = cancel.cancelled() => {
                self.sink.emit(Event::CallCommitted { reason: CommitReason::Canceled });
                Err(ClientError::cancelled("Call canceled by the client."))
            }
            result = fut => {
                if result.status.is_ok() {
                    self.throttle.on_success();
                } else {
                    self.throttle.on_failure();
                }
                self.sink.emit(Event::CallCommitted { reason: CommitReason::ResponseHeadersReceived });
                Ok((result.headers, result.status))
            }
        }
    }

    async fn run_retried<A>(
        &self,
        policy: &MethodPolicy,
        cancel: CancellationToken,
        mut attempt: A,
    ) -> Result<(Option<HeaderMap>, Status), ClientError>
    where
        A: FnMut(AttemptContext) -> AttemptFuture,
    {
        let mut attempt_number = 1u32;
        loop {
            self.sink.emit(Event::AttemptSpawned { attempt_number });
            let fut = attempt(AttemptContext {
                attempt_number,
                previous_attempts: attempt_number - 1,
                replay: Vec::new(),
            });

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    self.sink.emit(Event::CallCommitted { reason: CommitReason::Canceled });
                    return Err(ClientError::cancelled("Call canceled by the client."));
                }
                result = fut => result,
            };

            if let Some(headers) = result.headers {
                if result.status.is_ok() {
                    self.throttle.on_success();
                } else {
                    self.throttle.on_failure();
                }
                self.sink.emit(Event::CallCommitted { reason: CommitReason::ResponseHeadersReceived });
                return Ok((Some(headers), result.status));
            }

            self.throttle.on_failure();

            let retryable = policy.retryable_status_codes.contains(&result.status.code());
            let pushback_stops = matches!(result.pushback, Pushback::Stop);
            if !retryable || pushback_stops {
                self.sink.emit(Event::CallCommitted { reason: CommitReason::FatalStatusCode });
                return Ok((None, result.status));
            }
            if attempt_number >= policy.max_attempts {
                self.sink.emit(Event::CallCommitted { reason: CommitReason::ExceededAttemptCount });
                return Ok((None, result.status));
            }
            if !self.throttle.permits() {
                self.sink.emit(Event::CallCommitted { reason: CommitReason::Throttled });
                return Ok((None, result.status));
            }

            let delay = match result.pushback {
                Pushback::DelayMs(ms) => Duration::from_millis(ms),
                _ => policy.backoff_for_attempt(attempt_number),
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.sink.emit(Event::CallCommitted { reason: CommitReason::Canceled });
                    return Err(ClientError::cancelled("Call canceled by the client."));
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt_number += 1;
        }
    }

    async fn run_hedged<A>(
        &self,
        policy: &MethodPolicy,
        hedging: HedgingPolicy,
        cancel: CancellationToken,
        mut attempt: A,
    ) -> Result<(Option<HeaderMap>, Status), ClientError>
    where
        A: FnMut(AttemptContext) -> AttemptFuture,
    {
        let mut in_flight: FuturesUnordered<AttemptFuture> = FuturesUnordered::new();
        let mut spawned = 0u32;
        let mut fallback: Option<AttemptResult> = None;

        spawned += 1;
        self.sink.emit(Event::AttemptSpawned { attempt_number: spawned });
        in_flight.push(attempt(AttemptContext {
            attempt_number: spawned,
            previous_attempts: spawned - 1,
            replay: Vec::new(),
        }));

        loop {
            let spawn_delay = if spawned < policy.max_attempts && self.throttle.permits() {
                Some(hedging.hedging_delay)
            } else {
                None
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.sink.emit(Event::CallCommitted { reason: CommitReason::Canceled });
                    return Err(ClientError::cancelled("Call canceled by the client."));
                }
                _ = sleep_or_forever(spawn_delay) => {
                    spawned += 1;
                    self.sink.emit(Event::AttemptSpawned { attempt_number: spawned });
                    in_flight.push(attempt(AttemptContext {
                        attempt_number: spawned,
                        previous_attempts: spawned - 1,
                        replay: Vec::new(),
                    }));
                }
                Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                    if let Some(headers) = result.headers {
                        if result.status.is_ok() {
                            self.throttle.on_success();
                        } else {
                            self.throttle.on_failure();
                        }
                        let non_fatal = hedging.non_fatal_status_codes.contains(&result.status.code());
                        if result.status.is_ok() || !non_fatal {
                            self.sink.emit(Event::CallCommitted { reason: CommitReason::ResponseHeadersReceived });
                            return Ok((Some(headers), result.status));
                        }
                        fallback.get_or_insert(AttemptResult { headers: Some(headers), status: result.status, pushback: Pushback::None });
                    } else {
                        self.throttle.on_failure();
                    }

                    if in_flight.is_empty() && spawned >= policy.max_attempts {
                        if let Some(settled) = fallback.take() {
                            self.sink.emit(Event::CallCommitted { reason: CommitReason::ResponseHeadersReceived });
                            return Ok((settled.headers, settled.status));
                        }
                        self.sink.emit(Event::CallCommitted { reason: CommitReason::ExceededAttemptCount });
                        return Ok((
                            None,
                            Status::new(Code::Unavailable, Some("every hedged attempt failed".to_string())),
                        ));
                    }
                }
            }
        }
    }
}

async fn sleep_or_forever(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grpc_core::events::CollectingEventSink;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn sink() -> Arc<CollectingEventSink> {
        Arc::new(CollectingEventSink::new())
    }

    #[test]
    fn pushback_parses_delay_stop_and_unparseable() {
        assert_eq!(Pushback::parse(None), Pushback::None);
        assert_eq!(Pushback::parse(Some("100")), Pushback::DelayMs(100));
        assert_eq!(Pushback::parse(Some("-1")), Pushback::Stop);
        assert_eq!(Pushback::parse(Some("stop")), Pushback::Stop);
        assert_eq!(Pushback::parse(Some("not a number")), Pushback::Stop);
    }

    #[test]
    fn message_buffer_replays_in_order_until_released() {
        let buffer = MessageBuffer::new();
        buffer.push(Bytes::from_static(b"one"));
        buffer.push(Bytes::from_static(b"two"));
        assert_eq!(buffer.snapshot(), vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);

        buffer.release();
        assert!(buffer.snapshot().is_empty());
        buffer.push(Bytes::from_static(b"three"));
        assert!(buffer.snapshot().is_empty());
    }

    #[tokio::test]
    async fn single_attempt_commits_whatever_it_returns() {
        let engine = RetryEngine::new(None, RetryThrottle::default_policy(), sink());
        let (headers, status) = engine
            .run(CancellationToken::new(), |_ctx| {
                Box::pin(async {
                    AttemptResult {
                        headers: Some(HeaderMap::new()),
                        status: Status::new(Code::NotFound, None),
                        pushback: Pushback::None,
                    }
                }) as AttemptFuture
            })
            .await
            .unwrap();
        assert!(headers.is_some());
        assert_eq!(status.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn retries_until_headers_received() {
        let policy = MethodPolicy::aggressive();
        let engine = RetryEngine::new(Some(policy), RetryThrottle::default_policy(), sink());
        let calls = Arc::new(AtomicU32::new(0));

        let (headers, status) = engine
            .run(CancellationToken::new(), {
                let calls = calls.clone();
                move |_ctx| {
                    let calls = calls.clone();
                    Box::pin(async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        if n < 2 {
                            AttemptResult {
                                headers: None,
                                status: Status::new(Code::Unavailable, None),
                                pushback: Pushback::None,
                            }
                        } else {
                            AttemptResult {
                                headers: Some(HeaderMap::new()),
                                status: Status::ok(),
                                pushback: Pushback::None,
                            }
                        }
                    }) as AttemptFuture
                }
            })
            .await
            .unwrap();

        assert!(headers.is_some());
        assert!(status.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_status_commits_immediately() {
        let policy = MethodPolicy::aggressive();
        let engine = RetryEngine::new(Some(policy), RetryThrottle::default_policy(), sink());
        let calls = Arc::new(AtomicU32::new(0));

        let (_headers, status) = engine
            .run(CancellationToken::new(), {
                let calls = calls.clone();
                move |_ctx| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async {
                        AttemptResult {
                            headers: None,
                            status: Status::new(Code::InvalidArgument, None),
                            pushback: Pushback::None,
                        }
                    }) as AttemptFuture
                }
            })
            .await
            .unwrap();

        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pushback_stop_prevents_further_retries() {
        let policy = MethodPolicy::aggressive();
        let engine = RetryEngine::new(Some(policy), RetryThrottle::default_policy(), sink());
        let calls = Arc::new(AtomicU32::new(0));

        engine
            .run(CancellationToken::new(), {
                let calls = calls.clone();
                move |_ctx| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async {
                        AttemptResult {
                            headers: None,
                            status: Status::new(Code::Unavailable, None),
                            pushback: Pushback::Stop,
                        }
                    }) as AttemptFuture
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exceeding_max_attempts_commits_to_last_failure() {
        let mut policy = MethodPolicy::aggressive();
        policy.max_attempts = 2;
        policy.initial_backoff = Duration::from_millis(1);
        policy.max_backoff = Duration::from_millis(2);
        let engine = RetryEngine::new(Some(policy), RetryThrottle::default_policy(), sink());
        let calls = Arc::new(AtomicU32::new(0));

        let (_headers, status) = engine
            .run(CancellationToken::new(), {
                let calls = calls.clone();
                move |_ctx| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async {
                        AttemptResult {
                            headers: None,
                            status: Status::new(Code::Unavailable, None),
                            pushback: Pushback::None,
                        }
                    }) as AttemptFuture
                }
            })
            .await
            .unwrap();

        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_commits_immediately() {
        let policy = MethodPolicy::aggressive();
        let engine = RetryEngine::new(Some(policy), RetryThrottle::default_policy(), sink());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .run(cancel, |_ctx| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    AttemptResult {
                        headers: Some(HeaderMap::new()),
                        status: Status::ok(),
                        pushback: Pushback::None,
                    }
                }) as AttemptFuture
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::Cancelled);
    }

    #[tokio::test]
    async fn hedging_commits_on_first_ok_and_stops_spawning() {
        let mut policy = MethodPolicy::aggressive();
        policy.max_attempts = 3;
        policy.hedging = Some(HedgingPolicy {
            hedging_delay: Duration::from_secs(60),
            non_fatal_status_codes: &[],
        });
        let engine = RetryEngine::new(Some(policy), RetryThrottle::default_policy(), sink());

        let (headers, status) = engine
            .run(CancellationToken::new(), |_ctx| {
                Box::pin(async {
                    AttemptResult {
                        headers: Some(HeaderMap::new()),
                        status: Status::ok(),
                        pushback: Pushback::None,
                    }
                }) as AttemptFuture
            })
            .await
            .unwrap();

        assert!(headers.is_some());
        assert!(status.is_ok());
    }
}
