//! Call invoker (C8, §4.8): the only way application code issues an RPC.
//!
//! Four call shapes — unary, client-streaming, server-streaming, and
//! duplex-streaming — all flow through the same [`RetryEngine`] (§4.9), so
//! application code never has to distinguish a first attempt from a retry
//! replaying buffered messages against a fresh connection. Every call stops
//! immediately with `Cancelled` / `"Call canceled by the client."` if the
//! caller's [`CancellationToken`] fires, or `"gRPC call disposed."` if every
//! clone of the call is dropped before it commits.

use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use grpc_core::compression::{self, CompressionEncoding};
use grpc_core::frame::{self, FrameLimits, WriteOptions};
use grpc_core::{Code, Status};
use http::{HeaderMap, Request};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use tokio_util::sync::CancellationToken;

use crate::options::{duration_to_timeout_header, CallOptions};
use crate::retry::{AttemptContext, AttemptResult, MessageBuffer, Pushback, RetryEngine, RetryThrottle, ServiceConfig};
use crate::transport::{HyperTransport, TransportBody};
use crate::ClientError;

const GRPC_STATUS: &str = "grpc-status";
const GRPC_MESSAGE: &str = "grpc-message";
const GRPC_ENCODING: &str = "grpc-encoding";
const GRPC_ACCEPT_ENCODING: &str = "grpc-accept-encoding";
const GRPC_TIMEOUT: &str = "grpc-timeout";
const GRPC_PREVIOUS_RPC_ATTEMPTS: &str = "grpc-previous-rpc-attempts";
const GRPC_CONTENT_TYPE: &str = "application/grpc+proto";

/// One gRPC endpoint's invoker: an HTTP transport, the service config that
/// decides each call's retry/hedging policy, and the shared throttle every
/// call's retries draw from (§4.10 — the bucket is channel-wide, not
/// per-call).
#[derive(Clone)]
pub struct Invoker {
    transport: HyperTransport,
    authority: Arc<str>,
    service_config: Arc<ServiceConfig>,
    throttle: RetryThrottle,
    sink: Arc<dyn grpc_core::events::EventSink>,
    encoding: CompressionEncoding,
    limits: FrameLimits,
}

impl Invoker {
    pub fn new(transport: HyperTransport, authority: impl Into<Arc<str>>, service_config: ServiceConfig) -> Self {
        Self {
            transport,
            authority: authority.into(),
            service_config: Arc::new(service_config),
            throttle: RetryThrottle::default_policy(),
            sink: Arc::new(grpc_core::events::TracingEventSink),
            encoding: CompressionEncoding::Identity,
            limits: FrameLimits::default(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn grpc_core::events::EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_throttle(mut self, throttle: RetryThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_encoding(mut self, encoding: CompressionEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_limits(mut self, limits: FrameLimits) -> Self {
        self.limits = limits;
        self
    }

    fn engine(&self, service: &str, method: &str) -> RetryEngine {
        let policy = self.service_config.resolve(service, method).cloned();
        RetryEngine::new(policy, self.throttle.clone(), self.sink.clone())
    }

    fn uri(&self, full_method: &str) -> Result<http::Uri, ClientError> {
        format!("{}/{}", self.authority.trim_end_matches('/'), full_method.trim_start_matches('/'))
            .parse()
            .map_err(|e| ClientError::Protocol(format!("invalid request URI: {e}")))
    }

    /// Unary call (§4.8): one request message in, one response message out.
    pub async fn unary<Req, Resp>(
        &self,
        full_method: &str,
        request: &Req,
        options: CallOptions,
        cancel: CancellationToken,
    ) -> Result<Resp, ClientError>
    where
        Req: prost::Message,
        Resp: prost::Message + Default,
    {
        let (service, method) = split_full_method(full_method)?;
        let engine = self.engine(service, method);
        let body_frame = encode_frame(request, self.encoding, self.limits)?;

        let outcome: Arc<Mutex<Option<(Vec<Bytes>, HeaderMap)>>> = Arc::new(Mutex::new(None));
        let uri = self.uri(full_method)?;

        let (_headers, status) = engine
            .run(cancel, |ctx: AttemptContext| {
                let transport = self.transport.clone();
                let uri = uri.clone();
                let options = options.clone();
                let body_frame = body_frame.clone();
                let outcome = outcome.clone();
                let encoding = self.encoding;
                let limits = self.limits;
                Box::pin(async move {
                    match run_unary_attempt(transport, uri, options, ctx, body_frame, encoding, limits).await {
                        Ok((headers, messages, trailers)) => {
                            let status = status_from_trailers(&headers, &trailers);
                            *outcome.lock().expect("outcome mutex poisoned") = Some((messages, trailers));
                            AttemptResult { headers: Some(headers), status, pushback: pushback_from(&trailers) }
                        }
                        Err(err) => attempt_failed(err),
                    }
                })
            })
            .await?;

        if !status.is_ok() {
            return Err(ClientError::from(status));
        }
        let (messages, _trailers) = outcome
            .lock()
            .expect("outcome mutex poisoned")
            .take()
            .ok_or_else(|| ClientError::internal("attempt committed with no response recorded"))?;
        let payload = messages
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Protocol("unary response carried no message".to_string()))?;
        Resp::decode(payload).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Client-streaming call (§4.8): many request messages, one response.
    /// Every sent message is buffered until commit so a retried attempt can
    /// replay the whole stream from the start.
    pub async fn client_streaming<Req, Resp, S>(
        &self,
        full_method: &str,
        requests: S,
        options: CallOptions,
        cancel: CancellationToken,
    ) -> Result<Resp, ClientError>
    where
        Req: prost::Message,
        Resp: prost::Message + Default,
        S: Stream<Item = Req> + Send + 'static,
    {
        let (service, method) = split_full_method(full_method)?;
        let engine = self.engine(service, method);
        let buffer = MessageBuffer::new();
        buffer_all_frames(requests, &buffer, self.encoding, self.limits).await?;

        let outcome: Arc<Mutex<Option<Vec<Bytes>>>> = Arc::new(Mutex::new(None));
        let uri = self.uri(full_method)?;

        let (_headers, status) = engine
            .run(cancel, |ctx: AttemptContext| {
                let transport = self.transport.clone();
                let uri = uri.clone();
                let options = options.clone();
                let buffer = buffer.clone();
                let outcome = outcome.clone();
                let encoding = self.encoding;
                let limits = self.limits;
                Box::pin(async move {
                    let frames = buffer.snapshot();
                    match run_streaming_request_attempt(transport, uri, options, ctx, frames, encoding, limits).await {
                        Ok((headers, messages, trailers)) => {
                            let status = status_from_trailers(&headers, &trailers);
                            *outcome.lock().expect("outcome mutex poisoned") = Some(messages);
                            AttemptResult { headers: Some(headers), status, pushback: pushback_from(&trailers) }
                        }
                        Err(err) => attempt_failed(err),
                    }
                })
            })
            .await?;

        buffer.release();
        if !status.is_ok() {
            return Err(ClientError::from(status));
        }
        let messages = outcome
            .lock()
            .expect("outcome mutex poisoned")
            .take()
            .ok_or_else(|| ClientError::internal("attempt committed with no response recorded"))?;
        let payload = messages
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Protocol("client-streaming response carried no message".to_string()))?;
        Resp::decode(payload).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Server-streaming call (§4.8): one request, a stream of responses.
    /// Committing happens the moment response headers arrive; the returned
    /// stream then yields decoded messages until the trailers close it,
    /// surfacing the final non-OK status (if any) as its last item.
    pub async fn server_streaming<Req, Resp>(
        &self,
        full_method: &str,
        request: &Req,
        options: CallOptions,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<Resp, ClientError>>, ClientError>
    where
        Req: prost::Message,
        Resp: prost::Message + Default + Send + 'static,
    {
        let (service, method) = split_full_method(full_method)?;
        let engine = self.engine(service, method);
        let body_frame = encode_frame(request, self.encoding, self.limits)?;

        let outcome: Arc<Mutex<Option<Incoming>>> = Arc::new(Mutex::new(None));
        let uri = self.uri(full_method)?;
        let encoding = self.encoding;
        let limits = self.limits;

        let (_headers, status) = engine
            .run(cancel, |ctx: AttemptContext| {
                let transport = self.transport.clone();
                let uri = uri.clone();
                let options = options.clone();
                let body_frame = body_frame.clone();
                let outcome = outcome.clone();
                Box::pin(async move {
                    let request_body = TransportBody::full(body_frame);
                    match send_request(transport, uri, options, ctx, request_body).await {
                        Ok(response) => {
                            let (parts, body) = response.into_parts();
                            *outcome.lock().expect("outcome mutex poisoned") = Some(body);
                            AttemptResult { headers: Some(parts.headers), status: Status::ok(), pushback: Pushback::None }
                        }
                        Err(err) => attempt_failed(err),
                    }
                })
            })
            .await?;

        if !status.is_ok() {
            return Err(ClientError::from(status));
        }
        let body = outcome
            .lock()
            .expect("outcome mutex poisoned")
            .take()
            .ok_or_else(|| ClientError::internal("attempt committed with no response body recorded"))?;
        Ok(decode_response_stream::<Resp>(body, encoding, limits))
    }

    /// Duplex-streaming call (§4.8): requests and responses interleave
    /// freely. Every outbound message is buffered for replay the same way
    /// [`Self::client_streaming`] buffers, but the response is a live
    /// stream, committed as soon as headers arrive.
    pub async fn duplex_streaming<Req, Resp, S>(
        &self,
        full_method: &str,
        requests: S,
        options: CallOptions,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<Resp, ClientError>>, ClientError>
    where
        Req: prost::Message,
        Resp: prost::Message + Default + Send + 'static,
        S: Stream<Item = Req> + Send + 'static,
    {
        let (service, method) = split_full_method(full_method)?;
        let engine = self.engine(service, method);
        let buffer = MessageBuffer::new();
        buffer_all_frames(requests, &buffer, self.encoding, self.limits).await?;

        let outcome: Arc<Mutex<Option<Incoming>>> = Arc::new(Mutex::new(None));
        let uri = self.uri(full_method)?;
        let encoding = self.encoding;
        let limits = self.limits;

        let (_headers, status) = engine
            .run(cancel, |ctx: AttemptContext| {
                let transport = self.transport.clone();
                let uri = uri.clone();
                let options = options.clone();
                let buffer = buffer.clone();
                let outcome = outcome.clone();
                Box::pin(async move {
                    let frames = buffer.snapshot();
                    let request_body = TransportBody::streaming(futures::stream::iter(frames.into_iter().map(Ok)));
                    match send_request(transport, uri, options, ctx, request_body).await {
                        Ok(response) => {
                            let (parts, body) = response.into_parts();
                            *outcome.lock().expect("outcome mutex poisoned") = Some(body);
                            AttemptResult { headers: Some(parts.headers), status: Status::ok(), pushback: Pushback::None }
                        }
                        Err(err) => attempt_failed(err),
                    }
                })
            })
            .await?;

        buffer.release();
        if !status.is_ok() {
            return Err(ClientError::from(status));
        }
        let body = outcome
            .lock()
            .expect("outcome mutex poisoned")
            .take()
            .ok_or_else(|| ClientError::internal("attempt committed with no response body recorded"))?;
        Ok(decode_response_stream::<Resp>(body, encoding, limits))
    }
}

fn split_full_method(full_method: &str) -> Result<(&str, &str), ClientError> {
    let trimmed = full_method.trim_start_matches('/');
    trimmed
        .rsplit_once('/')
        .ok_or_else(|| ClientError::Protocol(format!("malformed method name: {full_method}")))
}

fn encode_frame<Req: prost::Message>(
    request: &Req,
    encoding: CompressionEncoding,
    limits: FrameLimits,
) -> Result<Bytes, ClientError> {
    let mut buf = Vec::with_capacity(request.encoded_len());
    request.encode(&mut buf).map_err(|e| ClientError::Encode(e.to_string()))?;
    frame::write(&buf, encoding, limits, WriteOptions::default()).map_err(ClientError::from)
}

async fn buffer_all_frames<Req, S>(
    requests: S,
    buffer: &MessageBuffer,
    encoding: CompressionEncoding,
    limits: FrameLimits,
) -> Result<(), ClientError>
where
    Req: prost::Message,
    S: Stream<Item = Req> + Send + 'static,
{
    tokio::pin!(requests);
    while let Some(request) = requests.next().await {
        let frame = encode_frame(&request, encoding, limits)?;
        buffer.push(frame);
    }
    Ok(())
}

fn build_request(
    uri: &http::Uri,
    options: &CallOptions,
    encoding: CompressionEncoding,
    attempt_number: u32,
    previous_attempts: u32,
    body: TransportBody,
) -> Result<Request<TransportBody>, ClientError> {
    let _ = attempt_number;
    let mut builder = Request::post(uri)
        .header(http::header::CONTENT_TYPE, GRPC_CONTENT_TYPE)
        .header(http::header::TE, "trailers")
        .header(GRPC_ACCEPT_ENCODING, compression::supported_encodings_str());

    if !encoding.is_identity() {
        builder = builder.header(GRPC_ENCODING, encoding.as_str());
    }
    if let Some(timeout) = options.get_timeout() {
        if let Some(value) = duration_to_timeout_header(timeout) {
            builder = builder.header(GRPC_TIMEOUT, value);
        }
    }
    if previous_attempts > 0 {
        builder = builder.header(GRPC_PREVIOUS_RPC_ATTEMPTS, previous_attempts.to_string());
    }
    for (name, value) in options.get_headers().iter() {
        builder = builder.header(name.clone(), value.clone());
    }

    builder
        .body(body)
        .map_err(|e| ClientError::Protocol(format!("failed to build request: {e}")))
}

async fn send_request(
    transport: HyperTransport,
    uri: http::Uri,
    options: CallOptions,
    ctx: AttemptContext,
    body: TransportBody,
) -> Result<http::Response<Incoming>, ClientError> {
    let encoding = CompressionEncoding::Identity;
    let request = build_request(&uri, &options, encoding, ctx.attempt_number, ctx.previous_attempts, body)?;
    transport.request(request).await
}

async fn run_unary_attempt(
    transport: HyperTransport,
    uri: http::Uri,
    options: CallOptions,
    ctx: AttemptContext,
    body_frame: Bytes,
    encoding: CompressionEncoding,
    limits: FrameLimits,
) -> Result<(HeaderMap, Vec<Bytes>, HeaderMap), ClientError> {
    let request_body = TransportBody::full(body_frame);
    let request = build_request(&uri, &options, encoding, ctx.attempt_number, ctx.previous_attempts, request_body)?;
    let response = transport.request(request).await?;
    let (parts, body) = response.into_parts();
    let (messages, trailers) = collect_frames(body, encoding, limits).await?;
    Ok((parts.headers, messages, trailers))
}

async fn run_streaming_request_attempt(
    transport: HyperTransport,
    uri: http::Uri,
    options: CallOptions,
    ctx: AttemptContext,
    frames: Vec<Bytes>,
    encoding: CompressionEncoding,
    limits: FrameLimits,
) -> Result<(HeaderMap, Vec<Bytes>, HeaderMap), ClientError> {
    let request_body = TransportBody::streaming(futures::stream::iter(frames.into_iter().map(Ok)));
    let request = build_request(&uri, &options, encoding, ctx.attempt_number, ctx.previous_attempts, request_body)?;
    let response = transport.request(request).await?;
    let (parts, body) = response.into_parts();
    let (messages, trailers) = collect_frames(body, encoding, limits).await?;
    Ok((parts.headers, messages, trailers))
}

/// Drain a full response body, decoding every message frame and returning
/// the trailers that terminated it (§4.8 unary/client-streaming shape:
/// there is exactly one response to wait for, so buffering the whole body
/// is correct, not just convenient).
async fn collect_frames(
    body: Incoming,
    encoding: CompressionEncoding,
    limits: FrameLimits,
) -> Result<(Vec<Bytes>, HeaderMap), ClientError> {
    let collected = body
        .collect()
        .await
        .map_err(|e| ClientError::Transport(format!("failed to read response body: {e}")))?;
    let trailers = collected.trailers().cloned().unwrap_or_default();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&collected.to_bytes());

    let mut messages = Vec::new();
    loop {
        match frame::read_next(&mut buf, encoding, limits, true) {
            Ok(Some(payload)) => messages.push(payload),
            Ok(None) => break,
            Err(err) => return Err(ClientError::from(err)),
        }
    }
    Ok((messages, trailers))
}

/// Decode a live response body frame-by-frame as a lazy stream of messages,
/// ending with an error item carrying the final non-OK status if the
/// trailers reported one (§4.8 server/duplex-streaming shape).
fn decode_response_stream<Resp>(
    body: Incoming,
    encoding: CompressionEncoding,
    limits: FrameLimits,
) -> BoxStream<'static, Result<Resp, ClientError>>
where
    Resp: prost::Message + Default + Send + 'static,
{
    let stream = async_stream::stream! {
        tokio::pin!(body);
        let mut buf = BytesMut::new();
        let mut trailers = HeaderMap::new();
        loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    if let Some(data) = frame.data_ref() {
                        buf.extend_from_slice(data);
                        loop {
                            match frame::read_next(&mut buf, encoding, limits, false) {
                                Ok(Some(payload)) => {
                                    match Resp::decode(payload) {
                                        Ok(message) => yield Ok(message),
                                        Err(e) => {
                                            yield Err(ClientError::Decode(e.to_string()));
                                            return;
                                        }
                                    }
                                }
                                Ok(None) => break,
                                Err(err) => {
                                    yield Err(ClientError::from(err));
                                    return;
                                }
                            }
                        }
                    } else if let Some(t) = frame.trailers_ref() {
                        trailers = t.clone();
                    }
                }
                Some(Err(e)) => {
                    yield Err(ClientError::Transport(format!("stream read failed: {e}")));
                    return;
                }
                None => break,
            }
        }
        let status = status_from_trailers(&HeaderMap::new(), &trailers);
        if !status.is_ok() {
            yield Err(ClientError::from(status));
        }
    };
    Box::pin(stream)
}

fn status_from_trailers(headers: &HeaderMap, trailers: &HeaderMap) -> Status {
    let raw_code = trailers
        .get(GRPC_STATUS)
        .or_else(|| headers.get(GRPC_STATUS))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u32>().ok());
    let code = raw_code.and_then(Code::from_u32).unwrap_or(Code::Unknown);
    let message = trailers
        .get(GRPC_MESSAGE)
        .or_else(|| headers.get(GRPC_MESSAGE))
        .and_then(|v| v.to_str().ok())
        .map(|v| grpc_core::metadata::percent_decode_message(v));
    Status::new(code, message)
}

fn pushback_from(trailers: &HeaderMap) -> Pushback {
    Pushback::parse(
        trailers
            .get(crate::retry::engine::GRPC_RETRY_PUSHBACK_MS)
            .and_then(|v| v.to_str().ok()),
    )
}

fn attempt_failed(err: ClientError) -> AttemptResult {
    AttemptResult {
        headers: None,
        status: Status::new(err.code(), err.message().map(str::to_string)),
        pushback: Pushback::None,
    }
}
