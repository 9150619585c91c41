//! The server call pipeline (C6, §4.6): the state machine that validates a
//! request, drives the four method shapes through the message codec (C1),
//! and finalizes trailers via the metadata codec (C2).
//!
//! Adapted from the workspace's `RequestPipeline`/`ResponsePipeline`
//! (`connectrpc-axum/src/pipeline.rs`), which decoded/encoded a single
//! Connect message; this version additionally drives continuous
//! frame-at-a-time streaming for the three non-unary shapes and always
//! finalizes a `grpc-status` trailer rather than a JSON error body.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, StatusCode};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use grpc_core::frame::{self, FrameLimits, WriteOptions};
use grpc_core::metadata::percent_encode_message;
use grpc_core::{compression::peer_accepts, Code, Event, GrpcError, Status};
use http_body::Frame;
use http_body_util::StreamBody;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::context::CallContext;
use crate::stream::{MessageReader, MessageWriter};

const GRPC_STATUS: &str = "grpc-status";
const GRPC_MESSAGE: &str = "grpc-message";

/// Validate the request before dispatch: content-type must declare gRPC.
/// A mismatch is rejected pre-dispatch with a plain HTTP status rather than
/// a gRPC trailer, per §7 ("Protocol errors that imply the peer is not
/// gRPC-compatible ... surfaced ... as a `505`/`415` HTTP response").
pub fn validate_protocol<B>(req: &Request<B>) -> Result<(), Response<Body>> {
    let content_type = req
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("application/grpc") {
        return Err(Response::builder()
            .status(StatusCode::UNSUPPORTED_MEDIA_TYPE)
            .body(Body::empty())
            .unwrap());
    }
    Ok(())
}

fn status_trailers(status: &Status) -> HeaderMap {
    let mut trailers = HeaderMap::new();
    trailers.insert(GRPC_STATUS, status.code().as_u32().to_string().parse().unwrap());
    if let Some(message) = status.message() {
        if !message.is_empty() {
            trailers.insert(
                GRPC_MESSAGE,
                percent_encode_message(message).parse().unwrap(),
            );
        }
    }
    trailers
}

/// Build a trailers-only response: no data frame was ever written, so the
/// status goes out as headers immediately (§4.2).
fn trailers_only(status: Status) -> Response<Body> {
    let mut builder = Response::builder().status(StatusCode::OK);
    for (name, value) in status_trailers(&status).iter() {
        builder = builder.header(name, value);
    }
    builder.body(Body::empty()).unwrap()
}

/// Build a response carrying one or more data frames followed by a
/// `grpc-status` trailer block, via `StreamBody` (data frames, then a
/// trailers frame). `status` is known up front (the unary shape: the whole
/// response is already in hand before any bytes are written).
fn streaming_response(
    frames: impl Stream<Item = Bytes> + Send + 'static,
    status: Status,
) -> Response<Body> {
    let trailers = status_trailers(&status);
    let frame_stream = frames
        .map(|b| Ok::<_, Infallible>(Frame::data(b)))
        .chain(stream::once(async move { Ok(Frame::trailers(trailers)) }));
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::new(StreamBody::new(frame_stream)))
        .unwrap()
}

/// Like [`streaming_response`], but the terminal status is only known after
/// the data frames have been fully produced (the three streaming shapes):
/// `status` resolves from the same frame source that produced `frames`, so
/// the trailer reflects whatever error (if any) ended the stream.
fn streaming_response_with_deferred_status(
    frames: impl Stream<Item = Bytes> + Send + 'static,
    status: impl std::future::Future<Output = Status> + Send + 'static,
) -> Response<Body> {
    let frame_stream = frames
        .map(|b| Ok::<_, Infallible>(Frame::data(b)))
        .chain(stream::once(
            async move { Ok(Frame::trailers(status_trailers(&status.await))) },
        ));
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::new(StreamBody::new(frame_stream)))
        .unwrap()
}

/// The unary call shape (§2: one request message, one response message).
pub struct GrpcPipeline;

impl GrpcPipeline {
    /// Drive a unary call end to end: read the single request frame, invoke
    /// `handler`, write the single response frame, finalize trailers.
    pub async fn unary<Req, Resp, F, Fut>(
        ctx: &CallContext,
        full_name: &str,
        body: Bytes,
        handler: F,
    ) -> Response<Body>
    where
        Req: prost::Message + Default,
        Resp: prost::Message,
        F: FnOnce(Req) -> Fut,
        Fut: std::future::Future<Output = Result<Resp, GrpcError>>,
    {
        ctx.events.emit(Event::CallStart {
            full_name: full_name.to_string(),
        });

        let limits = ctx.limits.to_frame_limits();
        let result = Self::handle_unary(ctx, limits, body, handler).await;

        let status = match &result {
            Ok(_) => Status::ok(),
            Err(err) => {
                ctx.events.emit(Event::CallFailed { status_code: err.code() });
                Status::from(err)
            }
        };
        ctx.events.emit(Event::CallStop);

        match result {
            Ok(payload) => streaming_response(stream::once(async move { payload }), status),
            Err(_) => trailers_only(status),
        }
    }

    async fn handle_unary<Req, Resp, F, Fut>(
        ctx: &CallContext,
        limits: FrameLimits,
        body: Bytes,
        handler: F,
    ) -> Result<Bytes, GrpcError>
    where
        Req: prost::Message + Default,
        Resp: prost::Message,
        F: FnOnce(Req) -> Fut,
        Fut: std::future::Future<Output = Result<Resp, GrpcError>>,
    {
        let payload = frame::read_one(&body, ctx.request_encoding, limits)?;
        ctx.events.emit(Event::MessageReceived);
        let request = Req::decode(payload)
            .map_err(|e| GrpcError::Protocol(format!("failed to decode request: {e}")))?;

        let run_handler = handler(request);
        let response = match &ctx.deadline {
            Some(deadline) => {
                tokio::select! {
                    result = run_handler => result?,
                    _ = deadline.cancellation_token().cancelled() => {
                        return Err(deadline.status().await.unwrap_or(GrpcError::Deadline));
                    }
                }
            }
            None => run_handler.await?,
        };

        let mut encoded = Vec::with_capacity(response.encoded_len());
        response
            .encode(&mut encoded)
            .map_err(|e| GrpcError::Protocol(format!("failed to encode response: {e}")))?;
        ctx.events.emit(Event::MessageSent);

        let response_encoding = ctx.request_encoding;
        let should_compress = peer_accepts(ctx.accept_encoding.as_deref(), response_encoding);
        frame::write(
            &encoded,
            response_encoding,
            limits,
            WriteOptions {
                no_compress: !should_compress,
            },
        )
    }

    /// Server-streaming shape (§2): one request message, a stream of
    /// response messages. `responses` yields already-encoded frames; the
    /// first `Err` ends the stream and becomes the terminal status.
    pub fn server_streaming(
        ctx: &CallContext,
        full_name: &str,
        responses: impl Stream<Item = Result<Bytes, GrpcError>> + Send + 'static,
    ) -> Response<Body> {
        ctx.events.emit(Event::CallStart {
            full_name: full_name.to_string(),
        });
        let events = ctx.events.clone();
        let (frames, status) = split_on_first_error(responses);
        let frames = frames.inspect(move |_| events.emit(Event::MessageSent));

        let status_events = ctx.events.clone();
        let status = async move {
            let status = status.await;
            if !status.is_ok() {
                status_events.emit(Event::CallFailed { status_code: status.code() });
            }
            status_events.emit(Event::CallStop);
            status
        };

        streaming_response_with_deferred_status(frames, status)
    }

    /// Client-streaming shape (§2): a stream of request messages, one
    /// response message once the client stream ends.
    pub async fn client_streaming<Req, Resp, F, Fut>(
        ctx: &CallContext,
        full_name: &str,
        body: impl Stream<Item = Result<Bytes, GrpcError>> + Send + Unpin + 'static,
        handler: F,
    ) -> Response<Body>
    where
        Req: prost::Message + Default,
        Resp: prost::Message,
        F: FnOnce(MessageReader<Box<dyn Stream<Item = Result<Bytes, GrpcError>> + Send + Unpin>>) -> Fut,
        Fut: std::future::Future<Output = Result<Resp, GrpcError>>,
    {
        ctx.events.emit(Event::CallStart {
            full_name: full_name.to_string(),
        });

        let limits = ctx.limits.to_frame_limits();
        let reader = MessageReader::new(
            Box::new(body) as Box<dyn Stream<Item = Result<Bytes, GrpcError>> + Send + Unpin>,
            ctx.request_encoding,
            limits,
        );

        let run_handler = handler(reader);
        let result: Result<Resp, GrpcError> = match &ctx.deadline {
            Some(deadline) => {
                tokio::select! {
                    result = run_handler => result,
                    _ = deadline.cancellation_token().cancelled() => {
                        Err(deadline.status().await.unwrap_or(GrpcError::Deadline))
                    }
                }
            }
            None => run_handler.await,
        };

        let encoded = result.and_then(|response| {
            let mut buf = Vec::with_capacity(response.encoded_len());
            response
                .encode(&mut buf)
                .map_err(|e| GrpcError::Protocol(format!("failed to encode response: {e}")))?;
            ctx.events.emit(Event::MessageSent);
            let should_compress = peer_accepts(ctx.accept_encoding.as_deref(), ctx.request_encoding);
            frame::write(
                &buf,
                ctx.request_encoding,
                limits,
                WriteOptions {
                    no_compress: !should_compress,
                },
            )
        });

        let status = match &encoded {
            Ok(_) => Status::ok(),
            Err(err) => {
                ctx.events.emit(Event::CallFailed { status_code: err.code() });
                Status::from(err)
            }
        };
        ctx.events.emit(Event::CallStop);

        match encoded {
            Ok(payload) => streaming_response(stream::once(async move { payload }), status),
            Err(_) => trailers_only(status),
        }
    }

    /// Duplex-streaming shape (§2): independent request and response
    /// streams, driven concurrently by the handler. `full_duplex` owns both
    /// halves; frames written before the handler returns are forwarded as
    /// soon as they're produced, and the terminal status is derived from
    /// the handler's own `Result`.
    pub fn duplex_streaming<F, Fut>(
        ctx: &CallContext,
        full_name: &str,
        body: impl Stream<Item = Result<Bytes, GrpcError>> + Send + Unpin + 'static,
        handler: F,
    ) -> Response<Body>
    where
        F: FnOnce(
                MessageReader<Box<dyn Stream<Item = Result<Bytes, GrpcError>> + Send + Unpin>>,
                MessageWriter,
            ) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = Result<(), GrpcError>> + Send + 'static,
    {
        ctx.events.emit(Event::CallStart {
            full_name: full_name.to_string(),
        });

        let limits = ctx.limits.to_frame_limits();
        let reader = MessageReader::new(
            Box::new(body) as Box<dyn Stream<Item = Result<Bytes, GrpcError>> + Send + Unpin>,
            ctx.request_encoding,
            limits,
        );
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let writer = MessageWriter::new(
            tx,
            ctx.request_encoding,
            ctx.accept_encoding.clone(),
            limits,
        );

        let events = ctx.events.clone();
        let deadline = ctx.deadline.clone();
        let run_handler = handler(reader, writer);
        let status = async move {
            let result = match deadline {
                Some(deadline) => {
                    tokio::select! {
                        result = run_handler => result,
                        _ = deadline.cancellation_token().cancelled() => {
                            Err(deadline.status().await.unwrap_or(GrpcError::Deadline))
                        }
                    }
                }
                None => run_handler.await,
            };
            let status = match &result {
                Ok(()) => Status::ok(),
                Err(err) => {
                    events.emit(Event::CallFailed { status_code: err.code() });
                    Status::from(err)
                }
            };
            events.emit(Event::CallStop);
            status
        };

        let sent_events = ctx.events.clone();
        let frames = UnboundedReceiverStream::new(rx).inspect(move |_| sent_events.emit(Event::MessageSent));
        streaming_response_with_deferred_status(frames, status)
    }
}

/// Split a fallible frame stream into (frames-until-first-error,
/// a future resolving to the terminal status). Frames after the first
/// error are dropped: exactly one terminal status is ever surfaced (§8
/// invariant).
fn split_on_first_error(
    stream: impl Stream<Item = Result<Bytes, GrpcError>> + Send + 'static,
) -> (
    impl Stream<Item = Bytes> + Send + 'static,
    impl std::future::Future<Output = Status> + Send + 'static,
) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut tx = Some(tx);
    let frames = stream::unfold((stream, tx.take()), |(mut stream, tx)| async move {
        match stream.next().await {
            Some(Ok(bytes)) => Some((bytes, (stream, tx))),
            Some(Err(err)) => {
                if let Some(tx) = tx {
                    let _ = tx.send(Status::from(&err));
                }
                None
            }
            None => {
                if let Some(tx) = tx {
                    let _ = tx.send(Status::ok());
                }
                None
            }
        }
    });
    let status = async move { rx.await.unwrap_or_else(|_| Status::ok()) };
    (frames, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grpc_core::compression::CompressionEncoding;
    use grpc_core::CollectingEventSink;
    use std::sync::Arc;

    fn ctx() -> CallContext {
        CallContext {
            peer: None,
            request_encoding: CompressionEncoding::Identity,
            accept_encoding: None,
            limits: crate::limits::MessageLimits::new(),
            deadline: None,
            events: Arc::new(CollectingEventSink::new()),
        }
    }

    #[test]
    fn validate_protocol_accepts_grpc_content_type() {
        let req = Request::builder()
            .header(axum::http::header::CONTENT_TYPE, "application/grpc+proto")
            .body(())
            .unwrap();
        assert!(validate_protocol(&req).is_ok());
    }

    #[test]
    fn validate_protocol_rejects_non_grpc_content_type() {
        let req = Request::builder()
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(())
            .unwrap();
        let resp = validate_protocol(&req).unwrap_err();
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn server_streaming_emits_every_frame_then_trailers() {
        let call_ctx = ctx();
        let frames = stream::iter(vec![
            Ok(Bytes::from_static(b"one")),
            Ok(Bytes::from_static(b"two")),
        ]);
        let response = GrpcPipeline::server_streaming(&call_ctx, "/svc/Stream", frames);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn split_on_first_error_stops_at_the_error() {
        let frames = stream::iter(vec![
            Ok(Bytes::from_static(b"one")),
            Err(GrpcError::internal("boom")),
            Ok(Bytes::from_static(b"never")),
        ]);
        let (frame_stream, status) = split_on_first_error(frames);
        let collected: Vec<_> = frame_stream.collect().await;
        assert_eq!(collected, vec![Bytes::from_static(b"one")]);
        assert_eq!(status.await.code(), Code::Internal);
    }
}
