//! The server call context (C5, §4.5): per-call state built once at the
//! start of dispatch and threaded through the pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, Request};
use grpc_core::{compression::CompressionEncoding, EventSink};

use crate::deadline::DeadlineManager;
use crate::limits::MessageLimits;

pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";
pub const GRPC_ENCODING_HEADER: &str = "grpc-encoding";
pub const GRPC_ACCEPT_ENCODING_HEADER: &str = "grpc-accept-encoding";

/// The four gRPC method shapes (§2/§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Unary,
    ClientStreaming,
    ServerStreaming,
    DuplexStreaming,
}

/// Request extension identifying which registered method a call resolved
/// to, set by the service binder (C7) before the pipeline runs.
#[derive(Debug, Clone)]
pub struct GrpcMethodMetadata {
    pub service: String,
    pub method: String,
    pub kind: MethodKind,
}

impl GrpcMethodMetadata {
    pub fn full_name(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }
}

/// Per-call context: the wire-level facts every pipeline stage needs,
/// parsed once at C5 initialization (§4.5).
#[derive(Clone)]
pub struct CallContext {
    pub peer: Option<SocketAddr>,
    pub request_encoding: CompressionEncoding,
    pub accept_encoding: Option<String>,
    pub limits: MessageLimits,
    pub deadline: Option<Arc<DeadlineManager>>,
    pub events: Arc<dyn EventSink>,
}

impl CallContext {
    /// Build a context from request headers and connection info, per §4.5:
    /// parse timeout, install the deadline manager if valid, capture
    /// `grpc-encoding`/`grpc-accept-encoding`, stash the peer address.
    pub fn from_request<B>(
        req: &Request<B>,
        peer: Option<SocketAddr>,
        limits: MessageLimits,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let headers = req.headers();
        let request_encoding = header_str(headers, GRPC_ENCODING_HEADER)
            .and_then(CompressionEncoding::from_name)
            .unwrap_or_default();
        let accept_encoding = header_str(headers, GRPC_ACCEPT_ENCODING_HEADER).map(String::from);
        let deadline =
            DeadlineManager::from_header(header_str(headers, GRPC_TIMEOUT_HEADER), &events);

        Self {
            peer,
            request_encoding,
            accept_encoding,
            limits,
            deadline,
            events,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use grpc_core::CollectingEventSink;

    #[test]
    fn from_request_parses_encoding_and_timeout() {
        let req = Request::builder()
            .header(GRPC_ENCODING_HEADER, "gzip")
            .header(GRPC_ACCEPT_ENCODING_HEADER, "gzip, identity")
            .header(GRPC_TIMEOUT_HEADER, "10S")
            .body(())
            .unwrap();

        let ctx = CallContext::from_request(
            &req,
            None,
            MessageLimits::new(),
            Arc::new(CollectingEventSink::new()),
        );

        assert_eq!(ctx.request_encoding, CompressionEncoding::Gzip);
        assert_eq!(ctx.accept_encoding.as_deref(), Some("gzip, identity"));
        assert!(ctx.deadline.is_some());
    }

    #[test]
    fn from_request_without_timeout_has_no_deadline() {
        let req = Request::builder().body(()).unwrap();
        let ctx = CallContext::from_request(
            &req,
            None,
            MessageLimits::new(),
            Arc::new(CollectingEventSink::new()),
        );
        assert!(ctx.deadline.is_none());
    }
}
