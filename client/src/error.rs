//! Client-side error types (§7).
//!
//! [`ClientError`] is the error type every client operation returns;
//! [`ClientError::code`] always maps to a [`grpc_core::Code`], matching the
//! taxonomy the wire protocol itself uses.

use grpc_core::{Code, GrpcError, Status};

/// Client-side error variants. Transport and framing concerns are kept
/// distinct from `Rpc` (a terminal status returned by the peer) so that
/// retry eligibility (§4.9) can be decided from the variant alone.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// A terminal status returned by the peer.
    #[error("{0:?}")]
    Rpc(Status),

    /// Connection failed, reset, or timed out below the RPC layer.
    #[error("transport error: {0}")]
    Transport(String),

    /// Failed to serialize an outgoing message.
    #[error("encode error: {0}")]
    Encode(String),

    /// Failed to deserialize an incoming message.
    #[error("decode error: {0}")]
    Decode(String),

    /// Malformed frame, header, or trailer.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration discovered at `build()`/`validate()` time.
    /// Always returned, never panics (§1.1).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        ClientError::Rpc(Status::new(code, Some(message.into())))
    }

    pub fn from_code(code: Code) -> Self {
        ClientError::Rpc(Status::new(code, None))
    }

    /// Maps every variant to a terminal [`Code`]:
    /// transport errors to `Unavailable`, encode/decode/configuration to
    /// `Internal`, protocol to `InvalidArgument`.
    pub fn code(&self) -> Code {
        match self {
            ClientError::Rpc(status) => status.code(),
            ClientError::Transport(_) => Code::Unavailable,
            ClientError::Encode(_) | ClientError::Decode(_) | ClientError::Configuration(_) => {
                Code::Internal
            }
            ClientError::Protocol(_) => Code::InvalidArgument,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Rpc(status) => status.message(),
            ClientError::Transport(msg)
            | ClientError::Encode(msg)
            | ClientError::Decode(msg)
            | ClientError::Protocol(msg)
            | ClientError::Configuration(msg) => Some(msg),
        }
    }

    pub fn status(&self) -> Option<&Status> {
        match self {
            ClientError::Rpc(status) => Some(status),
            _ => None,
        }
    }

    pub fn into_status(self) -> Option<Status> {
        match self {
            ClientError::Rpc(status) => Some(status),
            _ => None,
        }
    }

    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        ClientError::Configuration(message.into())
    }

    /// Whether a retry/hedging attempt may be spawned for this error, per
    /// the call's configured `retryableStatusCodes` (§4.9/§4.11). A bare
    /// status code check, independent of attempt count or throttle state.
    pub fn is_retryable_as(&self, retryable_codes: &[Code]) -> bool {
        retryable_codes.contains(&self.code())
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Rpc(status)
    }
}

impl From<GrpcError> for ClientError {
    fn from(err: GrpcError) -> Self {
        match err {
            GrpcError::Protocol(msg) => ClientError::Protocol(msg),
            GrpcError::Size(msg) => ClientError::Rpc(Status::new(Code::ResourceExhausted, Some(msg))),
            GrpcError::Deadline => ClientError::Rpc(Status::new(Code::DeadlineExceeded, None)),
            GrpcError::Cancellation(msg) => ClientError::Rpc(Status::new(Code::Cancelled, Some(msg))),
            GrpcError::Status { code, message } => ClientError::Rpc(Status::new(code, message)),
            GrpcError::Transport(msg) => ClientError::Transport(msg),
            GrpcError::Configuration(msg) => ClientError::Configuration(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_carries_code_and_message() {
        let err = ClientError::new(Code::NotFound, "resource not found");
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.message(), Some("resource not found"));
    }

    #[test]
    fn from_code_has_no_message() {
        let err = ClientError::from_code(Code::Internal);
        assert_eq!(err.code(), Code::Internal);
        assert!(err.message().is_none());
    }

    #[test]
    fn non_rpc_variants_map_to_expected_codes() {
        assert_eq!(ClientError::Transport("refused".into()).code(), Code::Unavailable);
        assert_eq!(ClientError::Encode("bad".into()).code(), Code::Internal);
        assert_eq!(ClientError::Decode("bad".into()).code(), Code::Internal);
        assert_eq!(ClientError::Protocol("bad frame".into()).code(), Code::InvalidArgument);
        assert_eq!(ClientError::Configuration("bad policy".into()).code(), Code::Internal);
    }

    #[test]
    fn is_retryable_as_checks_membership() {
        let retryable = [Code::Unavailable, Code::ResourceExhausted];
        assert!(ClientError::unavailable("down").is_retryable_as(&retryable));
        assert!(!ClientError::not_found("missing").is_retryable_as(&retryable));
        assert!(ClientError::Transport("reset".into()).is_retryable_as(&retryable));
    }

    #[test]
    fn status_accessors_round_trip() {
        let err = ClientError::new(Code::NotFound, "missing");
        assert!(err.status().is_some());
        assert_eq!(err.status().unwrap().code(), Code::NotFound);

        let err = ClientError::Transport("network error".into());
        assert!(err.status().is_none());
    }

    #[test]
    fn from_grpc_error_preserves_code_and_message() {
        let err: ClientError = GrpcError::unavailable("overloaded").into();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(err.message(), Some("overloaded"));
    }
}
