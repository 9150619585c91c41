//! gRPC status codes and the error taxonomy (§7).
//!
//! - [`Code`]: the seventeen canonical gRPC status codes, carried on the wire
//!   as the ASCII decimal `grpc-status` trailer.
//! - [`GrpcError`]: the error type produced anywhere in the core/server/client
//!   pipeline, always mappable to a terminal [`Code`] and an optional message.

/// The seventeen canonical gRPC status codes (`OK=0` .. `Unauthenticated=16`).
///
/// Unlike the Connect protocol, gRPC carries this as a bare ASCII decimal on
/// the wire (`grpc-status`), never a string name; [`Code::as_str`] exists for
/// logging and `grpc-message`-adjacent debug output only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Numeric value carried in the `grpc-status` trailer.
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// Parse a `grpc-status` trailer value. Out-of-range or non-numeric
    /// values are not a valid gRPC status; callers should treat them as
    /// `Unknown` (§7, Protocol errors).
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Code::Ok),
            1 => Some(Code::Cancelled),
            2 => Some(Code::Unknown),
            3 => Some(Code::InvalidArgument),
            4 => Some(Code::DeadlineExceeded),
            5 => Some(Code::NotFound),
            6 => Some(Code::AlreadyExists),
            7 => Some(Code::PermissionDenied),
            8 => Some(Code::ResourceExhausted),
            9 => Some(Code::FailedPrecondition),
            10 => Some(Code::Aborted),
            11 => Some(Code::OutOfRange),
            12 => Some(Code::Unimplemented),
            13 => Some(Code::Internal),
            14 => Some(Code::Unavailable),
            15 => Some(Code::DataLoss),
            16 => Some(Code::Unauthenticated),
            _ => None,
        }
    }

    /// Lowercase snake_case name, for logging and `tracing` fields only.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Cancelled => "cancelled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The error taxonomy used throughout the core, server, and client crates
/// (§7). Every variant maps to a terminal [`Code`] via [`GrpcError::code`];
/// nothing produced by this pipeline ever escapes as a panic.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GrpcError {
    /// Malformed content-type, HTTP version, frame, or metadata. Most
    /// protocol errors are surfaced to the peer as a terminal `Internal`
    /// status; a handful (unsupported content encoding) as `Unimplemented`.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A message (received or about to be sent) exceeds the configured
    /// `maxReceiveMessageSize`/`maxSendMessageSize`.
    #[error("{0}")]
    Size(String),

    /// The call's deadline elapsed before a terminal status was produced.
    #[error("deadline exceeded")]
    Deadline,

    /// The call was cancelled by the client, by call disposal, or (on the
    /// client) because the deadline fired before the server could respond.
    #[error("{0}")]
    Cancellation(String),

    /// A terminal status raised by application/handler code, or surfaced
    /// from an opaque handler error (`enable_detailed_errors` controls
    /// whether the message is included verbatim or replaced with a generic
    /// one).
    #[error("{message:?}")]
    Status {
        code: Code,
        message: Option<String>,
    },

    /// HTTP-level failure between a client and the peer (connection
    /// refused, reset, TLS handshake failure, etc.) rather than a gRPC
    /// status returned by the peer.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid configuration discovered at `build()` time. Always returned,
    /// never panics.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GrpcError {
    /// Map this error to its terminal gRPC status code.
    pub fn code(&self) -> Code {
        match self {
            GrpcError::Protocol(_) => Code::Internal,
            GrpcError::Size(_) => Code::ResourceExhausted,
            GrpcError::Deadline => Code::DeadlineExceeded,
            GrpcError::Cancellation(_) => Code::Cancelled,
            GrpcError::Status { code, .. } => *code,
            GrpcError::Transport(_) => Code::Unavailable,
            GrpcError::Configuration(_) => Code::Internal,
        }
    }

    /// The `grpc-message` text for this error, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            GrpcError::Protocol(msg)
            | GrpcError::Size(msg)
            | GrpcError::Cancellation(msg)
            | GrpcError::Transport(msg)
            | GrpcError::Configuration(msg) => Some(msg),
            GrpcError::Deadline => Some("deadline exceeded"),
            GrpcError::Status { message, .. } => message.as_deref(),
        }
    }

    pub fn status<S: Into<String>>(code: Code, message: S) -> Self {
        GrpcError::Status {
            code,
            message: Some(message.into()),
        }
    }

    pub fn status_from_code(code: Code) -> Self {
        GrpcError::Status {
            code,
            message: None,
        }
    }

    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::status(Code::Unimplemented, message)
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::status(Code::InvalidArgument, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::status(Code::NotFound, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::status(Code::Internal, message)
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::status(Code::Unavailable, message)
    }

    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::status(Code::ResourceExhausted, message)
    }

    /// `"Call canceled by the client."`, `"gRPC call disposed."`, or a
    /// deadline-derived message (§7).
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        GrpcError::Cancellation(message.into())
    }
}

/// The status a client observes for a completed call: a terminal [`Code`],
/// optional message, and the headers/trailers the peer sent.
#[derive(Clone, Debug, Default)]
pub struct Status {
    pub code_value: Option<Code>,
    pub message: Option<String>,
}

impl Status {
    pub fn new(code: Code, message: Option<String>) -> Self {
        Self {
            code_value: Some(code),
            message,
        }
    }

    pub fn ok() -> Self {
        Self::new(Code::Ok, None)
    }

    pub fn code(&self) -> Code {
        self.code_value.unwrap_or(Code::Unknown)
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.code() == Code::Ok
    }
}

impl From<&GrpcError> for Status {
    fn from(err: &GrpcError) -> Self {
        Status::new(err.code(), err.message().map(String::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trips_through_u32() {
        for raw in 0u32..=16 {
            let code = Code::from_u32(raw).expect("canonical code");
            assert_eq!(code.as_u32(), raw);
        }
    }

    #[test]
    fn code_from_u32_rejects_out_of_range() {
        assert_eq!(Code::from_u32(17), None);
        assert_eq!(Code::from_u32(9999), None);
    }

    #[test]
    fn code_as_str_matches_known_names() {
        assert_eq!(Code::Ok.as_str(), "ok");
        assert_eq!(Code::Cancelled.as_str(), "cancelled");
        assert_eq!(Code::Unauthenticated.as_str(), "unauthenticated");
    }

    #[test]
    fn grpc_error_maps_to_expected_codes() {
        assert_eq!(GrpcError::Protocol("bad frame".into()).code(), Code::Internal);
        assert_eq!(GrpcError::Size("too big".into()).code(), Code::ResourceExhausted);
        assert_eq!(GrpcError::Deadline.code(), Code::DeadlineExceeded);
        assert_eq!(
            GrpcError::Cancellation("Call canceled by the client.".into()).code(),
            Code::Cancelled
        );
        assert_eq!(GrpcError::Transport("refused".into()).code(), Code::Unavailable);
        assert_eq!(GrpcError::Configuration("bad policy".into()).code(), Code::Internal);
    }

    #[test]
    fn grpc_error_status_preserves_code_and_message() {
        let err = GrpcError::status(Code::NotFound, "resource missing");
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.message(), Some("resource missing"));
    }

    #[test]
    fn status_from_error_round_trips() {
        let err = GrpcError::unavailable("overloaded");
        let status = Status::from(&err);
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), Some("overloaded"));
    }

    #[test]
    fn status_ok_has_ok_code_and_no_message() {
        let status = Status::ok();
        assert!(status.is_ok());
        assert_eq!(status.message(), None);
    }
}
