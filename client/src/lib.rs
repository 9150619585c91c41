//! gRPC-over-HTTP/2 client.
//!
//! This crate provides a client for the gRPC wire protocol (§4), built on
//! the frame codec, compression registry, and error/status types shared
//! with `grpc-core`.
//!
//! ## Features
//!
//! - Unary, client-streaming, server-streaming, and duplex-streaming calls
//!   ([`invoker::Invoker`])
//! - Per-method retry and hedging policies ([`retry::ServiceConfig`])
//! - A channel-wide retry throttle ([`retry::RetryThrottle`])
//! - `grpc-encoding`/`grpc-accept-encoding` negotiated compression
//!
//! ## Example
//!
//! ```ignore
//! use grpc_client::{CallOptions, Invoker};
//! use grpc_client::retry::ServiceConfigBuilder;
//! use grpc_client::transport::HyperTransport;
//! use tokio_util::sync::CancellationToken;
//!
//! let transport = HyperTransport::builder().build()?;
//! let invoker = Invoker::new(transport, "https://api.example.com", ServiceConfigBuilder::aggressive());
//!
//! let response: MyResponse = invoker
//!     .unary("my.package.MyService/MyMethod", &request, CallOptions::new(), CancellationToken::new())
//!     .await?;
//! ```
//!
//! ## Retry and hedging
//!
//! Every call proceeds through [`retry::RetryEngine`] (§4.9), which decides
//! whether to retry based on the call's [`retry::MethodPolicy`] (resolved
//! from the [`retry::ServiceConfig`] by `(service, method)`), the
//! `grpc-retry-pushback-ms` trailer a server may send, and the channel-wide
//! [`retry::RetryThrottle`] (§4.10). [`retry::ServiceConfigBuilder`] ships
//! `no_retry`/`aggressive`/`patient` presets, the same shape this crate's
//! single global retry policy used to offer, now resolved per method.
//!
//! ## Cancellation
//!
//! Every call shape takes a [`tokio_util::sync::CancellationToken`]. Firing
//! it commits the call immediately to `Cancelled` / `"Call canceled by the
//! client."`, aborting whichever attempt is in flight.

pub mod error;
pub mod invoker;
pub mod options;
pub mod retry;
pub mod transport;

pub use error::ClientError;
pub use invoker::Invoker;
pub use options::CallOptions;
pub use transport::{HyperTransport, HyperTransportBuilder, TlsClientConfig, TransportBody};

// Re-export core types callers need to construct requests/read responses.
pub use grpc_core::{Code, CompressionConfig, CompressionEncoding, CompressionLevel, Status};

pub use bytes::Bytes;
