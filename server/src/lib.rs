//! An axum-compatible gRPC-over-HTTP/2 server: per-call deadline tracking,
//! message framing/compression, and a route binder, built on top of
//! [`grpc_core`]'s wire-level codecs.
//!
//! ## Modules
//!
//! - [`context`]: per-call state (C5) — parses `grpc-timeout`/`grpc-encoding`
//!   and installs the deadline manager
//! - [`deadline`]: the deadline manager (C4) — cancels a call when its
//!   `grpc-timeout` elapses
//! - [`limits`]: message size limits (C1/C5), resolved into `grpc_core::FrameLimits`
//! - [`pipeline`]: the call pipeline (C6) — drives the four method shapes
//! - [`service`]: the endpoint/service binder (C7) — route registration and
//!   unimplemented catch-alls
//! - [`stream`]: reader/writer halves for the client-streaming and
//!   duplex-streaming call shapes

pub mod context;
pub mod deadline;
pub mod limits;
pub mod pipeline;
pub mod service;
pub mod stream;

pub use grpc_core;

// Re-export several crates used pervasively by generated handler code.
pub use bytes;
pub use futures;
pub use prost;
pub use serde;
