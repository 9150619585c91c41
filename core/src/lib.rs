//! Wire-level gRPC types shared between the server and client: framing,
//! metadata, timeouts, status codes, the compression registry, and the
//! event surface.
//!
//! ## Modules
//!
//! - [`frame`]: the message codec (C1) — length-prefixed frame read/write
//! - [`metadata`]: the metadata codec (C2) — header normalization, `-bin`
//!   fields, `grpc-message` percent-encoding
//! - [`timeout`]: the timeout codec (C3) — `grpc-timeout` parse/format
//! - [`codec`]: the [`codec::Codec`] trait and its compression implementations
//! - [`compression`]: the compression-provider registry (negotiation, config)
//! - [`error`]: the [`error::Code`]/[`error::GrpcError`] status taxonomy
//! - [`events`]: the event/diagnostics surface (C12)

pub mod codec;
pub mod compression;
pub mod error;
pub mod events;
pub mod frame;
pub mod metadata;
pub mod timeout;

pub use codec::*;
pub use compression::*;
pub use error::*;
pub use events::*;
pub use frame::*;
pub use metadata::*;
pub use timeout::*;
