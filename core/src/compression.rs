//! The compression-provider registry (C1, §4.1).
//!
//! gRPC negotiates compression by *membership*, not HTTP's q-weighted
//! `Accept-Encoding`: a response may use an encoding only if the peer's
//! `grpc-accept-encoding` header lists it. This module keeps the workspace's
//! two-tier codec abstraction ([`Codec`]/[`BoxedCodec`] in [`crate::codec`])
//! but replaces the negotiation function accordingly.

use crate::codec::BoxedCodec;

#[cfg(feature = "compression-gzip-stream")]
use crate::codec::GzipCodec;

#[cfg(feature = "compression-deflate-stream")]
use crate::codec::DeflateCodec;

#[cfg(feature = "compression-br-stream")]
use crate::codec::BrotliCodec;

#[cfg(feature = "compression-zstd-stream")]
use crate::codec::ZstdCodec;

/// Header carrying the encoding used for the message body (request or response).
pub const GRPC_ENCODING: &str = "grpc-encoding";

/// Header carrying the set of encodings the sender is willing to decode.
pub const GRPC_ACCEPT_ENCODING: &str = "grpc-accept-encoding";

/// Supported compression encodings.
///
/// Use [`CompressionEncoding::codec()`] to get the actual codec implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionEncoding {
    #[default]
    Identity,
    #[cfg(feature = "compression-gzip-stream")]
    Gzip,
    #[cfg(feature = "compression-deflate-stream")]
    Deflate,
    #[cfg(feature = "compression-br-stream")]
    Brotli,
    #[cfg(feature = "compression-zstd-stream")]
    Zstd,
}

impl CompressionEncoding {
    /// Parse a single encoding name (as found in `grpc-encoding`).
    /// Returns `None` for unsupported encodings (caller should respond `Unimplemented`).
    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "identity" => Some(Self::Identity),
            #[cfg(feature = "compression-gzip-stream")]
            "gzip" => Some(Self::Gzip),
            #[cfg(feature = "compression-deflate-stream")]
            "deflate" => Some(Self::Deflate),
            #[cfg(feature = "compression-br-stream")]
            "br" => Some(Self::Brotli),
            #[cfg(feature = "compression-zstd-stream")]
            "zstd" => Some(Self::Zstd),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            #[cfg(feature = "compression-gzip-stream")]
            Self::Gzip => "gzip",
            #[cfg(feature = "compression-deflate-stream")]
            Self::Deflate => "deflate",
            #[cfg(feature = "compression-br-stream")]
            Self::Brotli => "br",
            #[cfg(feature = "compression-zstd-stream")]
            Self::Zstd => "zstd",
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Get the codec for this encoding. `None` for identity.
    pub fn codec(&self) -> Option<BoxedCodec> {
        match self {
            Self::Identity => None,
            #[cfg(feature = "compression-gzip-stream")]
            Self::Gzip => Some(BoxedCodec::new(GzipCodec::default())),
            #[cfg(feature = "compression-deflate-stream")]
            Self::Deflate => Some(BoxedCodec::new(DeflateCodec::default())),
            #[cfg(feature = "compression-br-stream")]
            Self::Brotli => Some(BoxedCodec::new(BrotliCodec::default())),
            #[cfg(feature = "compression-zstd-stream")]
            Self::Zstd => Some(BoxedCodec::new(ZstdCodec::default())),
        }
    }

    /// Get the codec for this encoding with an explicit compression level.
    #[allow(unused_variables)]
    pub fn codec_with_level(&self, level: CompressionLevel) -> Option<BoxedCodec> {
        match self {
            Self::Identity => None,
            #[cfg(feature = "compression-gzip-stream")]
            Self::Gzip => Some(BoxedCodec::new(GzipCodec::with_level(level_to_flate2(level)))),
            #[cfg(feature = "compression-deflate-stream")]
            Self::Deflate => Some(BoxedCodec::new(DeflateCodec::with_level(level_to_flate2(level)))),
            #[cfg(feature = "compression-br-stream")]
            Self::Brotli => Some(BoxedCodec::new(BrotliCodec::with_quality(level_to_brotli(level)))),
            #[cfg(feature = "compression-zstd-stream")]
            Self::Zstd => Some(BoxedCodec::new(ZstdCodec::with_level(level_to_zstd(level)))),
        }
    }
}

/// Compression level configuration, independent of any one algorithm's own scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    Fastest,
    Best,
    #[default]
    Default,
    Precise(u32),
}

impl CompressionLevel {
    pub fn precise(level: u32) -> Self {
        CompressionLevel::Precise(level)
    }
}

#[cfg(any(feature = "compression-gzip-stream", feature = "compression-deflate-stream"))]
fn level_to_flate2(level: CompressionLevel) -> u32 {
    match level {
        CompressionLevel::Fastest => 1,
        CompressionLevel::Best => 9,
        CompressionLevel::Default => 6,
        CompressionLevel::Precise(n) => n.clamp(0, 9),
    }
}

#[cfg(feature = "compression-br-stream")]
fn level_to_brotli(level: CompressionLevel) -> u32 {
    match level {
        CompressionLevel::Fastest => 0,
        CompressionLevel::Best => 11,
        CompressionLevel::Default => 4,
        CompressionLevel::Precise(n) => n.clamp(0, 11),
    }
}

#[cfg(feature = "compression-zstd-stream")]
fn level_to_zstd(level: CompressionLevel) -> i32 {
    match level {
        CompressionLevel::Fastest => 1,
        CompressionLevel::Best => 22,
        CompressionLevel::Default => 3,
        CompressionLevel::Precise(n) => (n as i32).clamp(1, 22),
    }
}

/// Per-call/per-service/global write-side compression configuration.
///
/// Precedence when resolving the effective config for one write: per-call
/// override wins over per-service, which wins over this global default
/// (§4.1). Each layer is `Option`-shaped so an unset layer falls through.
#[derive(Debug, Clone, Copy)]
pub struct CompressionConfig {
    /// Minimum payload size, in bytes, before compression is attempted.
    pub min_send_bytes: usize,
    pub level: CompressionLevel,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            min_send_bytes: 0,
            level: CompressionLevel::Default,
        }
    }
}

impl CompressionConfig {
    pub fn new(min_send_bytes: usize) -> Self {
        Self {
            min_send_bytes,
            level: CompressionLevel::Default,
        }
    }

    pub fn level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    pub fn disabled() -> Self {
        Self {
            min_send_bytes: usize::MAX,
            level: CompressionLevel::Default,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.min_send_bytes == usize::MAX
    }
}

/// Parse a `grpc-accept-encoding` (or `grpc-encoding`) header value into the
/// set of names it names, trimmed and lowercase, comma-separated per §6.
pub fn parse_encoding_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Returns `true` if `accept_encoding` (the peer's `grpc-accept-encoding`
/// header) lists `encoding` by name. Unlike HTTP's `Accept-Encoding`, gRPC's
/// negotiation is membership-only: there is no preference order or q-value.
pub fn peer_accepts(accept_encoding: Option<&str>, encoding: CompressionEncoding) -> bool {
    if encoding.is_identity() {
        return true;
    }
    match accept_encoding {
        None => false,
        Some(list) => parse_encoding_list(list).any(|name| name == encoding.as_str()),
    }
}

/// Build the comma-separated list of names for every encoding the registry
/// supports, ordered identity-last to match connect-go's and grpc-go's
/// `grpc-accept-encoding` convention.
pub fn supported_encodings_str() -> String {
    let mut names = Vec::new();
    #[cfg(feature = "compression-gzip-stream")]
    names.push("gzip");
    #[cfg(feature = "compression-deflate-stream")]
    names.push("deflate");
    #[cfg(feature = "compression-br-stream")]
    names.push("br");
    #[cfg(feature = "compression-zstd-stream")]
    names.push("zstd");
    names.push("identity");
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_has_no_codec() {
        assert!(CompressionEncoding::Identity.codec().is_none());
    }

    #[cfg(feature = "compression-gzip-stream")]
    #[test]
    fn from_name_gzip() {
        assert_eq!(CompressionEncoding::from_name("gzip"), Some(CompressionEncoding::Gzip));
        assert_eq!(CompressionEncoding::from_name("lz4"), None);
    }

    #[test]
    fn identity_always_accepted() {
        assert!(peer_accepts(None, CompressionEncoding::Identity));
    }

    #[cfg(feature = "compression-gzip-stream")]
    #[test]
    fn membership_negotiation_no_q_values() {
        // gRPC has no q-value concept; a bare list of names is membership-only.
        assert!(peer_accepts(Some("gzip, br"), CompressionEncoding::Gzip));
        assert!(!peer_accepts(Some("br"), CompressionEncoding::Gzip));
        assert!(!peer_accepts(None, CompressionEncoding::Gzip));
    }

    #[test]
    fn compression_config_disabled() {
        let config = CompressionConfig::disabled();
        assert!(config.is_disabled());
    }

    #[test]
    fn parse_encoding_list_trims_and_skips_empty() {
        let got: Vec<_> = parse_encoding_list(" gzip ,, br").collect();
        assert_eq!(got, vec!["gzip", "br"]);
    }
}
