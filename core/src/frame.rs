//! The message codec (C1, §4.1): gRPC's length-prefixed frame format.
//!
//! Each frame is `flag(1) | length(4 big-endian) | payload(length)`. Unlike
//! the Connect protocol's three-state envelope (`MESSAGE`/`COMPRESSED`/
//! `END_STREAM`), gRPC's flag byte is two-state only — stream end is always
//! signaled out of band by HTTP/2 end-of-stream plus trailers, never an
//! in-band bit. Adapted from the workspace's Connect envelope codec
//! (`connectrpc-axum-core/src/envelope.rs`) with the `END_STREAM` flag
//! removed and the higher-level `read_one`/`read_next`/`write` operations
//! added.

use bytes::{Buf, Bytes, BytesMut};

use crate::compression::CompressionEncoding;
use crate::error::GrpcError;

/// `flag=0`: payload is uncompressed.
pub const FLAG_MESSAGE: u8 = 0x00;
/// `flag=1`: payload is compressed with the call's negotiated encoding.
pub const FLAG_COMPRESSED: u8 = 0x01;

/// Length of the frame header: 1 flag byte + 4 big-endian length bytes.
pub const FRAME_HEADER_SIZE: usize = 5;

/// Hard ceiling on a frame's declared length, independent of any configured
/// `maxReceiveMessageSize` (§6): gRPC lengths are a 32-bit unsigned field but
/// the top bit is reserved, matching `i32::MAX`.
pub const MAX_FRAME_LENGTH: u32 = i32::MAX as u32;

/// Per-call limits enforced by the frame codec (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct FrameLimits {
    pub max_receive_message_size: usize,
    pub max_send_message_size: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_receive_message_size: 4 * 1024 * 1024,
            max_send_message_size: usize::MAX,
        }
    }
}

/// Parse the 5-byte frame header. Returns `(flag, length)`.
fn parse_header(header: &[u8]) -> (u8, u32) {
    debug_assert_eq!(header.len(), FRAME_HEADER_SIZE);
    let flag = header[0];
    let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    (flag, length)
}

/// Build the 5-byte header for a frame of the given length and compression
/// state.
fn build_header(length: u32, compressed: bool) -> [u8; FRAME_HEADER_SIZE] {
    let flag = if compressed { FLAG_COMPRESSED } else { FLAG_MESSAGE };
    let len = length.to_be_bytes();
    [flag, len[0], len[1], len[2], len[3]]
}

/// Wrap a single already-encoded (and, if applicable, already-compressed)
/// message payload in its frame header.
pub fn wrap_frame(payload: &[u8], compressed: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&build_header(payload.len() as u32, compressed));
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Decompress a received frame's payload per its flag and the call's
/// negotiated `grpc-encoding`.
fn decode_payload(
    flag: u8,
    payload: Bytes,
    encoding: CompressionEncoding,
) -> Result<Bytes, GrpcError> {
    if flag & FLAG_COMPRESSED == 0 {
        return Ok(payload);
    }
    let codec = encoding
        .codec()
        .ok_or_else(|| GrpcError::Protocol(format!("received compressed frame but no codec for {encoding:?}")))?;
    codec
        .decompress(&payload)
        .map_err(|e| GrpcError::Protocol(format!("failed to decompress message: {e}")))
}

/// Read exactly one message from `data`, which must contain precisely one
/// complete frame and nothing more (§4.1: unary request/response bodies).
///
/// - Fewer than 5 bytes, or a declared length longer than what follows,
///   is `Internal / "Incomplete message."`.
/// - Trailing bytes after the one complete frame is
///   `Internal / "Additional data after the message received."`.
/// - A declared length exceeding `limits.max_receive_message_size` is
///   `ResourceExhausted / "Received message exceeds the maximum configured message size."`.
pub fn read_one(
    data: &[u8],
    encoding: CompressionEncoding,
    limits: FrameLimits,
) -> Result<Bytes, GrpcError> {
    if data.len() < FRAME_HEADER_SIZE {
        return Err(GrpcError::Protocol("Incomplete message.".to_string()));
    }
    let (flag, length) = parse_header(&data[..FRAME_HEADER_SIZE]);
    check_receive_size(length, limits)?;
    let length = length as usize;
    let body = &data[FRAME_HEADER_SIZE..];
    if body.len() < length {
        return Err(GrpcError::Protocol("Incomplete message.".to_string()));
    }
    if body.len() > length {
        return Err(GrpcError::Protocol(
            "Additional data after the message received.".to_string(),
        ));
    }
    decode_payload(flag, Bytes::copy_from_slice(body), encoding)
}

/// Read the next frame from a streaming buffer, consuming its bytes from
/// `buf`. Returns `Ok(None)` when `buf` is empty (clean end-of-stream
/// between frames); an incomplete header or payload leaves `buf` untouched
/// and returns `Incomplete message.` only once the underlying stream is
/// known to have ended (callers drive this by feeding more bytes first).
pub fn read_next(
    buf: &mut BytesMut,
    encoding: CompressionEncoding,
    limits: FrameLimits,
    stream_ended: bool,
) -> Result<Option<Bytes>, GrpcError> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf.len() < FRAME_HEADER_SIZE {
        if stream_ended {
            return Err(GrpcError::Protocol("Incomplete message.".to_string()));
        }
        return Ok(None);
    }
    let (flag, length) = parse_header(&buf[..FRAME_HEADER_SIZE]);
    check_receive_size(length, limits)?;
    let length = length as usize;
    if buf.len() < FRAME_HEADER_SIZE + length {
        if stream_ended {
            return Err(GrpcError::Protocol("Incomplete message.".to_string()));
        }
        return Ok(None);
    }
    buf.advance(FRAME_HEADER_SIZE);
    let payload = buf.split_to(length).freeze();
    decode_payload(flag, payload, encoding).map(Some)
}

fn check_receive_size(length: u32, limits: FrameLimits) -> Result<(), GrpcError> {
    if length > MAX_FRAME_LENGTH || length as usize > limits.max_receive_message_size {
        return Err(GrpcError::Size(
            "Received message exceeds the maximum configured message size.".to_string(),
        ));
    }
    Ok(())
}

/// Options controlling how a single message is written.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Suppresses compression for this one message even if the call
    /// negotiated a non-identity encoding (§4.1).
    pub no_compress: bool,
}

/// Encode one message into a frame, compressing it when all of: the call's
/// chosen `encoding` is non-identity, the peer's `grpc-accept-encoding`
/// lists it (checked by the caller via [`crate::compression::peer_accepts`]
/// before calling this), and `options.no_compress` is unset.
///
/// Returns `ResourceExhausted / "Message exceeds the maximum configured message size."`
/// if the final (post-compression) payload exceeds `limits.max_send_message_size`.
pub fn write(
    payload: &[u8],
    encoding: CompressionEncoding,
    limits: FrameLimits,
    options: WriteOptions,
) -> Result<Bytes, GrpcError> {
    let should_compress = !options.no_compress && !encoding.is_identity();
    let (compressed, body): (bool, Bytes) = if should_compress {
        let codec = encoding
            .codec()
            .expect("non-identity encoding always has a codec");
        let out = codec
            .compress(payload)
            .map_err(|e| GrpcError::Protocol(format!("failed to compress message: {e}")))?;
        (true, out)
    } else {
        (false, Bytes::copy_from_slice(payload))
    };

    if body.len() > limits.max_send_message_size {
        return Err(GrpcError::Size(
            "Message exceeds the maximum configured message size.".to_string(),
        ));
    }

    Ok(wrap_frame(&body, compressed))
}
