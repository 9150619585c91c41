//! Reader/writer halves for the streaming call shapes (part of C6, §4.6).
//!
//! `MessageReader` drains the incoming frame-at-a-time body the way
//! `pipeline::handle_unary` reads its single frame; `MessageWriter` mirrors
//! the same encode/compress/frame path on the way out, guarded so that two
//! concurrent writes against a cloned handle fail with the documented
//! runtime error instead of silently interleaving.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use grpc_core::compression::{peer_accepts, CompressionEncoding};
use grpc_core::frame::{self, FrameLimits, WriteOptions};
use grpc_core::GrpcError;
use tokio::sync::{mpsc, Mutex};

/// Reads one deserialized message per call to [`next_message`](Self::next_message).
/// `None` signals a clean end of the client stream (§4.6).
pub struct MessageReader<S> {
    inner: S,
    buf: BytesMut,
    stream_ended: bool,
    encoding: CompressionEncoding,
    limits: FrameLimits,
}

impl<S> MessageReader<S>
where
    S: Stream<Item = Result<Bytes, GrpcError>> + Unpin,
{
    pub fn new(inner: S, encoding: CompressionEncoding, limits: FrameLimits) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            stream_ended: false,
            encoding,
            limits,
        }
    }

    /// Decode the next frame's payload, or `Ok(None)` at a clean end of
    /// stream between frames.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>, GrpcError> {
        loop {
            if let Some(payload) =
                frame::read_next(&mut self.buf, self.encoding, self.limits, self.stream_ended)?
            {
                return Ok(Some(payload));
            }
            if self.stream_ended {
                return Ok(None);
            }
            match self.inner.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(err)) => return Err(err),
                None => self.stream_ended = true,
            }
        }
    }

    /// Decode the next message, or `None` at end of stream.
    pub async fn next_message<Req>(&mut self) -> Result<Option<Req>, GrpcError>
    where
        Req: prost::Message + Default,
    {
        match self.next_frame().await? {
            Some(payload) => {
                let message = Req::decode(payload)
                    .map_err(|e| GrpcError::Protocol(format!("failed to decode request: {e}")))?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }
}

/// Serializes, compresses, and frames one message per write, forwarding the
/// frame onto the response channel. Cloneable; an in-flight write holds the
/// internal lock, so a second writer racing the first observes the
/// documented error rather than a blocked future or interleaved bytes.
#[derive(Clone)]
pub struct MessageWriter {
    tx: mpsc::UnboundedSender<Bytes>,
    encoding: CompressionEncoding,
    accept_encoding: Option<Arc<str>>,
    limits: FrameLimits,
    lock: Arc<Mutex<()>>,
}

impl MessageWriter {
    pub fn new(
        tx: mpsc::UnboundedSender<Bytes>,
        encoding: CompressionEncoding,
        accept_encoding: Option<String>,
        limits: FrameLimits,
    ) -> Self {
        Self {
            tx,
            encoding,
            accept_encoding: accept_encoding.map(Arc::from),
            limits,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Write one message. Fails immediately (rather than waiting) if another
    /// write against the same handle is already in progress.
    pub async fn write<Resp>(&self, message: &Resp) -> Result<(), GrpcError>
    where
        Resp: prost::Message,
    {
        let _guard = self.lock.try_lock().map_err(|_| {
            GrpcError::Protocol(
                "Can't write the message because the previous write is in progress.".to_string(),
            )
        })?;

        let mut encoded = Vec::with_capacity(message.encoded_len());
        message
            .encode(&mut encoded)
            .map_err(|e| GrpcError::Protocol(format!("failed to encode response: {e}")))?;

        let should_compress = peer_accepts(self.accept_encoding.as_deref(), self.encoding);
        let frame = frame::write(
            &encoded,
            self.encoding,
            self.limits,
            WriteOptions {
                no_compress: !should_compress,
            },
        )?;

        self.tx
            .send(frame)
            .map_err(|_| GrpcError::Cancellation("response channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn reader_yields_each_frame_then_none() {
        let limits = FrameLimits::default();
        let first = frame::write(b"one", CompressionEncoding::Identity, limits, WriteOptions::default()).unwrap();
        let second = frame::write(b"two", CompressionEncoding::Identity, limits, WriteOptions::default()).unwrap();
        let body = stream::iter(vec![Ok(first), Ok(second)]);
        let mut reader = MessageReader::new(body, CompressionEncoding::Identity, limits);

        assert_eq!(reader.next_frame().await.unwrap(), Some(Bytes::from_static(b"one")));
        assert_eq!(reader.next_frame().await.unwrap(), Some(Bytes::from_static(b"two")));
        assert_eq!(reader.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn writer_lock_rejects_concurrent_acquisition() {
        // `write` needs a concrete `prost::Message` type to exercise end to
        // end; this checks the underlying lock contention it relies on.
        let (tx, _rx) = mpsc::unbounded_channel::<Bytes>();
        let writer = MessageWriter::new(tx, CompressionEncoding::Identity, None, FrameLimits::default());
        let lock = writer.lock.clone();
        let _held = lock.try_lock().unwrap();
        assert!(lock.try_lock().is_err());
    }
}
