//! Message size limits (part of C1/C5, §4.1/§4.5).
//!
//! Mirrors the workspace's dual receive/send `MessageLimits` design
//! (`connectrpc-axum/src/context/limit.rs`), resolved into [`grpc_core::FrameLimits`]
//! for the frame codec and reported as [`GrpcError`] for the pipeline.

use grpc_core::{Code, FrameLimits, GrpcError};

/// Server-configured message size limits, independently tunable per
/// direction (§4.1: `maxReceiveMessageSize`/`maxSendMessageSize`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageLimits {
    receive_max_bytes: Option<usize>,
    send_max_bytes: Option<usize>,
}

impl MessageLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receive_max_bytes(mut self, max: usize) -> Self {
        self.receive_max_bytes = Some(max);
        self
    }

    pub fn send_max_bytes(mut self, max: usize) -> Self {
        self.send_max_bytes = Some(max);
        self
    }

    pub fn get_receive_max_bytes(&self) -> Option<usize> {
        self.receive_max_bytes
    }

    pub fn get_send_max_bytes(&self) -> Option<usize> {
        self.send_max_bytes
    }

    /// Resolve into the frame codec's concrete limits (unset ⇒ unlimited).
    pub fn to_frame_limits(self) -> FrameLimits {
        FrameLimits {
            max_receive_message_size: self.receive_max_bytes.unwrap_or(usize::MAX),
            max_send_message_size: self.send_max_bytes.unwrap_or(usize::MAX),
        }
    }

    /// Check a request's `Content-Length` (or already-read body length)
    /// against the receive limit before any decompression/decoding work,
    /// mirroring `BridgeLayer`'s pre-decode size check.
    pub fn check_size(&self, size: usize) -> Result<(), GrpcError> {
        if let Some(max) = self.receive_max_bytes
            && size > max
        {
            return Err(GrpcError::status(
                Code::ResourceExhausted,
                "Received message exceeds the maximum configured message size.",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_unlimited() {
        let limits = MessageLimits::new();
        assert_eq!(limits.to_frame_limits().max_receive_message_size, usize::MAX);
        assert_eq!(limits.to_frame_limits().max_send_message_size, usize::MAX);
    }

    #[test]
    fn builder_sets_both_directions() {
        let limits = MessageLimits::new().receive_max_bytes(2048).send_max_bytes(1024);
        assert_eq!(limits.get_receive_max_bytes(), Some(2048));
        assert_eq!(limits.get_send_max_bytes(), Some(1024));
    }

    #[test]
    fn check_size_rejects_over_limit() {
        let limits = MessageLimits::new().receive_max_bytes(1024);
        assert!(limits.check_size(1024).is_ok());
        let err = limits.check_size(1025).unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);
    }
}
