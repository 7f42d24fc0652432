//! Protocol and channel error types

use std::panic::Location;
use std::time::Duration;

use thiserror::Error;

use crate::correlation::CorrelationId;
use crate::message::MessageType;

/// Errors that can occur while framing messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unknown message type in a frame header
    ///
    /// The header has already been consumed; `payload_length` tells the
    /// decoder how many bytes to discard before the next frame.
    #[error("Unknown message type: {message_type:#04x}")]
    UnknownMessageType { message_type: u8, payload_length: u32 },

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by [`IpcChannel`](crate::IpcChannel) operations
#[derive(Error, Debug)]
pub enum IpcError {
    /// No matching reply arrived in time
    ///
    /// `origin` is the call site of the request, captured before waiting.
    #[error("{message_type} timed out after {after:?} (requested at {origin})")]
    Timeout {
        message_type: MessageType,
        id: Option<CorrelationId>,
        after: Duration,
        origin: &'static Location<'static>,
    },

    /// The peer went away before replying
    #[error("IPC channel disconnected")]
    Disconnected,

    /// A reply matched the request but had the wrong shape
    #[error("Unexpected reply to {0}")]
    UnexpectedReply(MessageType),
}

impl IpcError {
    /// Whether this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, IpcError::Timeout { .. })
    }
}
