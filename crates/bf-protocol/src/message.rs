//! Message types for the botfleet worker protocol
//!
//! Messages are JSON objects discriminated by a `type` field and carried in
//! frames produced by the codec in `codec.rs`.
//!
//! # Message Flow
//!
//! 1. The orchestrator spawns a worker; the worker registers its handlers and
//!    sends `READY`
//! 2. The orchestrator periodically sends `HEALTH_CHECK` with a fresh `id`
//! 3. The worker replies with `HEALTH_CHECK` carrying the same `id` and an
//!    `isHealthy` verdict

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::correlation::CorrelationId;

/// Message type identifier, as carried in the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Health probe and its reply
    HealthCheck = 0x01,
    /// Worker finished initialization
    Ready = 0x02,
}

impl MessageType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::HealthCheck),
            0x02 => Some(Self::Ready),
            _ => None,
        }
    }

    /// Wire name used in the JSON `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HealthCheck => "HEALTH_CHECK",
            Self::Ready => "READY",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Health probe (no verdict) or health reply (with verdict)
    HealthCheck {
        id: CorrelationId,
        #[serde(rename = "isHealthy", default, skip_serializing_if = "Option::is_none")]
        is_healthy: Option<bool>,
    },

    /// Worker is initialized and accepting requests
    Ready {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<CorrelationId>,
    },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::HealthCheck { .. } => MessageType::HealthCheck,
            Message::Ready { .. } => MessageType::Ready,
        }
    }

    /// Correlation ID carried by this message, if any
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            Message::HealthCheck { id, .. } => Some(id),
            Message::Ready { id } => id.as_ref(),
        }
    }

    /// Whether this message is a reply to an earlier request
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            Message::HealthCheck {
                is_healthy: Some(_),
                ..
            }
        )
    }
}

/// A typed request that expects a typed reply
///
/// Implementations describe how a request maps onto a [`Message`] and how
/// the matching reply is read back.
pub trait Request: Sized + Send + 'static {
    /// Message type shared by the request and its reply
    const TYPE: MessageType;

    /// Reply payload
    type Reply: Send + 'static;

    /// Build the outbound request message
    fn into_message(self, id: CorrelationId) -> Message;

    /// Recognize an inbound request of this kind
    fn from_message(message: &Message) -> Option<(CorrelationId, Self)>;

    /// Build the reply message for a request with the given id
    fn reply_message(id: CorrelationId, reply: Self::Reply) -> Message;

    /// Read the reply payload back out of a matched message
    fn from_reply(message: Message) -> Option<Self::Reply>;
}

/// Health probe sent by the orchestrator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthCheck;

/// Worker's answer to a [`HealthCheck`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub is_healthy: bool,
}

impl Request for HealthCheck {
    const TYPE: MessageType = MessageType::HealthCheck;
    type Reply = HealthReport;

    fn into_message(self, id: CorrelationId) -> Message {
        Message::HealthCheck {
            id,
            is_healthy: None,
        }
    }

    fn from_message(message: &Message) -> Option<(CorrelationId, Self)> {
        match message {
            Message::HealthCheck {
                id,
                is_healthy: None,
            } => Some((id.clone(), HealthCheck)),
            _ => None,
        }
    }

    fn reply_message(id: CorrelationId, reply: HealthReport) -> Message {
        Message::HealthCheck {
            id,
            is_healthy: Some(reply.is_healthy),
        }
    }

    fn from_reply(message: Message) -> Option<HealthReport> {
        match message {
            Message::HealthCheck {
                is_healthy: Some(is_healthy),
                ..
            } => Some(HealthReport { is_healthy }),
            _ => None,
        }
    }
}
