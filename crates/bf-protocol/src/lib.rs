//! bf-protocol: Parent/worker IPC protocol for botfleet
//!
//! This crate defines the framed messages exchanged between the orchestrator
//! and each bot worker process over the worker's stdin/stdout pipes, plus the
//! request/response channel built on top of them.

pub mod channel;
pub mod codec;
pub mod correlation;
pub mod error;
pub mod frame;
pub mod message;

pub use channel::{IpcChannel, Responder};
pub use codec::FrameCodec;
pub use correlation::CorrelationId;
pub use error::{IpcError, ProtocolError};
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{HealthCheck, HealthReport, Message, MessageType, Request};
