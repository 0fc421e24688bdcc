//! Shared error types for the monitor system

use crate::types::Participant;
use thiserror::Error;

/// Errors produced while encoding or decoding a wire message.
///
/// These are always recovered locally by dropping the offending datagram and
/// logging; they never cross into a state machine.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("empty datagram")]
    EmptyMessage,

    #[error("unknown message type code: {code}")]
    UnknownTypeCode { code: u8 },

    #[error("message type {msg_type} declares payload shape {shape} but none was supplied")]
    MissingPayload { msg_type: String, shape: &'static str },

    #[error("message type {msg_type} declares no payload but payload bytes were supplied")]
    UnexpectedPayload { msg_type: String },

    #[error("payload shape name is not zero-terminated")]
    UnterminatedShapeName,

    #[error("payload shape name is not valid UTF-8")]
    MalformedShapeName,

    #[error("unknown payload shape: {name}")]
    UnknownShape { name: String },

    #[error("message claims payload shape {claimed}; catalog records {expected}")]
    ShapeMismatch { claimed: String, expected: &'static str },

    #[error("payload JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors produced by the datagram message bus.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("unknown recipient: {0}")]
    UnknownRecipient(Participant),

    #[error("message bus is not running")]
    NotRunning,

    #[error("encoded message is {len} bytes; limit is one {limit}-byte datagram")]
    MessageTooLarge { len: usize, limit: usize },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
