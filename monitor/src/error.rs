//! Monitor-specific error types

use shared::errors::{BusError, ProtocolError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("process lifecycle error: {message}")]
    Process { message: String },

    #[error("state machine error: {message}")]
    Machine { message: String },

    #[error("message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("wire protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MonitorError {
    pub fn config(message: impl Into<String>) -> Self {
        MonitorError::Configuration { message: message.into() }
    }

    pub fn process(message: impl Into<String>) -> Self {
        MonitorError::Process { message: message.into() }
    }

    pub fn machine(message: impl Into<String>) -> Self {
        MonitorError::Machine { message: message.into() }
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;
