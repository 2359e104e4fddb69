// ABOUTME: SMPP client error types for comprehensive error handling across all client operations
// ABOUTME: Provides structured error reporting with automatic conversion from underlying I/O and protocol errors

use crate::codec::CodecError;
use crate::datatypes::CommandStatus;
use crate::session::runtime::{BindHandshakeError, RuntimeError};
use crate::window::WindowError;
use std::io;
use thiserror::Error;

/// Comprehensive error type for SMPP client operations
///
/// Provides structured error handling for all client operations including
/// connection management, protocol operations, and data validation.
#[derive(Debug, Error)]
pub enum SmppError {
    /// I/O error during network operations (connection, read, write)
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// A frame could not be parsed or encoded off the wire
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// SMPP protocol error indicated by command_status field
    #[error("Protocol error: {0:?}")]
    Protocol(CommandStatus),

    /// Data validation error (invalid message length, malformed addresses, etc.)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Operation timeout
    #[error("Operation timeout")]
    Timeout,

    /// Unexpected PDU received (wrong response type for request)
    #[error("Unexpected PDU: expected {expected}, got {actual}")]
    UnexpectedPdu { expected: String, actual: String },

    /// Connection closed unexpectedly
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// Client not in correct state for operation
    #[error("Invalid client state: {0}")]
    InvalidState(String),

    /// The peer stopped answering `enquire_link` within the allowed pending
    /// count, or the session was otherwise torn down by the runtime rather
    /// than by an explicit `disconnect()`/`unbind()` call.
    #[error("session ended: {0}")]
    SessionEnded(String),

    /// A bounded reconnect policy exhausted every attempt without
    /// successfully re-establishing a bind.
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },
}

impl From<WindowError> for SmppError {
    fn from(err: WindowError) -> Self {
        match err {
            WindowError::SlotTimeout | WindowError::RequestTimeout => SmppError::Timeout,
            WindowError::Closed | WindowError::ConnectionClosed | WindowError::Cancelled => {
                SmppError::ConnectionClosed
            }
            WindowError::DuplicateSequenceNumber(seq) => {
                SmppError::InvalidData(format!("duplicate sequence number {seq}"))
            }
        }
    }
}

impl From<RuntimeError> for SmppError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Codec(codec) => SmppError::Codec(codec),
            RuntimeError::Window(window) => SmppError::from(window),
            RuntimeError::NotBound => {
                SmppError::InvalidState("session is not bound".to_string())
            }
            RuntimeError::ConnectionClosed | RuntimeError::Closed => SmppError::ConnectionClosed,
            RuntimeError::KeepAliveExhausted => {
                SmppError::SessionEnded("peer stopped answering enquire_link".to_string())
            }
        }
    }
}

impl From<BindHandshakeError> for SmppError {
    fn from(err: BindHandshakeError) -> Self {
        match err {
            BindHandshakeError::Timeout => SmppError::Timeout,
            BindHandshakeError::ConnectionClosed => SmppError::ConnectionClosed,
            BindHandshakeError::UnexpectedFrame(codec) => SmppError::Codec(codec),
            BindHandshakeError::UnexpectedResponse => SmppError::UnexpectedPdu {
                expected: "bind response".to_string(),
                actual: "other PDU".to_string(),
            },
            BindHandshakeError::Rejected(status) => SmppError::Protocol(status),
            BindHandshakeError::Codec(codec) => SmppError::Codec(codec),
        }
    }
}

/// Result type alias for SMPP operations
pub type SmppResult<T> = Result<T, SmppError>;

impl From<Box<dyn std::error::Error + Send + Sync>> for SmppError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            SmppError::Connection(io::Error::new(io_err.kind(), err.to_string()))
        } else {
            SmppError::InvalidData(err.to_string())
        }
    }
}
