//! Error types for the SES transport.
//!
//! The original design expressed these as an open exception hierarchy; here
//! they are a single closed enum so callers can match exhaustively on every
//! failure a send can produce.

use thiserror::Error;

/// Errors that can occur while delivering a message over the transport.
///
/// Every variant is fatal to the current send; nothing is retried
/// internally.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket or TLS establishment failed before any request bytes were
    /// written. Carries the OS error code when one is available.
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        code: Option<i32>,
    },

    /// Protocol-usage violation (header after body start, write after
    /// finish) or a low-level I/O failure on an already-open channel. By
    /// the time an open channel fails to write, its contract has been
    /// violated by the environment, so both share a variant.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A response header line lacked the `name: value` separator. Carries
    /// the offending raw line.
    #[error("invalid response header line: {0:?}")]
    InvalidHeader(String),

    /// The remote end closed the connection before sending a status line.
    #[error("empty response from service")]
    EmptyResponse,

    /// The service returned a structured error document with a code other
    /// than `MessageRejected`. Fields are carried verbatim.
    #[error("service responded with error: [type: {kind:?}; code: {code:?}; message: {message:?}]")]
    ErrorResponse {
        kind: String,
        code: String,
        message: String,
    },

    /// The service rejected the message outright (error code
    /// `MessageRejected`). Names the primary recipient and the
    /// service-provided reason.
    #[error("message for {recipient:?} was rejected by the service: {message}")]
    MessageRejected {
        recipient: String,
        message: String,
    },
}

impl TransportError {
    /// Builds a [`TransportError::Connection`] from an I/O error,
    /// preserving the OS error code when present.
    pub(crate) fn connection(err: &std::io::Error) -> Self {
        Self::Connection {
            message: err.to_string(),
            code: err.raw_os_error(),
        }
    }
}

/// Specialized `Result` type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
