//! The `error` module defines the error types used within `portsub`.
//!
//! Each layer owns one enum: the wire codec reports [`ProtocolError`], framed
//! socket I/O reports [`TransportError`], the broker process reports
//! [`BrokerError`] and the client handle reports [`ClientError`]. Nothing in
//! the crate retries on any of them.

use std::io;
use std::str::Utf8Error;
use std::time::Duration;

use crate::protocol::CommandCode;

/// A frame body could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame truncated")]
    Truncated,

    #[error("unrecognized command code {0}")]
    UnknownCommand(u8),

    #[error("unrecognized resolution {0}")]
    UnknownResolution(u8),

    #[error("topic is not valid utf-8: {0}")]
    InvalidTopic(#[from] Utf8Error),

    #[error("topic length {0} exceeds the frame limit")]
    TopicTooLong(usize),

    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

/// Reading or writing one length-prefixed frame failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer closed the connection without sending anything.
    #[error("peer closed the connection without sending data")]
    NoData,

    /// The length prefix does not match the bytes actually received.
    #[error("not a message: expected {expected} bytes, received {received}")]
    NotMessage { expected: usize, received: usize },

    #[error("frame of {len} bytes exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// True when the peer sent something that could not be framed.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::NotMessage { .. } | Self::FrameTooLarge { .. })
    }
}

/// Failures of the broker process or of a single broker request.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Every port of the pool has been handed out.
    #[error("client port pool exhausted")]
    PoolExhausted,

    #[error("no free control port found probing down from {start}")]
    NoFreePort { start: u16 },

    #[error("failed to bind control port {port}: {source}")]
    Bind { port: u16, source: io::Error },

    #[error("broker is not reachable at {0}")]
    Unreachable(std::net::SocketAddr),

    #[error("broker did not become ready within {0:?}")]
    StartupTimeout(Duration),

    #[error("broker is already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors surfaced to callers of the [`crate::client::Client`] API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Raised before any network I/O for topics outside `[A-Za-z0-9_-]+`.
    #[error("invalid topic '{0}': only ASCII letters, digits, '_' and '-' are allowed")]
    InvalidTopic(String),

    #[error("broker rejected {code}: {reason}")]
    Rejected { code: CommandCode, reason: String },

    #[error("broker answered {received:?} to a {sent} request")]
    UnexpectedCode {
        sent: CommandCode,
        received: Option<CommandCode>,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
