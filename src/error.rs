//! Error types for the Fish Audio client library.

use std::time::Duration;

use thiserror::Error;

/// Error type for Fish Audio client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration rejected locally, before any network activity.
    #[error("Invalid configuration: {0}")]
    Validation(String),

    /// The WebSocket connection could not be established.
    #[error("Connection failed: {0}")]
    Connection(#[source] tokio_tungstenite::tungstenite::Error),

    /// Connection establishment did not finish in time.
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// The service rejected the WebSocket handshake.
    #[error("API error: {message} (status: {status})")]
    Api {
        /// HTTP status of the rejected handshake.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// Operation attempted on a session that is no longer open.
    #[error("Session is closed")]
    SessionClosed,

    /// Audio chunks of this session are already being consumed.
    #[error("Session audio is already being received")]
    ReceiverInUse,

    /// Mid-session transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The service ended the stream with an error.
    #[error("Service error: {message} (code: {code:?})")]
    Service {
        /// Error code reported by the service, if any.
        code: Option<i32>,
        /// Error message reported by the service.
        message: String,
    },

    /// MessagePack serialization error.
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Background sender task failed to complete.
    #[error("Sender task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures observed on an open connection.
#[derive(Error, Debug)]
pub enum TransportError {
    /// WebSocket protocol or I/O error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The connection ended before the service finished the stream.
    #[error("WebSocket disconnected unexpectedly")]
    Disconnected,

    /// No frame arrived within the idle window.
    #[error("No data received for {0:?}")]
    IdleTimeout(Duration),

    /// A frame could not be decoded.
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// An audio frame carried an unexpected sequence position.
    #[error("Audio chunk out of order: expected {expected}, got {got}")]
    OutOfOrder {
        /// Next position the session expected.
        expected: u64,
        /// Position carried by the frame.
        got: u64,
    },
}

impl From<rmp_serde::decode::Error> for TransportError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        TransportError::Malformed(e.to_string())
    }
}
