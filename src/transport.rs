//! Connection seam between sessions and the network.

use std::time::Duration;

use async_trait::async_trait;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::config::WebSocketOptions;
use crate::error::{Error, TransportError};
use crate::types::Model;

/// Everything needed to open one live TTS connection.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    /// Live endpoint URL.
    pub url: Url,
    /// Bearer credential.
    pub api_key: String,
    /// Value of the `model` header.
    pub model: Model,
    /// Upper bound on the handshake.
    pub connect_timeout: Duration,
    /// WebSocket limits.
    pub websocket: WebSocketOptions,
}

/// A duplex message connection.
///
/// One task may send while another receives; implementations must not make
/// either side wait on the other.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one message.
    async fn send(&self, message: Message) -> Result<(), TransportError>;

    /// Receives the next message, or `None` once the peer has gone away.
    async fn recv(&self) -> Result<Option<Message>, TransportError>;

    /// Releases the connection.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    async fn connect(&self, target: &ConnectTarget) -> Result<Self::Transport, Error>;
}
