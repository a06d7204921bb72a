//! WebSocket connection wrapper.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, USER_AGENT};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::{Error, TransportError};
use crate::transport::{ConnectTarget, Connector, Transport};

const USER_AGENT_VALUE: &str = concat!("rust-fishaudio/", env!("CARGO_PKG_VERSION"));

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket connection wrapper.
///
/// Reader and writer halves are locked separately so that sending never waits
/// for a pending receive.
pub struct WebSocket {
    write: Mutex<SplitSink<WsStream, Message>>,
    read: Mutex<SplitStream<WsStream>>,
}

impl WebSocket {
    /// Opens a new WebSocket connection authenticated with the target's API key.
    pub async fn connect(target: &ConnectTarget) -> Result<Self, Error> {
        info!(url = %target.url, model = %target.model, "WebSocket connecting");

        let mut request = target
            .url
            .as_str()
            .into_client_request()
            .map_err(Error::Connection)?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", target.api_key))
            .map_err(|_| Error::Validation("api key is not a valid header value".to_string()))?;
        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("model", HeaderValue::from_static(target.model.as_str()));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let config = target.websocket.to_tungstenite();
        let (ws_stream, response) = timeout(
            target.connect_timeout,
            tokio_tungstenite::connect_async_with_config(request, Some(config), false),
        )
        .await
        .map_err(|_| Error::ConnectionTimeout)?
        .map_err(handshake_error)?;

        info!(url = %target.url, status = %response.status(), "WebSocket connected");

        let (write, read) = ws_stream.split();

        Ok(Self {
            write: Mutex::new(write),
            read: Mutex::new(read),
        })
    }
}

#[async_trait]
impl Transport for WebSocket {
    async fn send(&self, message: Message) -> Result<(), TransportError> {
        let mut writer = self.write.lock().await;
        writer.send(message).await.map_err(TransportError::WebSocket)
    }

    async fn recv(&self) -> Result<Option<Message>, TransportError> {
        let mut reader = self.read.lock().await;
        match reader.next().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => {
                Ok(None)
            }
            Some(Err(e)) => Err(TransportError::WebSocket(e)),
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        info!("WebSocket closing");
        let mut writer = self.write.lock().await;
        match writer.close().await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                info!("WebSocket closed");
                Ok(())
            }
            Err(e) => Err(TransportError::WebSocket(e)),
        }
    }
}

/// Connector that opens real WebSocket connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    type Transport = WebSocket;

    async fn connect(&self, target: &ConnectTarget) -> Result<WebSocket, Error> {
        WebSocket::connect(target).await
    }
}

fn handshake_error(e: tungstenite::Error) -> Error {
    match e {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            let message = rejection_message(status, response.body().as_deref());
            debug!(status = %status, message = %message, "WebSocket handshake rejected");
            Error::Api {
                status: status.as_u16(),
                message,
            }
        }
        other => Error::Connection(other),
    }
}

/// Picks the most useful description out of a rejected handshake response.
fn rejection_message(status: StatusCode, body: Option<&[u8]>) -> String {
    let body = body.unwrap_or_default();

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["message", "detail"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }

    let text = String::from_utf8_lossy(body).trim().to_string();
    if !text.is_empty() {
        return text;
    }

    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
}
