//! Client-level configuration.

use std::time::Duration;

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use url::Url;

use crate::error::Error;
use crate::{API_BASE_URL, API_KEY_ENV, BASE_URL_ENV, LIVE_TTS_PATH};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Low-level WebSocket limits. `None` keeps the library default.
#[derive(Debug, Clone, Default)]
pub struct WebSocketOptions {
    /// Largest message accepted from the service, in bytes.
    pub max_message_size: Option<usize>,
    /// Largest single frame accepted from the service, in bytes.
    pub max_frame_size: Option<usize>,
    /// Bytes buffered before a write is flushed to the socket.
    pub write_buffer_size: Option<usize>,
}

impl WebSocketOptions {
    pub(crate) fn to_tungstenite(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        if let Some(size) = self.max_message_size {
            config.max_message_size = Some(size);
        }
        if let Some(size) = self.max_frame_size {
            config.max_frame_size = Some(size);
        }
        if let Some(size) = self.write_buffer_size {
            config.write_buffer_size = size;
        }
        config
    }
}

/// Configuration for [`TtsClient`](crate::TtsClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key sent as a bearer credential.
    pub api_key: String,
    /// Service base URL (`https://`, `http://`, `wss://` or `ws://`).
    pub base_url: String,
    /// Upper bound on connection establishment.
    pub connect_timeout: Duration,
    /// Longest wait between two inbound frames before a session fails.
    pub idle_timeout: Duration,
    /// WebSocket limits.
    pub websocket: WebSocketOptions,
}

impl ClientConfig {
    /// Creates a configuration for the public endpoint with default timeouts.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: API_BASE_URL.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            idle_timeout: IDLE_TIMEOUT,
            websocket: WebSocketOptions::default(),
        }
    }

    /// Reads the API key (and optionally the base URL) from the environment.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::Validation(format!("{API_KEY_ENV} is not set")))?;

        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            config.base_url = base_url;
        }
        Ok(config)
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the idle window for inbound frames.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Checks the settings that do not depend on a session.
    pub fn validate(&self) -> Result<(), Error> {
        if self.api_key.is_empty() {
            return Err(Error::Validation("api key is empty".to_string()));
        }
        if self.connect_timeout.is_zero() || self.idle_timeout.is_zero() {
            return Err(Error::Validation("timeouts must be non-zero".to_string()));
        }
        self.live_url().map(|_| ())
    }

    /// WebSocket URL of the live TTS endpoint derived from `base_url`.
    pub fn live_url(&self) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Validation(format!("invalid base url {}: {e}", self.base_url)))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(Error::Validation(format!("unsupported url scheme: {other}")));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| Error::Validation(format!("cannot use scheme {scheme} for {url}")))?;

        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{prefix}{LIVE_TTS_PATH}"));
        Ok(url)
    }
}
