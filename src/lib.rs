//! Rust client library for the Fish Audio streaming Text-to-Speech WebSocket API.
//!
//! # Example
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use rust_fishaudio::{ClientConfig, SessionConfig, TtsClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rust_fishaudio::Error> {
//!     let client = TtsClient::new(ClientConfig::from_env()?);
//!     let session = client.open(SessionConfig::for_voice("802e3bc2b27e49c2995d23ef70e6ac89")).await?;
//!
//!     let send = async {
//!         session.send_text("Hello, ").await?;
//!         session.send_text("world!").await?;
//!         session.end_input().await
//!     };
//!
//!     let receive = async {
//!         let mut audio = Vec::new();
//!         let chunks = session.receive_chunks();
//!         futures_util::pin_mut!(chunks);
//!         while let Some(chunk) = chunks.next().await {
//!             audio.extend_from_slice(&chunk?.data);
//!         }
//!         Ok::<_, rust_fishaudio::Error>(audio)
//!     };
//!
//!     let (sent, audio) = tokio::join!(send, receive);
//!     sent?;
//!     println!("Received {} bytes of audio", audio?.len());
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
pub mod messages;
mod session;
mod transport;
mod types;
mod ws;

pub use client::TtsClient;
pub use config::{ClientConfig, WebSocketOptions};
pub use error::{Error, TransportError};
pub use session::{SessionState, TtsSession};
pub use transport::{ConnectTarget, Connector, Transport};
pub use types::*;
pub use ws::{WebSocket, WsConnector};

/// Default service base URL.
pub const API_BASE_URL: &str = "https://api.fish.audio";

/// Path of the live TTS WebSocket endpoint.
pub const LIVE_TTS_PATH: &str = "/v1/tts/live";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "FISH_AUDIO_API_KEY";

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "FISH_AUDIO_BASE_URL";
