//! Streaming text-to-speech session.
//!
//! A session owns one connection. Text goes out through [`TtsSession::send_text`]
//! while audio comes back through [`TtsSession::receive_chunks`]; both can run at
//! the same time from two tasks or two branches of a `join!`.
//!
//! Lifecycle: `Init -> Open -> Ending -> Closed`, with `Open -> Closed` on error.
//! A failed send or receive closes the session. `Closed` is terminal.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures_util::Stream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::{Error, TransportError};
use crate::messages::{ClientEvent, FinishReason, ServerEvent, StartRequest};
use crate::transport::Transport;
use crate::types::{AudioChunk, SessionConfig};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Connected, start event not yet sent.
    Init = 0,
    /// Accepting text.
    Open = 1,
    /// End of input sent, audio may still arrive.
    Ending = 2,
    /// Connection released.
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Init,
            1 => SessionState::Open,
            2 => SessionState::Ending,
            _ => SessionState::Closed,
        }
    }
}

/// A live streaming synthesis exchange.
///
/// Dropping the session while it is still open closes its connection in the
/// background.
pub struct TtsSession<T: Transport> {
    inner: Arc<SessionInner<T>>,
}

struct SessionInner<T> {
    session_id: String,
    transport: T,
    state: AtomicU8,
    eos_sent: AtomicBool,
    receiving: AtomicBool,
    released: AtomicBool,
    idle_timeout: Duration,
}

impl<T: Transport> TtsSession<T> {
    /// Starts a session on an established transport by sending the start event.
    ///
    /// The configuration is validated first; nothing is sent if it is invalid.
    pub async fn start(
        transport: T,
        config: &SessionConfig,
        idle_timeout: Duration,
    ) -> Result<Self, Error> {
        config.validate()?;

        let session = Self {
            inner: Arc::new(SessionInner {
                session_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
                transport,
                state: AtomicU8::new(SessionState::Init as u8),
                eos_sent: AtomicBool::new(false),
                receiving: AtomicBool::new(false),
                released: AtomicBool::new(false),
                idle_timeout,
            }),
        };

        info!(
            session_id = %session.inner.session_id,
            reference_id = ?config.reference_id,
            format = %config.format,
            "TTS session starting"
        );

        let start = ClientEvent::Start {
            request: StartRequest::from(config),
        };
        if let Err(e) = session.inner.send_event(&start).await {
            session.close().await;
            return Err(e);
        }

        session.inner.set_state(SessionState::Open);
        info!(session_id = %session.inner.session_id, "TTS session open");
        Ok(session)
    }

    /// Short identifier attached to this session's log lines.
    pub fn id(&self) -> &str {
        &self.inner.session_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Sends one text fragment.
    pub async fn send_text(&self, text: &str) -> Result<(), Error> {
        self.inner.ensure_open()?;
        self.inner.send_event(&ClientEvent::Text { text }).await
    }

    /// Asks the service to synthesize all text sent so far.
    pub async fn flush(&self) -> Result<(), Error> {
        self.inner.ensure_open()?;
        self.inner.send_event(&ClientEvent::Flush).await
    }

    /// Signals that no more text will be sent.
    ///
    /// Calling it again after a successful call does nothing.
    pub async fn end_input(&self) -> Result<(), Error> {
        if self.inner.eos_sent.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.ensure_open()?;
        self.inner.send_event(&ClientEvent::Stop).await?;
        self.inner.eos_sent.store(true, Ordering::SeqCst);

        // The receiver may already have closed the session.
        let _ = self.inner.state.compare_exchange(
            SessionState::Open as u8,
            SessionState::Ending as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        debug!(session_id = %self.inner.session_id, "TTS end of input sent");
        Ok(())
    }

    /// Audio chunks in arrival order.
    ///
    /// The stream ends after the service finishes synthesis, or after yielding
    /// the error that ended the session. It can be taken once per session;
    /// dropping it early closes the session.
    pub fn receive_chunks(&self) -> impl Stream<Item = Result<AudioChunk, Error>> + Send {
        let taken = self.inner.receiving.swap(true, Ordering::SeqCst);
        let guard = (!taken).then(|| CloseOnDrop(Arc::clone(&self.inner)));

        try_stream! {
            let guard = guard.ok_or(Error::ReceiverInUse)?;
            let inner = &guard.0;

            if inner.state() == SessionState::Closed {
                Err::<(), Error>(Error::SessionClosed)?;
            }

            let mut next_seq = 0u64;
            loop {
                match inner.next_chunk(&mut next_seq).await {
                    Ok(Some(chunk)) => {
                        yield chunk;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        inner.close().await;
                        Err::<(), Error>(e)?;
                    }
                }
            }
        }
    }

    /// Releases the connection. Safe to call any number of times.
    pub async fn close(&self) {
        self.inner.close().await;
    }
}

impl<T: Transport> Drop for TtsSession<T> {
    fn drop(&mut self) {
        self.inner.close_detached();
    }
}

impl<T: Transport> SessionInner<T> {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match self.state() {
            SessionState::Open => Ok(()),
            _ => Err(Error::SessionClosed),
        }
    }

    async fn send_event(&self, event: &ClientEvent<'_>) -> Result<(), Error> {
        let payload = event.encode()?;
        debug!(
            session_id = %self.session_id,
            event = event.name(),
            len = payload.len(),
            "Sending TTS event"
        );
        if let Err(e) = self.transport.send(Message::Binary(payload)).await {
            error!(session_id = %self.session_id, error = %e, "Failed to send TTS event");
            self.close().await;
            return Err(Error::Transport(e));
        }
        Ok(())
    }

    /// Reads frames until one yields audio or ends the stream.
    async fn next_chunk(&self, next_seq: &mut u64) -> Result<Option<AudioChunk>, Error> {
        loop {
            let msg = match timeout(self.idle_timeout, self.transport.recv()).await {
                Ok(Ok(Some(msg))) => msg,
                Ok(Ok(None)) => return Err(TransportError::Disconnected.into()),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(TransportError::IdleTimeout(self.idle_timeout).into()),
            };

            let frame = match msg {
                Message::Binary(b) => b,
                Message::Text(t) => {
                    error!(session_id = %self.session_id, len = t.len(), "Unexpected TTS text frame");
                    return Err(TransportError::Malformed("unexpected text frame".to_string()).into());
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // tungstenite answers pings on the next read.
                    debug!(session_id = %self.session_id, "TTS received ping/pong");
                    continue;
                }
                Message::Close(frame) => {
                    debug!(session_id = %self.session_id, frame = ?frame, "TTS received close");
                    return Err(TransportError::Disconnected.into());
                }
                Message::Frame(_) => {
                    debug!(session_id = %self.session_id, "TTS received raw frame");
                    continue;
                }
            };

            match ServerEvent::decode(&frame)? {
                ServerEvent::Audio { audio, seq } => {
                    if let Some(got) = seq {
                        if got != *next_seq {
                            error!(
                                session_id = %self.session_id,
                                expected = *next_seq,
                                got,
                                "TTS audio chunk out of order"
                            );
                            return Err(TransportError::OutOfOrder {
                                expected: *next_seq,
                                got,
                            }
                            .into());
                        }
                    }
                    let chunk = AudioChunk {
                        seq: *next_seq,
                        data: audio,
                    };
                    *next_seq += 1;
                    debug!(
                        session_id = %self.session_id,
                        seq = chunk.seq,
                        len = chunk.data.len(),
                        "TTS audio chunk received"
                    );
                    return Ok(Some(chunk));
                }
                ServerEvent::Finish {
                    reason: FinishReason::Stop,
                    ..
                } => {
                    info!(session_id = %self.session_id, chunks = *next_seq, "TTS finished");
                    self.close().await;
                    return Ok(None);
                }
                ServerEvent::Finish {
                    reason: FinishReason::Error,
                    message,
                    code,
                } => {
                    let message =
                        message.unwrap_or_else(|| "stream ended with error".to_string());
                    error!(session_id = %self.session_id, message = %message, code = ?code, "TTS error");
                    return Err(Error::Service { code, message });
                }
                ServerEvent::Other(name) => {
                    warn!(session_id = %self.session_id, event = %name, "Ignoring TTS event");
                }
            }
        }
    }

    async fn close(&self) {
        self.set_state(SessionState::Closed);
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(session_id = %self.session_id, "TTS session closing");
        if let Err(e) = self.transport.close().await {
            warn!(session_id = %self.session_id, error = %e, "Failed to close TTS connection");
        }
    }
}

impl<T: Transport> SessionInner<T> {
    /// Closes from a synchronous context by handing the release to the runtime.
    fn close_detached(self: &Arc<Self>) {
        if self.released.load(Ordering::SeqCst) {
            return;
        }
        self.set_state(SessionState::Closed);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(self);
                handle.spawn(async move { inner.close().await });
            }
            Err(_) => {
                warn!(session_id = %self.session_id, "No runtime to close TTS connection");
            }
        }
    }
}

struct CloseOnDrop<T: Transport>(Arc<SessionInner<T>>);

impl<T: Transport> Drop for CloseOnDrop<T> {
    fn drop(&mut self) {
        self.0.close_detached();
    }
}
