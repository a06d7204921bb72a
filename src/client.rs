//! Text-to-Speech client for the Fish Audio live API.

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::future::Either;
use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::error::Error;
use crate::session::TtsSession;
use crate::transport::{ConnectTarget, Connector, Transport};
use crate::types::{AudioChunk, SessionConfig, TextInput};
use crate::ws::WsConnector;

/// Opens streaming synthesis sessions.
pub struct TtsClient<C = WsConnector> {
    config: ClientConfig,
    connector: C,
}

impl TtsClient<WsConnector> {
    /// Creates a client that connects over real WebSockets.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, WsConnector)
    }
}

impl<C: Connector> TtsClient<C> {
    /// Creates a client with a custom connector.
    pub fn with_connector(config: ClientConfig, connector: C) -> Self {
        Self { config, connector }
    }

    /// Client configuration shared by every session.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Validates `session`, connects, and sends the start event.
    ///
    /// Invalid configuration fails before any connection attempt.
    pub async fn open(&self, session: SessionConfig) -> Result<TtsSession<C::Transport>, Error> {
        self.config.validate()?;
        session.validate()?;

        let target = ConnectTarget {
            url: self.config.live_url()?,
            api_key: self.config.api_key.clone(),
            model: session.model,
            connect_timeout: self.config.connect_timeout,
            websocket: self.config.websocket.clone(),
        };

        let transport = self.connector.connect(&target).await?;
        TtsSession::start(transport, &session, self.config.idle_timeout).await
    }

    /// Synthesizes a stream of text, yielding audio while text is still being sent.
    ///
    /// The end of `input` ends the session's input. A failed send closes the
    /// session and ends the stream with that error. Dropping the returned
    /// stream stops sending and closes the session.
    pub fn stream<S>(
        &self,
        session: SessionConfig,
        input: S,
    ) -> impl Stream<Item = Result<AudioChunk, Error>> + Send + '_
    where
        S: Stream<Item = TextInput> + Send + 'static,
    {
        try_stream! {
            let session = Arc::new(self.open(session).await?);
            info!(session_id = %session.id(), "TTS streaming");

            let mut sender = SenderTask(Some(tokio::spawn(pump(Arc::clone(&session), input))));

            let chunks = session.receive_chunks();
            futures_util::pin_mut!(chunks);
            loop {
                let step = tokio::select! {
                    chunk = chunks.next() => Either::Left(chunk),
                    sent = sender.finished() => Either::Right(sent),
                };
                match step {
                    Either::Left(Some(chunk)) => {
                        yield chunk?;
                    }
                    Either::Left(None) => break,
                    Either::Right(Ok(())) => {}
                    Either::Right(Err(e)) => {
                        error!(session_id = %session.id(), error = %e, "TTS sender failed");
                        session.close().await;
                        Err::<(), Error>(e)?;
                    }
                }
            }

            sender.join().await?;
        }
    }

    /// Synthesizes `fragments` and returns the concatenated audio.
    pub async fn synthesize<I>(&self, session: SessionConfig, fragments: I) -> Result<Vec<u8>, Error>
    where
        I: IntoIterator,
        I::Item: Into<TextInput>,
    {
        let input: Vec<TextInput> = fragments.into_iter().map(Into::into).collect();
        let chunks = self.stream(session, futures_util::stream::iter(input));
        futures_util::pin_mut!(chunks);

        let mut audio = Vec::new();
        while let Some(chunk) = chunks.next().await {
            audio.extend_from_slice(&chunk?.data);
        }
        Ok(audio)
    }
}

/// Forwards caller input to the session, then ends it.
async fn pump<T, S>(session: Arc<TtsSession<T>>, input: S) -> Result<(), Error>
where
    T: Transport,
    S: Stream<Item = TextInput> + Send,
{
    futures_util::pin_mut!(input);
    while let Some(item) = input.next().await {
        match item {
            TextInput::Fragment(text) => session.send_text(&text).await?,
            TextInput::Flush => session.flush().await?,
        }
    }
    debug!(session_id = %session.id(), "TTS input exhausted");
    session.end_input().await
}

/// Sender task that is aborted unless joined.
struct SenderTask(Option<JoinHandle<Result<(), Error>>>);

impl SenderTask {
    /// Resolves once with the sender's outcome, then never again.
    async fn finished(&mut self) -> Result<(), Error> {
        match self.0.as_mut() {
            Some(handle) => {
                let result = handle.await;
                self.0 = None;
                result?
            }
            None => std::future::pending().await,
        }
    }

    async fn join(mut self) -> Result<(), Error> {
        match self.0.take() {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }
}

impl Drop for SenderTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}
