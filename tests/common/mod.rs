//! In-memory transport for driving sessions without a network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_fishaudio::{
    ClientConfig, ConnectTarget, Connector, Error, Transport, TransportError, TtsClient,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[derive(Default)]
struct Shared {
    sent: Mutex<Vec<Message>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    targets: Mutex<Vec<ConnectTarget>>,
    send_budget: Mutex<Option<usize>>,
}

/// Server side of the mock: scripts inbound frames and inspects outbound ones.
#[derive(Clone)]
pub struct MockServer {
    shared: Arc<Shared>,
    inbound: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
}

impl MockServer {
    /// Queues one frame for the client.
    pub fn push(&self, message: Message) {
        if let Some(tx) = self.inbound.lock().unwrap().as_ref() {
            let _ = tx.send(message);
        }
    }

    pub fn push_audio(&self, audio: &[u8]) {
        self.push(audio_frame(audio, None));
    }

    pub fn push_finish(&self, reason: &str) {
        self.push(finish_frame(reason));
    }

    /// Drops the connection once the queued frames are consumed.
    pub fn disconnect(&self) {
        self.inbound.lock().unwrap().take();
    }

    /// Lets `count` more sends through, then fails every later one.
    pub fn fail_sends_after(&self, count: usize) {
        *self.shared.send_budget.lock().unwrap() = Some(count);
    }

    pub fn sent(&self) -> Vec<Message> {
        self.shared.sent.lock().unwrap().clone()
    }

    /// Outbound frames decoded as events.
    pub fn sent_events(&self) -> Vec<SentEvent> {
        self.sent()
            .into_iter()
            .map(|msg| match msg {
                Message::Binary(b) => rmp_serde::from_slice(&b).expect("outbound msgpack"),
                other => panic!("unexpected outbound frame: {other:?}"),
            })
            .collect()
    }

    pub fn sent_names(&self) -> Vec<String> {
        self.sent_events().into_iter().map(|e| e.event).collect()
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub fn targets(&self) -> Vec<ConnectTarget> {
        self.shared.targets.lock().unwrap().clone()
    }

    /// Waits until the client has sent an event with the given name.
    pub async fn wait_for_sent(&self, name: &str) {
        for _ in 0..200 {
            if self.sent_names().iter().any(|n| n == name) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("client never sent {name}");
    }

    /// Answers the end of input with a normal finish, like the service does.
    pub fn finish_after_stop(&self) -> tokio::task::JoinHandle<()> {
        let server = self.clone();
        tokio::spawn(async move {
            server.wait_for_sent("stop").await;
            server.push_finish("stop");
        })
    }

    /// Waits for a background close to land.
    pub async fn wait_closed(&self) {
        for _ in 0..100 {
            if self.closes() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Hands out a single mock transport.
pub struct MockConnector {
    shared: Arc<Shared>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
}

pub fn mock() -> (MockConnector, MockServer) {
    let shared = Arc::new(Shared::default());
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MockConnector {
            shared: Arc::clone(&shared),
            receiver: Mutex::new(Some(rx)),
        },
        MockServer {
            shared,
            inbound: Arc::new(Mutex::new(Some(tx))),
        },
    )
}

pub fn mock_client(idle_timeout: Duration) -> (TtsClient<MockConnector>, MockServer) {
    let (connector, server) = mock();
    let config = ClientConfig::new("test-key").with_idle_timeout(idle_timeout);
    (TtsClient::with_connector(config, connector), server)
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, target: &ConnectTarget) -> Result<MockTransport, Error> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        self.shared.targets.lock().unwrap().push(target.clone());

        let receiver = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .ok_or(Error::ConnectionTimeout)?;

        Ok(MockTransport {
            shared: Arc::clone(&self.shared),
            inbound: tokio::sync::Mutex::new(receiver),
        })
    }
}

pub struct MockTransport {
    shared: Arc<Shared>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if let Some(left) = self.shared.send_budget.lock().unwrap().as_mut() {
            if *left == 0 {
                return Err(TransportError::WebSocket(
                    tokio_tungstenite::tungstenite::Error::ConnectionClosed,
                ));
            }
            *left -= 1;
        }
        self.shared.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Message>, TransportError> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Frames
// ============================================================================

#[derive(Serialize)]
struct AudioOut<'a> {
    event: &'a str,
    #[serde(with = "serde_bytes")]
    audio: &'a [u8],
    #[serde(skip_serializing_if = "Option::is_none")]
    seq: Option<u64>,
}

#[derive(Serialize)]
struct FinishOut<'a> {
    event: &'a str,
    reason: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<i32>,
}

pub fn audio_frame(audio: &[u8], seq: Option<u64>) -> Message {
    let bytes = rmp_serde::to_vec_named(&AudioOut {
        event: "audio",
        audio,
        seq,
    })
    .unwrap();
    Message::Binary(bytes)
}

pub fn finish_frame(reason: &str) -> Message {
    let bytes = rmp_serde::to_vec_named(&FinishOut {
        event: "finish",
        reason,
        message: None,
        code: None,
    })
    .unwrap();
    Message::Binary(bytes)
}

pub fn error_frame(message: &str, code: i32) -> Message {
    let bytes = rmp_serde::to_vec_named(&FinishOut {
        event: "finish",
        reason: "error",
        message: Some(message),
        code: Some(code),
    })
    .unwrap();
    Message::Binary(bytes)
}

/// Outbound event as seen by the service.
#[derive(Debug, Deserialize)]
pub struct SentEvent {
    pub event: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub request: Option<SentRequest>,
}

#[derive(Debug, Deserialize)]
pub struct SentRequest {
    pub text: String,
    pub reference_id: Option<String>,
    pub format: String,
    pub latency: String,
    pub chunk_length: u32,
}
