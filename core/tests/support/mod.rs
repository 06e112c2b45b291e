#![allow(dead_code)]
/// Test doubles: a real-TCP fake gateway and an in-memory REST collaborator
use async_trait::async_trait;
use homelink_core::net::Frame;
use homelink_core::{ChatError, ChatMessage, ClientEvent, Contact, MarketplaceApi, ServerEvent};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::time::timeout;

/// A gateway the session can really connect to. Pushed events reach the
/// currently-connected client; received client events are collected.
pub struct FakeGateway {
    pub addr: SocketAddr,
    received: mpsc::UnboundedReceiver<ClientEvent>,
    push_tx: broadcast::Sender<Vec<u8>>,
    kick_tx: broadcast::Sender<()>,
}

impl FakeGateway {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (push_tx, _) = broadcast::channel::<Vec<u8>>(64);
        let (kick_tx, _) = broadcast::channel::<()>(4);

        let accept_push = push_tx.clone();
        let accept_kick = kick_tx.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let received_tx = received_tx.clone();
                let mut push_rx = accept_push.subscribe();
                let mut kick_rx = accept_kick.subscribe();
                tokio::spawn(async move {
                    let (mut read_half, mut write_half) = stream.into_split();

                    let reader = async {
                        let mut len_buf = [0u8; 4];
                        loop {
                            if read_half.read_exact(&mut len_buf).await.is_err() {
                                break;
                            }
                            let len = u32::from_be_bytes(len_buf) as usize;
                            let mut payload = vec![0u8; len];
                            if read_half.read_exact(&mut payload).await.is_err() {
                                break;
                            }
                            if let Ok(event) = serde_json::from_slice::<ClientEvent>(&payload) {
                                let _ = received_tx.send(event);
                            }
                        }
                    };

                    let writer = async {
                        while let Ok(bytes) = push_rx.recv().await {
                            if write_half.write_all(&bytes).await.is_err() {
                                break;
                            }
                        }
                    };

                    tokio::select! {
                        _ = reader => {}
                        _ = writer => {}
                        _ = kick_rx.recv() => {}
                    }
                });
            }
        });

        Self {
            addr,
            received,
            push_tx,
            kick_tx,
        }
    }

    /// Push a server event to the connected client
    pub fn push(&self, event: &ServerEvent) {
        let frame = Frame::from_event(event).unwrap();
        let _ = self.push_tx.send(frame.to_bytes());
    }

    /// Push raw bytes (for malformed-frame scenarios)
    pub fn push_raw(&self, payload: &[u8]) {
        let frame = Frame {
            length: payload.len() as u32,
            payload: payload.to_vec(),
        };
        let _ = self.push_tx.send(frame.to_bytes());
    }

    /// Drop every live connection, forcing the client to reconnect
    pub fn drop_connections(&self) {
        let _ = self.kick_tx.send(());
    }

    /// Next client event, failing the test after two seconds
    pub async fn expect_event(&mut self) -> ClientEvent {
        timeout(Duration::from_secs(2), self.received.recv())
            .await
            .expect("timed out waiting for a client event")
            .expect("gateway channel closed")
    }

    /// Assert no client event arrives within the window
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(event)) = timeout(window, self.received.recv()).await {
            panic!("expected silence, got {}", event);
        }
    }

    /// Skip events until one matches, failing the test after two seconds
    pub async fn expect_matching<F>(&mut self, mut predicate: F) -> ClientEvent
    where
        F: FnMut(&ClientEvent) -> bool,
    {
        timeout(Duration::from_secs(2), async {
            loop {
                let event = self.received.recv().await.expect("gateway channel closed");
                if predicate(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for a matching client event")
    }
}

/// In-memory marketplace API with a holdable history fetch
pub struct MemoryApi {
    contacts: Mutex<Vec<Contact>>,
    history: Mutex<Vec<ChatMessage>>,
    fail_history: AtomicBool,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MemoryApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            contacts: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            fail_history: AtomicBool::new(false),
            gate: Mutex::new(None),
        })
    }

    pub async fn set_contacts(&self, contacts: Vec<Contact>) {
        *self.contacts.lock().await = contacts;
    }

    pub async fn set_history(&self, history: Vec<ChatMessage>) {
        *self.history.lock().await = history;
    }

    pub fn set_history_failing(&self, failing: bool) {
        self.fail_history.store(failing, Ordering::SeqCst);
    }

    /// Hold the next history fetch in flight until the returned sender fires
    pub async fn hold_next_history(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().await = Some(rx);
        tx
    }
}

#[async_trait]
impl MarketplaceApi for MemoryApi {
    async fn fetch_conversations(&self, _user_id: i64) -> homelink_core::Result<Vec<Contact>> {
        Ok(self.contacts.lock().await.clone())
    }

    async fn fetch_history(
        &self,
        _user_a: i64,
        _user_b: i64,
    ) -> homelink_core::Result<Vec<ChatMessage>> {
        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(ChatError::Fetch("history fetch failed".to_string()));
        }
        Ok(self.history.lock().await.clone())
    }
}
