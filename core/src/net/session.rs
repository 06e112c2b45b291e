/// Transport session: the single persistent connection to the chat gateway.
/// All other engine components are read-subscribers of this connection; the
/// session owns the socket, the reconnect loop and the registration handshake.
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::net::protocol::{ClientEvent, Frame, ServerEvent};
use crate::types::UserId;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Connection state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Registered and ready
    Connected,
}

/// The persistent gateway connection, one per authenticated identity
pub struct Session {
    config: Config,

    /// Identity this session is bound to, set by the first `connect`
    registered_user: Arc<RwLock<Option<UserId>>>,

    state: Arc<RwLock<SessionState>>,

    /// Connected flag for UI gating (disabling the send control)
    connected_tx: watch::Sender<bool>,

    /// Inbound event fan-out; every subscriber gets every event
    events_tx: broadcast::Sender<ServerEvent>,

    /// Outbound funnel drained by the connection task
    outbound_tx: mpsc::UnboundedSender<ClientEvent>,
    outbound_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ClientEvent>>>>,

    shutdown_tx: watch::Sender<bool>,
}

impl Session {
    /// Create a session; no connection is attempted until `connect`
    pub fn new(config: Config) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (connected_tx, _) = watch::channel(false);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            registered_user: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            connected_tx,
            events_tx,
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(Some(outbound_rx))),
            shutdown_tx,
        }
    }

    /// Establish the connection for `local_user_id`. Idempotent: calling it
    /// again for the same identity is a no-op; a different identity is an
    /// error (one session per authenticated user).
    pub async fn connect(&self, local_user_id: UserId) -> Result<()> {
        {
            let mut registered = self.registered_user.write().await;
            match *registered {
                Some(existing) if existing == local_user_id => {
                    debug!("Session already established for user {}", local_user_id);
                    return Ok(());
                }
                Some(existing) => {
                    return Err(ChatError::Connection(format!(
                        "Session already bound to user {}",
                        existing
                    )));
                }
                None => *registered = Some(local_user_id),
            }
        }

        let outbound = self
            .outbound_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| ChatError::Connection("Session task already running".to_string()))?;

        let session = self.clone();
        tokio::spawn(async move {
            session.run(local_user_id, outbound).await;
        });

        Ok(())
    }

    /// Tear the session down (unmount/logout). Terminal for this instance.
    pub async fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
        *self.state.write().await = SessionState::Disconnected;
        let _ = self.connected_tx.send(false);
    }

    /// Subscribe to inbound server events. Dropping the receiver is the
    /// unsubscription; each subscriber observes the same FIFO stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events_tx.subscribe()
    }

    /// Watch the connected flag
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    /// Current connected flag
    pub fn is_connected(&self) -> bool {
        *self.connected_tx.borrow()
    }

    /// Current connection state
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Fire-and-forget publish to the server. Events emitted while
    /// disconnected are refused, never queued: the user re-sends after
    /// reconnect (at-most-once).
    pub fn emit(&self, event: ClientEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(ChatError::Disconnected);
        }
        self.outbound_tx
            .send(event)
            .map_err(|_| ChatError::Connection("Session task not running".to_string()))
    }

    /// Reconnect loop: connect, drive until drop, back off, repeat
    async fn run(&self, user_id: UserId, mut outbound: mpsc::UnboundedReceiver<ClientEvent>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            *self.state.write().await = SessionState::Connecting;
            let connection_id = Uuid::new_v4();
            debug!(
                "Connecting to gateway {} (connection {})",
                self.config.server_addr, connection_id
            );

            match timeout(
                self.config.connect_timeout,
                TcpStream::connect(self.config.server_addr),
            )
            .await
            {
                Ok(Ok(stream)) => {
                    info!(
                        "Connected to gateway {} (connection {})",
                        self.config.server_addr, connection_id
                    );
                    *self.state.write().await = SessionState::Connected;
                    let _ = self.connected_tx.send(true);

                    match self
                        .drive(stream, user_id, &mut outbound, &mut shutdown_rx)
                        .await
                    {
                        Ok(()) => debug!("Connection {} closed", connection_id),
                        Err(e) => warn!("Connection {} dropped: {}", connection_id, e),
                    }

                    *self.state.write().await = SessionState::Disconnected;
                    let _ = self.connected_tx.send(false);
                }
                Ok(Err(e)) => {
                    warn!("Failed to connect to {}: {}", self.config.server_addr, e);
                    *self.state.write().await = SessionState::Disconnected;
                }
                Err(_) => {
                    warn!("Connection timeout to {}", self.config.server_addr);
                    *self.state.write().await = SessionState::Disconnected;
                }
            }

            if *shutdown_rx.borrow() {
                break;
            }

            let jitter_ms = rand::thread_rng()
                .gen_range(0..=self.config.retry_jitter.as_millis().max(1) as u64);
            sleep(self.config.retry_interval + Duration::from_millis(jitter_ms)).await;
        }

        info!("Session task stopped for user {}", user_id);
    }

    /// Drive one established connection until it drops or shutdown
    async fn drive(
        &self,
        stream: TcpStream,
        user_id: UserId,
        outbound: &mut mpsc::UnboundedReceiver<ClientEvent>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (mut read_half, mut write_half) = stream.into_split();

        // Re-registration happens on every (re)connect, followed by a fresh
        // presence snapshot request
        write_event(&mut write_half, &ClientEvent::Register { user_id }).await?;
        write_event(&mut write_half, &ClientEvent::PresenceRequest).await?;

        let writer = async {
            while let Some(event) = outbound.recv().await {
                debug!("→ {}", event);
                write_event(&mut write_half, &event).await?;
            }
            // Outbound sender gone: the engine was dropped
            Ok::<(), ChatError>(())
        };

        let reader = async {
            let mut len_buf = [0u8; 4];
            loop {
                match read_half.read_exact(&mut len_buf).await {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        debug!("Gateway closed the connection");
                        return Ok(());
                    }
                    Err(e) => return Err(ChatError::Io(e)),
                }

                let length = u32::from_be_bytes(len_buf) as usize;
                let mut payload = vec![0u8; length];
                read_half
                    .read_exact(&mut payload)
                    .await
                    .map_err(ChatError::Io)?;

                match serde_json::from_slice::<ServerEvent>(&payload) {
                    Ok(event) => {
                        debug!("← {}", event);
                        // No subscriber yet is fine; surfaces attach on
                        // their own schedule
                        let _ = self.events_tx.send(event);
                    }
                    Err(e) => warn!("Dropping malformed gateway event: {}", e),
                }
            }
        };

        tokio::select! {
            result = writer => result,
            result = reader => result,
            _ = shutdown_rx.changed() => Ok(()),
        }
    }
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            registered_user: self.registered_user.clone(),
            state: self.state.clone(),
            connected_tx: self.connected_tx.clone(),
            events_tx: self.events_tx.clone(),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: self.outbound_rx.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}

/// Write one framed event to the socket
async fn write_event(write_half: &mut OwnedWriteHalf, event: &ClientEvent) -> Result<()> {
    let frame = Frame::from_event(event)
        .map_err(|e| ChatError::Protocol(format!("Failed to serialize {}: {}", event, e)))?;
    write_half
        .write_all(&frame.to_bytes())
        .await
        .map_err(ChatError::Io)?;
    Ok(())
}
