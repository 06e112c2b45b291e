/// The chat engine orchestrator. Owns the transport session, the stores and
/// the REST collaborator; runs the single event pump that dispatches every
/// server event into the components. UI surfaces are pure observers: they
/// read derived state and issue the two commands (open conversation, send
/// message) plus typing notifications.
use crate::config::Config;
use crate::contacts::ContactDirectory;
use crate::error::{ChatError, Result};
use crate::history::{HistoryLoader, HistoryState};
use crate::message_store::{DayBlock, MessageStore};
use crate::net::protocol::{ClientEvent, ServerEvent};
use crate::net::session::Session;
use crate::presence::PresenceTracker;
use crate::rest::MarketplaceApi;
use crate::typing::{TypingBurst, TypingTracker};
use crate::types::{ChatMessage, Contact, UserId};
use crate::unread::UnreadCounters;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Coarse change notification; every UI surface re-reads what it displays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatUpdate {
    Connection,
    Presence,
    Messages,
    Contacts,
    Typing,
    Unread,
    History,
}

/// One engine per authenticated identity
pub struct ChatClient {
    config: Config,
    session: Session,
    api: Arc<dyn MarketplaceApi>,

    store: Arc<RwLock<MessageStore>>,
    presence: Arc<RwLock<PresenceTracker>>,
    typing: Arc<RwLock<TypingTracker>>,
    burst: Arc<RwLock<TypingBurst>>,
    unread: Arc<RwLock<UnreadCounters>>,
    contacts: Arc<RwLock<ContactDirectory>>,
    loader: Arc<RwLock<HistoryLoader>>,

    updates_tx: broadcast::Sender<ChatUpdate>,

    /// Debounce timer for the local typing burst; aborted before every re-arm
    typing_stop_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Wakeup for remote-indicator expiry; aborted before every re-arm
    typing_expiry_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ChatClient {
    pub fn new(config: Config, api: Arc<dyn MarketplaceApi>) -> Self {
        let session = Session::new(config.clone());
        let (updates_tx, _) = broadcast::channel(64);

        Self {
            typing: Arc::new(RwLock::new(TypingTracker::new(config.typing_expiry))),
            burst: Arc::new(RwLock::new(TypingBurst::new(config.typing_stop_after))),
            config,
            session,
            api,
            store: Arc::new(RwLock::new(MessageStore::new())),
            presence: Arc::new(RwLock::new(PresenceTracker::new())),
            unread: Arc::new(RwLock::new(UnreadCounters::new())),
            contacts: Arc::new(RwLock::new(ContactDirectory::new())),
            loader: Arc::new(RwLock::new(HistoryLoader::new())),
            updates_tx,
            typing_stop_task: Arc::new(Mutex::new(None)),
            typing_expiry_task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn local_user_id(&self) -> UserId {
        self.config.local_user_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Connect the session and start the event pump
    pub async fn start(&self) -> Result<()> {
        // Subscribe before connecting so the initial presence snapshot is
        // never missed
        let events = self.session.subscribe();
        self.session.connect(self.config.local_user_id).await?;

        let client = self.clone();
        tokio::spawn(async move {
            client.pump(events).await;
        });

        // Surface connection transitions to the UI
        let client = self.clone();
        let mut connected = self.session.watch_connected();
        tokio::spawn(async move {
            while connected.changed().await.is_ok() {
                client.notify(ChatUpdate::Connection);
            }
        });

        Ok(())
    }

    /// Tear everything down (unmount/logout)
    pub async fn shutdown(&self) {
        if let Some(task) = self.typing_stop_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.typing_expiry_task.lock().await.take() {
            task.abort();
        }
        self.session.disconnect().await;
        info!("Chat engine stopped for user {}", self.config.local_user_id);
    }

    // ─── Commands ────────────────────────────────────────────────────────

    /// Open the conversation with `peer`: zero its unread counter, signal
    /// the server to mark the pair as read, and load history. Live messages
    /// arriving while the fetch is in flight land after the history replace.
    pub async fn open_conversation(&self, peer: UserId) -> Result<()> {
        let local = self.config.local_user_id;
        if peer == local {
            return Err(ChatError::SelfMessage);
        }

        info!("Opening conversation with peer {}", peer);
        self.unread.write().await.open_conversation(peer);
        self.contacts.write().await.set_unread(peer, 0);
        self.store.write().await.clear();
        let token = self.loader.write().await.begin(peer);
        self.notify(ChatUpdate::Unread);
        self.notify(ChatUpdate::Contacts);
        self.notify(ChatUpdate::Messages);
        self.notify(ChatUpdate::History);

        // Mark-as-read + recount trigger; independent of the REST fetch,
        // the two may complete in either order
        if let Err(e) = self.session.emit(ClientEvent::HistoryOpen {
            user_a: local,
            user_b: peer,
        }) {
            warn!("History-open signal not sent: {}", e);
        }

        let result = self.api.fetch_history(local, peer).await;

        let mut loader = self.loader.write().await;
        match result {
            Ok(history) => {
                if let Some(pending) = loader.complete(token, true) {
                    let mut store = self.store.write().await;
                    store.replace_all(history);
                    for message in pending {
                        store.append(message);
                    }
                    drop(store);
                    drop(loader);
                    self.notify(ChatUpdate::Messages);
                    self.notify(ChatUpdate::History);
                }
                Ok(())
            }
            Err(e) => {
                // The store keeps its previous state; queued live messages
                // are still real and still land
                if let Some(pending) = loader.complete(token, false) {
                    let mut store = self.store.write().await;
                    for message in pending {
                        store.append(message);
                    }
                    drop(store);
                }
                drop(loader);
                self.notify(ChatUpdate::Messages);
                self.notify(ChatUpdate::History);
                warn!("History fetch for peer {} failed: {}", peer, e);
                Err(e)
            }
        }
    }

    /// Leave the open conversation
    pub async fn close_conversation(&self) {
        let peer = self.loader.read().await.peer();
        if let Some(peer) = peer {
            if self.burst.write().await.end_burst() {
                let _ = self.session.emit(ClientEvent::TypingStop {
                    sender_id: self.config.local_user_id,
                    recipient_id: peer,
                });
            }
        }
        self.unread.write().await.close_conversation();
        self.loader.write().await.reset();
        self.store.write().await.clear();
        self.notify(ChatUpdate::Messages);
        self.notify(ChatUpdate::History);
    }

    /// Send a message to `recipient`. Rejected locally for self-sends and
    /// while disconnected; inserted optimistically on success, with the
    /// server echo reconciled by the store's fuzzy dedup key.
    pub async fn send_message(&self, recipient: UserId, content: &str) -> Result<()> {
        let local = self.config.local_user_id;
        if recipient == local {
            return Err(ChatError::SelfMessage);
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::Protocol("Refusing to send an empty message".to_string()));
        }

        let message = ChatMessage {
            id: None,
            sender_id: local,
            recipient_id: recipient,
            content: content.to_string(),
            created_at: Utc::now(),
        };

        // Refused while disconnected, before any local state changes
        self.session.emit(ClientEvent::SendMessage {
            message: message.clone(),
        })?;

        if self.loader.read().await.peer() == Some(recipient) {
            if self.store.write().await.append(message.clone()) {
                self.notify(ChatUpdate::Messages);
            }
        }
        self.contacts
            .write()
            .await
            .apply_preview(recipient, &message.content, message.created_at);
        self.notify(ChatUpdate::Contacts);

        // Sending ends the typing burst
        if self.burst.write().await.end_burst() {
            let _ = self.session.emit(ClientEvent::TypingStop {
                sender_id: local,
                recipient_id: recipient,
            });
        }
        if let Some(task) = self.typing_stop_task.lock().await.take() {
            task.abort();
        }

        Ok(())
    }

    /// Local keystroke toward `recipient`: emits the start signal at most
    /// once per continuous burst and (re)arms the stop debounce.
    pub async fn notify_typing(&self, recipient: UserId) -> Result<()> {
        let local = self.config.local_user_id;
        if recipient == local {
            return Err(ChatError::SelfMessage);
        }
        if !self.session.is_connected() {
            return Err(ChatError::Disconnected);
        }

        if self.burst.write().await.on_input(Instant::now()) {
            self.session.emit(ClientEvent::TypingStart {
                sender_id: local,
                recipient_id: recipient,
            })?;
        }

        // Fresh keystroke resets the stop timer; the old one is always
        // aborted so timers cannot pile up
        let client = self.clone();
        let stop_after = self.config.typing_stop_after;
        let mut guard = self.typing_stop_task.lock().await;
        if let Some(task) = guard.take() {
            task.abort();
        }
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(stop_after).await;
            if client.burst.write().await.poll_idle(Instant::now()) {
                let _ = client.session.emit(ClientEvent::TypingStop {
                    sender_id: local,
                    recipient_id: recipient,
                });
            }
        }));

        Ok(())
    }

    /// Reload the conversation snapshot from REST, merging presence and
    /// seeding unread counters; also nudges the server's push-side refresh.
    pub async fn refresh_contacts(&self) -> Result<()> {
        let local = self.config.local_user_id;

        if let Err(e) = self.session.emit(ClientEvent::ContactRequest { user_id: local }) {
            debug!("Contact refresh signal not sent: {}", e);
        }

        let contacts = self.api.fetch_conversations(local).await?;

        {
            let mut unread = self.unread.write().await;
            for contact in &contacts {
                unread.seed(contact.id, contact.unread_count);
            }
        }
        let open_peer = self.unread.read().await.open_peer();
        {
            let presence = self.presence.read().await;
            let mut directory = self.contacts.write().await;
            directory.load_snapshot(contacts, &presence);
            // The open conversation stays read whatever the snapshot says
            if let Some(peer) = open_peer {
                directory.set_unread(peer, 0);
            }
        }

        self.notify(ChatUpdate::Contacts);
        self.notify(ChatUpdate::Unread);
        Ok(())
    }

    // ─── Derived state (read-only views) ─────────────────────────────────

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.store.read().await.messages().to_vec()
    }

    /// Grouped/day-annotated projection for presentation
    pub async fn grouped_messages(&self) -> Vec<DayBlock> {
        self.store.read().await.grouped()
    }

    /// The conversation list visible to the local role, optionally filtered
    /// by a case/diacritic-insensitive name query
    pub async fn conversations(&self, query: &str) -> Vec<Contact> {
        self.contacts
            .read()
            .await
            .filtered(self.config.local_role, query)
    }

    /// Typing indicator, surfaced only for the open conversation's peer
    pub async fn typing_peer(&self) -> Option<UserId> {
        let open = self.loader.read().await.peer();
        self.typing
            .read()
            .await
            .current(Instant::now())
            .filter(|p| Some(*p) == open)
    }

    pub async fn is_online(&self, peer: UserId) -> bool {
        self.presence.read().await.is_online(peer)
    }

    pub async fn unread_count(&self, peer: UserId) -> u32 {
        self.unread.read().await.count(peer)
    }

    /// Badge total across all conversations
    pub async fn unread_total(&self) -> u64 {
        self.unread.read().await.total()
    }

    pub async fn history_state(&self) -> HistoryState {
        self.loader.read().await.state()
    }

    pub async fn open_peer(&self) -> Option<UserId> {
        self.loader.read().await.peer()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.session.watch_connected()
    }

    /// Subscribe to coarse change notifications
    pub fn subscribe_updates(&self) -> broadcast::Receiver<ChatUpdate> {
        self.updates_tx.subscribe()
    }

    // ─── Event pump ──────────────────────────────────────────────────────

    async fn pump(&self, mut events: broadcast::Receiver<ServerEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.dispatch(event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Skip lagged events and keep going; the next snapshot
                    // fetch reconciles anything missed
                    warn!("Event pump lagged {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Event pump stopped");
    }

    async fn dispatch(&self, event: ServerEvent) {
        match event {
            ServerEvent::PresenceSnapshot { user_ids } => {
                let mut presence = self.presence.write().await;
                presence.apply_snapshot(user_ids);
                self.contacts
                    .write()
                    .await
                    .apply_presence_snapshot(&presence);
                drop(presence);
                self.notify(ChatUpdate::Presence);
                self.notify(ChatUpdate::Contacts);
            }
            ServerEvent::PeerOnline { user_id } => {
                self.presence.write().await.apply_delta(user_id, true);
                self.contacts.write().await.apply_presence(user_id, true);
                self.notify(ChatUpdate::Presence);
                self.notify(ChatUpdate::Contacts);
            }
            ServerEvent::PeerOffline { user_id } => {
                self.presence.write().await.apply_delta(user_id, false);
                self.contacts.write().await.apply_presence(user_id, false);
                self.notify(ChatUpdate::Presence);
                self.notify(ChatUpdate::Contacts);
            }
            ServerEvent::Message { message } => self.on_message(message).await,
            ServerEvent::ConversationPreview {
                peer_id,
                last_message,
                last_message_at,
            } => {
                self.contacts
                    .write()
                    .await
                    .apply_preview(peer_id, &last_message, last_message_at);
                self.notify(ChatUpdate::Contacts);
            }
            ServerEvent::PeerTypingStart { sender_id } => {
                self.typing
                    .write()
                    .await
                    .set_remote(sender_id, Instant::now());
                self.arm_typing_expiry().await;
                self.notify(ChatUpdate::Typing);
            }
            ServerEvent::PeerTypingStop { sender_id } => {
                self.typing.write().await.clear_remote(sender_id);
                self.notify(ChatUpdate::Typing);
            }
            ServerEvent::UnreadUpdate { peer_id, total } => {
                let count = self.unread.write().await.apply_authoritative(peer_id, total);
                self.contacts.write().await.set_unread(peer_id, count);
                self.notify(ChatUpdate::Unread);
                self.notify(ChatUpdate::Contacts);
            }
        }
    }

    /// Inbound message or echo of one the local user sent
    async fn on_message(&self, message: ChatMessage) {
        let local = self.config.local_user_id;
        let peer = message.peer_of(local);
        let inbound = message.sender_id != local;

        if inbound {
            let mut unread = self.unread.write().await;
            if unread.open_peer() != Some(peer) {
                let count = unread.record_inbound(peer);
                drop(unread);
                self.contacts.write().await.set_unread(peer, count);
                self.notify(ChatUpdate::Unread);
            }
        }

        // The message doubles as a preview patch for the list
        self.contacts
            .write()
            .await
            .apply_preview(peer, &message.content, message.created_at);
        self.notify(ChatUpdate::Contacts);

        // The store only holds the open conversation; a message racing an
        // in-flight history fetch is queued and applied after the replace
        let mut loader = self.loader.write().await;
        if loader.peer() == Some(peer) {
            if loader.is_loading() {
                loader.queue_live(message);
                debug!("Queued live message behind in-flight history for peer {}", peer);
            } else {
                drop(loader);
                if self.store.write().await.append(message) {
                    self.notify(ChatUpdate::Messages);
                }
            }
        }
    }

    /// Arm the remote-indicator expiry wakeup so surfaces re-read after the
    /// window lapses even if the stop event was lost
    async fn arm_typing_expiry(&self) {
        let Some(deadline) = self.typing.read().await.deadline() else {
            return;
        };

        let client = self.clone();
        let mut guard = self.typing_expiry_task.lock().await;
        if let Some(task) = guard.take() {
            task.abort();
        }
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            if client.typing.read().await.current(Instant::now()).is_none() {
                client.notify(ChatUpdate::Typing);
            }
        }));
    }

    fn notify(&self, update: ChatUpdate) {
        // No subscriber is fine; surfaces attach on their own schedule
        let _ = self.updates_tx.send(update);
    }
}

impl Clone for ChatClient {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            session: self.session.clone(),
            api: self.api.clone(),
            store: self.store.clone(),
            presence: self.presence.clone(),
            typing: self.typing.clone(),
            burst: self.burst.clone(),
            unread: self.unread.clone(),
            contacts: self.contacts.clone(),
            loader: self.loader.clone(),
            updates_tx: self.updates_tx.clone(),
            typing_stop_task: self.typing_stop_task.clone(),
            typing_expiry_task: self.typing_expiry_task.clone(),
        }
    }
}
