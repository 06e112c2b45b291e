/// History load state for the open conversation. A REST fetch and the live
/// event stream race; the loader imposes the logical order: the history
/// replace lands first, live messages queued mid-flight are appended after.
use crate::types::{ChatMessage, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryState {
    /// No conversation open
    Idle,
    /// Fetch in flight; live messages for the pair are being queued
    Loading,
    Loaded,
    /// Fetch failed; retryable by reopening the conversation
    Failed,
}

#[derive(Debug)]
pub struct HistoryLoader {
    state: HistoryState,
    peer: Option<UserId>,
    generation: u64,
    pending: Vec<ChatMessage>,
}

impl HistoryLoader {
    pub fn new() -> Self {
        Self {
            state: HistoryState::Idle,
            peer: None,
            generation: 0,
            pending: Vec::new(),
        }
    }

    /// Begin a load for `peer`, superseding any in-flight load. Returns the
    /// generation token the fetch must present on completion.
    pub fn begin(&mut self, peer: UserId) -> u64 {
        self.generation += 1;
        self.peer = Some(peer);
        self.state = HistoryState::Loading;
        self.pending.clear();
        self.generation
    }

    /// Queue a live message that arrived while the fetch is in flight.
    /// Returns whether it was queued (false means apply it directly).
    pub fn queue_live(&mut self, message: ChatMessage) -> bool {
        if self.state == HistoryState::Loading {
            self.pending.push(message);
            true
        } else {
            false
        }
    }

    /// A fetch resolved. If `token` is still the current generation, the
    /// queued live tail is handed back for appending and the state settles;
    /// a superseded fetch gets `None` and changes nothing (the newer load
    /// owns the store).
    pub fn complete(&mut self, token: u64, success: bool) -> Option<Vec<ChatMessage>> {
        if token != self.generation || self.state != HistoryState::Loading {
            return None;
        }
        self.state = if success {
            HistoryState::Loaded
        } else {
            HistoryState::Failed
        };
        Some(std::mem::take(&mut self.pending))
    }

    /// Conversation closed; forget the pair
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = HistoryState::Idle;
        self.peer = None;
        self.pending.clear();
    }

    pub fn state(&self) -> HistoryState {
        self.state
    }

    pub fn peer(&self) -> Option<UserId> {
        self.peer
    }

    pub fn is_loading(&self) -> bool {
        self.state == HistoryState::Loading
    }
}

impl Default for HistoryLoader {
    fn default() -> Self {
        Self::new()
    }
}
