/// Typing indicator coordination. Two independent halves: the remote side
/// tracks which peer is typing to the local user with a bounded lifetime (a
/// lost "stopped typing" event must not wedge the indicator on forever); the
/// local side turns raw keystrokes into at-most-one start signal per burst
/// plus a stop signal after an inactivity window.
use crate::types::UserId;
use std::time::{Duration, Instant};

/// Remote indicator: who is typing to the local user
#[derive(Debug)]
pub struct TypingTracker {
    expiry: Duration,
    current: Option<(UserId, Instant)>,
}

impl TypingTracker {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            current: None,
        }
    }

    /// Remote typing signal: last writer wins, at most one peer tracked
    pub fn set_remote(&mut self, peer: UserId, now: Instant) {
        self.current = Some((peer, now));
    }

    /// Explicit stop; ignored unless it matches the tracked peer
    pub fn clear_remote(&mut self, peer: UserId) {
        if self.current.map(|(p, _)| p) == Some(peer) {
            self.current = None;
        }
    }

    /// The currently-typing peer, expiring implicitly when no refresh
    /// arrived within the window
    pub fn current(&self, now: Instant) -> Option<UserId> {
        self.current.and_then(|(peer, since)| {
            if now.duration_since(since) < self.expiry {
                Some(peer)
            } else {
                None
            }
        })
    }

    /// When the indicator will expire absent a refresh
    pub fn deadline(&self) -> Option<Instant> {
        self.current.map(|(_, since)| since + self.expiry)
    }
}

/// Local burst: debounce of the user's own keystrokes
#[derive(Debug)]
pub struct TypingBurst {
    stop_after: Duration,
    active: bool,
    last_input: Option<Instant>,
}

impl TypingBurst {
    pub fn new(stop_after: Duration) -> Self {
        Self {
            stop_after,
            active: false,
            last_input: None,
        }
    }

    /// A keystroke landed. Returns true exactly when a new burst begins,
    /// i.e. when the start signal should be emitted.
    pub fn on_input(&mut self, now: Instant) -> bool {
        let started = !self.active;
        self.active = true;
        self.last_input = Some(now);
        started
    }

    /// Check for burst end by inactivity. Returns true exactly once per
    /// burst, when the stop signal should be emitted.
    pub fn poll_idle(&mut self, now: Instant) -> bool {
        if self.active
            && self
                .last_input
                .is_none_or(|t| now.duration_since(t) >= self.stop_after)
        {
            self.active = false;
            true
        } else {
            false
        }
    }

    /// Force the burst closed (message sent, conversation left). Returns
    /// true if a stop signal should be emitted.
    pub fn end_burst(&mut self) -> bool {
        let was_active = self.active;
        self.active = false;
        self.last_input = None;
        was_active
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// When the burst would end absent further input
    pub fn deadline(&self) -> Option<Instant> {
        if self.active {
            self.last_input.map(|t| t + self.stop_after)
        } else {
            None
        }
    }
}
