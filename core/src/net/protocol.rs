/// Wire protocol for the chat gateway connection
use crate::types::{ChatMessage, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Events emitted by the client over the persistent connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Associate this connection with the authenticated user
    #[serde(rename = "register")]
    Register { user_id: UserId },

    /// Ask for a full online-set snapshot
    #[serde(rename = "presence_request")]
    PresenceRequest,

    /// Deliver a message; the server echoes it back confirmed
    #[serde(rename = "send_message")]
    SendMessage { message: ChatMessage },

    /// Notify the peer a typing burst started
    #[serde(rename = "typing_start")]
    TypingStart {
        sender_id: UserId,
        recipient_id: UserId,
    },

    /// Notify the peer the typing burst ended
    #[serde(rename = "typing_stop")]
    TypingStop {
        sender_id: UserId,
        recipient_id: UserId,
    },

    /// History for the pair is being opened: mark as read and recount
    #[serde(rename = "history_open")]
    HistoryOpen { user_a: UserId, user_b: UserId },

    /// Ask the server to refresh the conversation snapshot
    #[serde(rename = "contact_request")]
    ContactRequest { user_id: UserId },
}

impl ClientEvent {
    /// Get event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::Register { .. } => "register",
            ClientEvent::PresenceRequest => "presence_request",
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::TypingStart { .. } => "typing_start",
            ClientEvent::TypingStop { .. } => "typing_stop",
            ClientEvent::HistoryOpen { .. } => "history_open",
            ClientEvent::ContactRequest { .. } => "contact_request",
        }
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientEvent({})", self.event_type())
    }
}

/// Events pushed by the server over the persistent connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Full online set; replaces previous presence state
    #[serde(rename = "presence_snapshot")]
    PresenceSnapshot { user_ids: Vec<UserId> },

    /// Incremental presence add
    #[serde(rename = "peer_online")]
    PeerOnline { user_id: UserId },

    /// Incremental presence remove
    #[serde(rename = "peer_offline")]
    PeerOffline { user_id: UserId },

    /// Inbound message or echo of one the local user sent
    #[serde(rename = "message")]
    Message { message: ChatMessage },

    /// Last-message preview patch for one conversation
    #[serde(rename = "conversation_preview")]
    ConversationPreview {
        peer_id: UserId,
        last_message: String,
        last_message_at: DateTime<Utc>,
    },

    /// A peer started typing to the local user
    #[serde(rename = "peer_typing_start")]
    PeerTypingStart { sender_id: UserId },

    /// A peer stopped typing
    #[serde(rename = "peer_typing_stop")]
    PeerTypingStop { sender_id: UserId },

    /// Authoritative unread total for one peer
    #[serde(rename = "unread_update")]
    UnreadUpdate { peer_id: UserId, total: i64 },
}

impl ServerEvent {
    /// Get event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::PresenceSnapshot { .. } => "presence_snapshot",
            ServerEvent::PeerOnline { .. } => "peer_online",
            ServerEvent::PeerOffline { .. } => "peer_offline",
            ServerEvent::Message { .. } => "message",
            ServerEvent::ConversationPreview { .. } => "conversation_preview",
            ServerEvent::PeerTypingStart { .. } => "peer_typing_start",
            ServerEvent::PeerTypingStop { .. } => "peer_typing_stop",
            ServerEvent::UnreadUpdate { .. } => "unread_update",
        }
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerEvent({})", self.event_type())
    }
}

/// Protocol frame with length prefix
#[derive(Debug)]
pub struct Frame {
    pub length: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame from an event (either direction)
    pub fn from_event<T: Serialize>(event: &T) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_vec(event)?;
        Ok(Self {
            length: payload.len() as u32,
            payload,
        })
    }

    /// Serialize frame to bytes (length prefix + payload)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.payload.len());
        buf.extend_from_slice(&self.length.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse frame from bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }

        let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

        if data.len() < 4 + length {
            return None;
        }

        Some(Self {
            length: length as u32,
            payload: data[4..4 + length].to_vec(),
        })
    }
}
