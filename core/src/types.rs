/// Shared types for the chat engine
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque stable identifier of a marketplace user (end user, broker or admin).
/// Supplied by the auth layer; never minted here.
pub type UserId = i64;

/// Participant role on the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "CORRETOR")]
    Corretor,
    #[serde(rename = "ADMIN")]
    Admin,
}

impl Role {
    /// Conversation-list visibility: users see brokers, brokers see users,
    /// admins see everyone.
    pub fn sees(self, other: Role) -> bool {
        match self {
            Role::Admin => true,
            Role::User => other == Role::Corretor,
            Role::Corretor => other == Role::User,
        }
    }
}

/// One chat message between two marketplace users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned id; absent until the server confirms/echoes the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: String,
    /// Malformed timestamps fall back to "now" instead of losing the message
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// The other party of the message, from `local`'s point of view
    pub fn peer_of(&self, local: UserId) -> UserId {
        if self.sender_id == local {
            self.recipient_id
        } else {
            self.sender_id
        }
    }
}

/// One conversation-list entry: a peer with its last-message preview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    /// When the peer first appeared in the list ("contact a broker" flow);
    /// stand-in sort key until the first message is exchanged
    #[serde(default = "Utc::now")]
    pub introduced_at: DateTime<Utc>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub online: bool,
}

impl Contact {
    /// Recency sort key for the conversation list
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.introduced_at)
    }
}

/// Parse an RFC3339 timestamp, treating anything malformed as "now".
/// A message must never be dropped over a formatting error upstream.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now))
}
