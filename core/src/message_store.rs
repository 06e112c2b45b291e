/// Message store: the ordered, de-duplicated message list for the single
/// conversation currently open. An optimistic local send and its server echo
/// are the same logical message arriving with different metadata, so dedup
/// uses a dual key: shared server id, or same sender + same content within a
/// small timestamp tolerance.
use crate::types::{ChatMessage, UserId};
use chrono::NaiveDate;

/// Echo reconciliation window between an optimistic copy and its echo
const ECHO_TOLERANCE_MS: i64 = 1500;

/// Consecutive same-sender messages within this window render as one group
const GROUP_WINDOW_SECS: i64 = 120;

#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message unless it duplicates an existing entry. Returns
    /// whether the store changed. An echo adopts its server id onto the
    /// optimistic copy it matches.
    pub fn append(&mut self, message: ChatMessage) -> bool {
        if let Some(existing) = self
            .messages
            .iter_mut()
            .find(|m| is_duplicate(m, &message))
        {
            // A message is never mutated except to acquire its server id
            if existing.id.is_none() && message.id.is_some() {
                existing.id = message.id;
            }
            return false;
        }

        // Ascending created_at; ties keep insertion order
        let pos = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(pos, message);
        true
    }

    /// Replace the whole list with a history batch, deduplicated
    pub fn replace_all(&mut self, messages: Vec<ChatMessage>) {
        self.messages.clear();
        for message in messages {
            self.append(message);
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Presentation projection: day-boundary markers wrapping same-sender
    /// runs. Recomputed from the canonical list, never stored.
    pub fn grouped(&self) -> Vec<DayBlock> {
        let mut days: Vec<DayBlock> = Vec::new();

        for message in &self.messages {
            let date = message.created_at.date_naive();
            if days.last().map(|d| d.date) != Some(date) {
                days.push(DayBlock {
                    date,
                    groups: Vec::new(),
                });
            }
            let Some(day) = days.last_mut() else { continue };

            match day.groups.last_mut() {
                Some(group)
                    if group.sender_id == message.sender_id
                        && group.messages.last().is_some_and(|last| {
                            (message.created_at - last.created_at).num_seconds()
                                <= GROUP_WINDOW_SECS
                        }) =>
                {
                    group.messages.push(message.clone());
                }
                _ => day.groups.push(MessageGroup {
                    sender_id: message.sender_id,
                    messages: vec![message.clone()],
                }),
            }
        }

        days
    }
}

/// One calendar day of the conversation
#[derive(Debug, Clone, PartialEq)]
pub struct DayBlock {
    pub date: NaiveDate,
    pub groups: Vec<MessageGroup>,
}

/// A run of consecutive messages from one sender
#[derive(Debug, Clone, PartialEq)]
pub struct MessageGroup {
    pub sender_id: UserId,
    pub messages: Vec<ChatMessage>,
}

fn is_duplicate(existing: &ChatMessage, incoming: &ChatMessage) -> bool {
    match (existing.id, incoming.id) {
        // Two confirmed messages are distinct unless the server says otherwise
        (Some(a), Some(b)) => a == b,
        _ => {
            existing.sender_id == incoming.sender_id
                && existing.content == incoming.content
                && (existing.created_at - incoming.created_at)
                    .num_milliseconds()
                    .abs()
                    <= ECHO_TOLERANCE_MS
        }
    }
}
