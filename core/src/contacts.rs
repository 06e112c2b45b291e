/// Conversation list synchronizer: the ordered source of truth for "which
/// peers have I talked to, and what's the preview", merged from REST
/// snapshots and live events.
use crate::presence::PresenceTracker;
use crate::types::{Contact, Role, UserId};
use crate::utils::normalize;
use chrono::{DateTime, Utc};
use tracing::warn;

#[derive(Debug, Default)]
pub struct ContactDirectory {
    contacts: Vec<Contact>,
}

impl ContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// REST snapshot: wholesale replace, with presence merged at merge time
    pub fn load_snapshot(&mut self, mut contacts: Vec<Contact>, presence: &PresenceTracker) {
        for contact in &mut contacts {
            contact.online = presence.is_online(contact.id);
        }
        self.contacts = contacts;
        self.sort();
    }

    /// Live preview patch. An unknown peer is logged and ignored rather than
    /// synthesized into a half-empty entry; the next snapshot load is the
    /// recovery path.
    pub fn apply_preview(
        &mut self,
        peer_id: UserId,
        last_message: &str,
        last_message_at: DateTime<Utc>,
    ) -> bool {
        match self.contacts.iter_mut().find(|c| c.id == peer_id) {
            Some(contact) => {
                contact.last_message = Some(last_message.to_string());
                contact.last_message_at = Some(last_message_at);
                self.sort();
                true
            }
            None => {
                warn!(
                    "Preview for unknown peer {} dropped, awaiting snapshot refresh",
                    peer_id
                );
                false
            }
        }
    }

    /// Merge one presence delta into the list
    pub fn apply_presence(&mut self, user_id: UserId, online: bool) {
        if let Some(contact) = self.contacts.iter_mut().find(|c| c.id == user_id) {
            contact.online = online;
        }
    }

    /// Re-merge the whole online set (after a presence snapshot)
    pub fn apply_presence_snapshot(&mut self, presence: &PresenceTracker) {
        for contact in &mut self.contacts {
            contact.online = presence.is_online(contact.id);
        }
    }

    pub fn set_unread(&mut self, peer_id: UserId, count: u32) {
        if let Some(contact) = self.contacts.iter_mut().find(|c| c.id == peer_id) {
            contact.unread_count = count;
        }
    }

    pub fn get(&self, peer_id: UserId) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == peer_id)
    }

    pub fn is_known(&self, peer_id: UserId) -> bool {
        self.get(peer_id).is_some()
    }

    /// The synchronized list, most recent activity first
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Pure projection: role compatibility plus case/diacritic-insensitive
    /// substring on the display name. Never mutates the list.
    pub fn filtered(&self, viewer_role: Role, query: &str) -> Vec<Contact> {
        self.contacts
            .iter()
            .filter(|c| viewer_role.sees(c.role))
            .filter(|c| query.is_empty() || normalize::contains_fold(&c.display_name, query))
            .cloned()
            .collect()
    }

    fn sort(&mut self) {
        // Descending by last activity; introduced_at stands in for peers
        // with no messages yet
        self.contacts
            .sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
    }
}
