//! Domain model structs persisted in the remote store.
//!
//! Every struct derives `Serialize` and `Deserialize` with camelCase field
//! names; the record codec in [`crate::record`] turns them into the flat
//! string-keyed maps the backend stores.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_shared::{ChatId, MessageId, MessageType, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user and their presence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identifier issued by the auth provider.
    pub id: UserId,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub photo_url: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub is_online: bool,
    /// Chats this user belongs to, kept redundantly for fast lookup.
    #[serde(default)]
    pub chat_ids: BTreeSet<ChatId>,
}

impl User {
    pub fn new(id: impl Into<UserId>, email: impl Into<String>, username: impl Into<String>) -> Self {
        let username = username.into();
        let now = Utc::now();
        Self {
            id: id.into(),
            email: email.into(),
            display_name: username.clone(),
            username,
            photo_url: String::new(),
            created_at: now,
            last_seen: now,
            is_online: false,
            chat_ids: BTreeSet::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ChatRoom
// ---------------------------------------------------------------------------

/// A conversation (direct or group) with its denormalized last-message summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: ChatId,
    pub name: String,
    pub participant_ids: BTreeSet<UserId>,
    #[serde(default)]
    pub is_group_chat: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub last_message_sender: Option<String>,
    /// Sort key of the chat list (descending).
    pub last_message_time: DateTime<Utc>,
}

impl ChatRoom {
    /// Build a new chat. `created_by` is always part of the participant set.
    pub fn new(
        name: impl Into<String>,
        created_by: UserId,
        participants: impl IntoIterator<Item = UserId>,
        is_group_chat: bool,
    ) -> Self {
        let now = Utc::now();
        let mut participant_ids: BTreeSet<UserId> = participants.into_iter().collect();
        participant_ids.insert(created_by.clone());
        Self {
            id: ChatId::new(),
            name: name.into(),
            participant_ids,
            is_group_chat,
            created_by,
            created_at: now,
            last_message: String::new(),
            last_message_sender: None,
            last_message_time: now,
        }
    }

    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participant_ids.contains(user)
    }

    /// Returns `true` if the user was not already a participant.
    pub fn add_participant(&mut self, user: UserId) -> bool {
        self.participant_ids.insert(user)
    }

    /// Returns `true` if the user was a participant.
    pub fn remove_participant(&mut self, user: &UserId) -> bool {
        self.participant_ids.remove(user)
    }

    /// Fold a persisted message into the summary, never moving it backwards.
    pub fn apply_summary(&mut self, message: &Message) {
        if message.timestamp >= self.last_message_time || self.last_message.is_empty() {
            self.last_message = message.content.clone();
            self.last_message_sender = Some(message.sender_name.clone());
            self.last_message_time = self.last_message_time.max(message.timestamp);
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message. Immutable once persisted except for `is_read`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    /// Captured at send time; not re-synced on rename.
    pub sender_name: String,
    pub content: String,
    /// Sender's clock, UTC.
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub message_type: MessageType,
}

impl Message {
    pub fn new(
        chat_id: ChatId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::generate(timestamp),
            chat_id,
            sender_id,
            sender_name: sender_name.into(),
            content: content.into(),
            timestamp,
            is_read: false,
            message_type: MessageType::Text,
        }
    }

    /// Presentation order: timestamp, then id.
    pub fn sort_key(&self) -> (DateTime<Utc>, &MessageId) {
        (self.timestamp, &self.id)
    }
}
