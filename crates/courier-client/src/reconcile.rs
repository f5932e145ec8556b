//! Ordered, de-duplicated local collections.
//!
//! Both collections are keyed by id, so applying the same remote record
//! twice, or applying a local echo and a push for the same record, leaves a
//! single entry. Order does not depend on arrival order.

use std::collections::HashSet;

use courier_shared::{ChatId, MessageId};
use courier_store::{ChatRoom, Message};

/// Messages of the open chat, ascending by `(timestamp, id)`.
#[derive(Debug, Default, Clone)]
pub struct MessageTimeline {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless a message with the same id is present. Returns `true`
    /// if the message was new.
    pub fn insert(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        let idx = self
            .messages
            .partition_point(|m| m.sort_key() < message.sort_key());
        self.ids.insert(message.id.clone());
        self.messages.insert(idx, message);
        true
    }

    /// Insert many; returns how many were new.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) -> usize {
        messages.into_iter().filter(|m| self.insert(m.clone())).count()
    }

    /// Replace the stored copy of an already-present message (read flag
    /// changes). Unknown ids are ignored.
    pub fn refresh(&mut self, message: Message) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => {
                *slot = message;
                true
            }
            None => false,
        }
    }

    pub fn set_read(&mut self, id: &MessageId) -> bool {
        match self.messages.iter_mut().find(|m| &m.id == id) {
            Some(m) if !m.is_read => {
                m.is_read = true;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        if !self.ids.remove(id) {
            return None;
        }
        let idx = self.messages.iter().position(|m| &m.id == id)?;
        Some(self.messages.remove(idx))
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn oldest(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}

/// The session user's chats, descending by `last_message_time`.
#[derive(Debug, Default, Clone)]
pub struct ChatList {
    chats: Vec<ChatRoom>,
}

impl ChatList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace by id or append, then re-sort.
    pub fn upsert(&mut self, chat: ChatRoom) {
        match self.chats.iter_mut().find(|c| c.id == chat.id) {
            Some(slot) => *slot = chat,
            None => self.chats.push(chat),
        }
        self.sort();
    }

    pub fn replace_all(&mut self, chats: impl IntoIterator<Item = ChatRoom>) {
        self.chats.clear();
        for chat in chats {
            match self.chats.iter_mut().find(|c| c.id == chat.id) {
                Some(slot) => *slot = chat,
                None => self.chats.push(chat),
            }
        }
        self.sort();
    }

    /// Fold a fetched batch into the list without dropping anything. A
    /// cached entry with a newer summary wins over the fetched copy, since
    /// pushes may have landed while the fetch was in flight. Returns how many
    /// entries were added or replaced.
    pub fn merge(&mut self, chats: impl IntoIterator<Item = ChatRoom>) -> usize {
        let mut touched = 0;
        for chat in chats {
            match self.chats.iter_mut().find(|c| c.id == chat.id) {
                Some(slot) if slot.last_message_time > chat.last_message_time => {}
                Some(slot) => {
                    *slot = chat;
                    touched += 1;
                }
                None => {
                    self.chats.push(chat);
                    touched += 1;
                }
            }
        }
        self.sort();
        touched
    }

    pub fn remove(&mut self, id: &ChatId) -> Option<ChatRoom> {
        let idx = self.chats.iter().position(|c| &c.id == id)?;
        Some(self.chats.remove(idx))
    }

    pub fn get(&self, id: &ChatId) -> Option<&ChatRoom> {
        self.chats.iter().find(|c| &c.id == id)
    }

    pub fn contains(&self, id: &ChatId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<ChatId> {
        self.chats.iter().map(|c| c.id.clone()).collect()
    }

    pub fn as_slice(&self) -> &[ChatRoom] {
        &self.chats
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn clear(&mut self) {
        self.chats.clear();
    }

    /// Ties fall back to id so the order is deterministic.
    fn sort(&mut self) {
        self.chats.sort_by(|a, b| {
            b.last_message_time
                .cmp(&a.last_message_time)
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}
