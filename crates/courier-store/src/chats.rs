//! CRUD operations for [`ChatRoom`] records.

use std::collections::BTreeSet;

use serde_json::json;

use courier_shared::{ChatId, UserId};

use crate::error::Result;
use crate::models::{ChatRoom, Message};
use crate::path::StorePath;
use crate::repository::Repository;
use crate::users::fields;

impl Repository {
    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub async fn get_chat(&self, id: &ChatId) -> Result<Option<ChatRoom>> {
        self.fetch(&StorePath::chat(id)?).await
    }

    /// Every chat record, in key order. Callers filter by membership.
    pub async fn list_chats(&self) -> Result<Vec<ChatRoom>> {
        self.fetch_all(&StorePath::chats()).await
    }

    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    pub async fn put_chat(&self, chat: &ChatRoom) -> Result<()> {
        self.store_model(&StorePath::chat(&chat.id)?, chat).await
    }

    /// Fold `message` into the chat's denormalized last-message fields.
    ///
    /// The summary only moves forward: an older message leaves it alone.
    /// Returns `false` if the chat does not exist or nothing changed.
    pub async fn update_chat_summary(&self, chat_id: &ChatId, message: &Message) -> Result<bool> {
        let Some(chat) = self.get_chat(chat_id).await? else {
            return Ok(false);
        };
        let mut updated = chat.clone();
        updated.apply_summary(message);
        if updated == chat {
            return Ok(false);
        }
        let summary = fields([
            ("lastMessage", json!(updated.last_message)),
            ("lastMessageSender", json!(updated.last_message_sender)),
            ("lastMessageTime", serde_json::to_value(updated.last_message_time)?),
        ]);
        self.store().patch(&StorePath::chat(chat_id)?, summary).await?;
        Ok(true)
    }

    pub async fn set_participants(&self, chat_id: &ChatId, participants: &BTreeSet<UserId>) -> Result<()> {
        let update = fields([("participantIds", serde_json::to_value(participants)?)]);
        self.store().patch(&StorePath::chat(chat_id)?, update).await
    }

    /// Remove only the chat record; messages are deleted separately.
    pub async fn delete_chat_record(&self, chat_id: &ChatId) -> Result<()> {
        self.store().delete(&StorePath::chat(chat_id)?).await
    }
}
