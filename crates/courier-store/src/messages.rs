//! CRUD operations for [`Message`] records.

use serde_json::json;

use courier_shared::{ChatId, MessageId};

use crate::error::Result;
use crate::models::Message;
use crate::path::StorePath;
use crate::repository::Repository;
use crate::users::fields;

impl Repository {
    pub async fn put_message(&self, message: &Message) -> Result<()> {
        self.store_model(&StorePath::message(&message.chat_id, &message.id)?, message)
            .await
    }

    pub async fn get_message(&self, chat_id: &ChatId, id: &MessageId) -> Result<Option<Message>> {
        self.fetch(&StorePath::message(chat_id, id)?).await
    }

    /// All messages of a chat, ascending by timestamp then id.
    pub async fn list_messages(&self, chat_id: &ChatId) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self.fetch_all(&StorePath::messages(chat_id)?).await?;
        messages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(messages)
    }

    /// The newest `limit` messages, ascending.
    pub async fn recent_messages(&self, chat_id: &ChatId, limit: usize) -> Result<Vec<Message>> {
        let mut messages = self.list_messages(chat_id).await?;
        let skip = messages.len().saturating_sub(limit);
        messages.drain(..skip);
        Ok(messages)
    }

    /// Up to `limit` messages strictly older than `before`, ascending.
    pub async fn messages_before(
        &self,
        chat_id: &ChatId,
        before: &Message,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let mut older: Vec<Message> = self
            .list_messages(chat_id)
            .await?
            .into_iter()
            .filter(|m| m.sort_key() < before.sort_key())
            .collect();
        let skip = older.len().saturating_sub(limit);
        older.drain(..skip);
        Ok(older)
    }

    /// Set `isRead`. Returns `false` if the message does not exist.
    pub async fn mark_read(&self, chat_id: &ChatId, id: &MessageId) -> Result<bool> {
        let path = StorePath::message(chat_id, id)?;
        if self.store().get(&path).await?.is_none() {
            return Ok(false);
        }
        self.store().patch(&path, fields([("isRead", json!(true))])).await?;
        Ok(true)
    }

    pub async fn delete_message(&self, chat_id: &ChatId, id: &MessageId) -> Result<()> {
        self.store().delete(&StorePath::message(chat_id, id)?).await
    }

    /// Remove every message of a chat.
    pub async fn delete_messages(&self, chat_id: &ChatId) -> Result<()> {
        self.store().delete(&StorePath::messages(chat_id)?).await
    }
}
