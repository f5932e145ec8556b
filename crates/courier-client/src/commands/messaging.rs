//! Sending, reading and reconciling messages.

use chrono::Utc;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use courier_shared::validation::truncate_chars;
use courier_shared::{ChatId, MessageId, NotFound, UserId, ValidationError};
use courier_store::Message;

use crate::core::ChatSyncCore;
use crate::events::SyncEvent;
use crate::outcome::SendOutcome;
use crate::Result;

impl ChatSyncCore {
    /// Persist a message, then fold it into the chat summary.
    ///
    /// Content is trimmed and cut to the configured maximum length. The two
    /// writes are independent; if only the first lands the result is
    /// [`SendOutcome::PartialFailure`].
    pub async fn send_message(
        &self,
        chat_id: &ChatId,
        sender_id: &UserId,
        sender_name: &str,
        content: &str,
    ) -> Result<SendOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let chat = self.get_chat(chat_id).await?;
        if !chat.has_participant(sender_id) {
            return Err(ValidationError::NotParticipant {
                user: sender_id.clone(),
                chat: chat_id.clone(),
            }
            .into());
        }

        let max = self.inner.config.max_message_length;
        let body = truncate_chars(content, max);
        if body.len() < content.len() {
            debug!(chat_id = %chat_id, max, "Message content truncated");
        }

        let message = Message::new(chat_id.clone(), sender_id.clone(), sender_name, body, Utc::now());
        self.inner.repo.put_message(&message).await?;
        info!(msg_id = %message.id, chat_id = %chat_id, "Message sent");

        let outcome = match self.inner.repo.update_chat_summary(chat_id, &message).await {
            Ok(_) => SendOutcome::Delivered(message.clone()),
            Err(e) => {
                warn!(msg_id = %message.id, chat_id = %chat_id, error = %e, "Chat summary update failed");
                SendOutcome::PartialFailure {
                    written: message.clone(),
                    summary_error: e.into(),
                }
            }
        };

        // Local echo. The push for the same id is deduplicated.
        let summary = self.state().chats.get(chat_id).cloned().map(|mut cached| {
            cached.apply_summary(&message);
            cached
        });
        if let Some(chat) = summary {
            self.apply_incoming_chat_update(chat);
        }
        self.apply_incoming_message(message);

        Ok(outcome)
    }

    /// Insert a message into the open chat's timeline.
    ///
    /// Messages for other chats and ids already present are ignored. A fresh
    /// message from someone else is marked read in the background and the
    /// chat's unread count is refreshed. Returns `true` if it was inserted.
    pub fn apply_incoming_message(&self, message: Message) -> bool {
        let chat_id = message.chat_id.clone();
        let message_id = message.id.clone();

        let needs_read = {
            let mut state = self.state();
            if state.open_chat.as_ref() != Some(&chat_id) {
                trace!(chat_id = %chat_id, msg_id = %message_id, "Message not for open chat");
                return false;
            }
            let from_other = state
                .user
                .as_ref()
                .is_some_and(|user| user.id != message.sender_id);
            let unread = !message.is_read;
            if !state.timeline.insert(message) {
                trace!(msg_id = %message_id, "Duplicate message ignored");
                return false;
            }
            from_other && unread
        };

        self.emit(SyncEvent::MessageAdded {
            chat_id: chat_id.clone(),
            message_id: message_id.clone(),
        });
        if needs_read {
            self.spawn_mark_read(chat_id, message_id);
        }
        true
    }

    /// Replace the local copy of a message whose record changed.
    pub(crate) fn apply_message_changed(&self, message: Message) {
        let refreshed = {
            let mut state = self.state();
            state.open_chat.as_ref() == Some(&message.chat_id) && state.timeline.refresh(message.clone())
        };
        if !refreshed {
            self.apply_incoming_message(message);
        }
    }

    pub(crate) fn apply_message_removed(&self, chat_id: &ChatId, message_id: &MessageId) {
        let removed = {
            let mut state = self.state();
            state.open_chat.as_ref() == Some(chat_id) && state.timeline.remove(message_id).is_some()
        };
        if removed {
            self.emit(SyncEvent::MessageRemoved {
                chat_id: chat_id.clone(),
                message_id: message_id.clone(),
            });
        }
    }

    fn spawn_mark_read(&self, chat_id: ChatId, message_id: MessageId) {
        let Ok(handle) = Handle::try_current() else {
            debug!(msg_id = %message_id, "No runtime, leaving message unread");
            return;
        };
        let core = self.clone();
        handle.spawn(async move {
            if let Err(e) = core.mark_as_read(&chat_id, &message_id).await {
                warn!(msg_id = %message_id, error = %e, "Background mark-as-read failed");
            }
            if let Err(e) = core.refresh_unread_for(&chat_id).await {
                debug!(chat_id = %chat_id, error = %e, "Unread refresh skipped");
            }
        });
    }

    /// Set `isRead` on a message and decrement the cached unread count.
    ///
    /// Overlapping calls for one message decrement at most once.
    pub async fn mark_as_read(&self, chat_id: &ChatId, message_id: &MessageId) -> Result<()> {
        let message = self
            .inner
            .repo
            .get_message(chat_id, message_id)
            .await?
            .ok_or_else(|| NotFound::Message(message_id.clone()))?;

        if !message.is_read && !self.inner.repo.mark_read(chat_id, message_id).await? {
            return Err(NotFound::Message(message_id.clone()).into());
        }

        let total = {
            let mut state = self.state();
            state.timeline.set_read(message_id);
            let counted = !message.is_read
                && state
                    .user
                    .as_ref()
                    .is_some_and(|user| user.id != message.sender_id)
                && state.read_marked.insert(message_id.clone());
            let decremented = match state.unread.get_mut(chat_id) {
                Some(count) if counted && *count > 0 => {
                    *count -= 1;
                    true
                }
                _ => false,
            };
            decremented.then(|| state.unread_total())
        };

        debug!(msg_id = %message_id, chat_id = %chat_id, "Message marked read");
        if let Some(total) = total {
            self.emit(SyncEvent::UnreadChanged { total });
        }
        Ok(())
    }

    /// The newest `limit` messages of a chat, oldest first.
    pub async fn chat_messages(&self, chat_id: &ChatId, limit: usize) -> Result<Vec<Message>> {
        self.get_chat(chat_id).await?;
        Ok(self.inner.repo.recent_messages(chat_id, limit).await?)
    }

    /// Page older history into the open chat. Returns how many messages were
    /// added; `0` when nothing is open or history is exhausted.
    pub async fn load_older_messages(&self, limit: usize) -> Result<usize> {
        let (chat_id, oldest, generation) = {
            let state = self.state();
            let Some(chat_id) = state.open_chat.clone() else {
                return Ok(0);
            };
            (chat_id, state.timeline.oldest().cloned(), state.open_generation)
        };

        let page = match &oldest {
            Some(oldest) => self.inner.repo.messages_before(&chat_id, oldest, limit).await?,
            None => self.inner.repo.recent_messages(&chat_id, limit).await?,
        };

        let added = {
            let mut state = self.state();
            if state.open_generation != generation {
                debug!(chat_id = %chat_id, "Discarding stale history page");
                return Ok(0);
            }
            state.timeline.extend(page)
        };

        if added > 0 {
            self.emit(SyncEvent::MessagesLoaded {
                chat_id,
                count: added,
            });
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{core_with_users, session_core, wait_for};
    use courier_shared::ErrorKind;
    use courier_store::{Fault, RemoteStore, StorePath};

    #[tokio::test]
    async fn test_send_validation() {
        let (store, core) = core_with_users(&["u1", "u2", "u3"]).await;
        let chat = core
            .create_chat("Team", &"u1".into(), ["u2".into()], true)
            .await
            .unwrap()
            .chat;

        let err = core.send_message(&chat.id, &"u1".into(), "Alice", "   ").await.unwrap_err();
        assert_eq!(err, ValidationError::EmptyContent.into());

        let writes = store.write_count();
        let err = core.send_message(&chat.id, &"u3".into(), "Carol", "hi").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.write_count(), writes);

        let err = core
            .send_message(&"missing".into(), &"u1".into(), "Alice", "hi")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_long_content_truncated() {
        let (_, core) = core_with_users(&["u1"]).await;
        let chat = core
            .create_chat("Solo", &"u1".into(), ["u1".into()], false)
            .await
            .unwrap()
            .chat;

        let long = "é".repeat(1500);
        let outcome = core.send_message(&chat.id, &"u1".into(), "Alice", &long).await.unwrap();
        assert!(outcome.is_delivered());
        assert_eq!(outcome.message().content.chars().count(), 1000);

        let stored = core.chat_messages(&chat.id, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        let chat = core.get_chat(&chat.id).await.unwrap();
        assert_eq!(chat.last_message_time, stored[0].timestamp);
    }

    #[tokio::test]
    async fn test_summary_failure_is_partial() {
        let (store, core) = core_with_users(&["u1"]).await;
        let chat = core
            .create_chat("Solo", &"u1".into(), ["u1".into()], false)
            .await
            .unwrap()
            .chat;
        store.inject_fault(Fault::on_writes(StorePath::chat(&chat.id).unwrap()));

        let outcome = core.send_message(&chat.id, &"u1".into(), "Alice", "hi").await.unwrap();
        match outcome {
            SendOutcome::PartialFailure { written, summary_error } => {
                assert_eq!(written.content, "hi");
                assert_eq!(summary_error.kind(), ErrorKind::Remote);
                let stored = core.repository().get_message(&chat.id, &written.id).await.unwrap();
                assert!(stored.is_some());
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chat_messages_for_deleted_chat() {
        let (_, core) = core_with_users(&["u1"]).await;
        let chat = core
            .create_chat("Solo", &"u1".into(), ["u1".into()], false)
            .await
            .unwrap()
            .chat;
        core.delete_chat(&chat.id).await.unwrap();
        let err = core.chat_messages(&chat.id, 50).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_incoming_message_from_other_marked_read() {
        let (_, core) = session_core("u1", &["u2"]).await;
        let chat = core
            .create_chat("Pair", &"u1".into(), ["u2".into()], false)
            .await
            .unwrap()
            .chat;
        core.select_chat(&chat.id).await.unwrap();

        let sent = core
            .send_message(&chat.id, &"u2".into(), "Bob", "hey")
            .await
            .unwrap()
            .into_message();
        assert_eq!(core.messages().len(), 1);

        let repo = core.repository().clone();
        let (chat_id, msg_id) = (chat.id.clone(), sent.id.clone());
        wait_for(|| {
            let repo = repo.clone();
            let (chat_id, msg_id) = (chat_id.clone(), msg_id.clone());
            async move {
                repo.get_message(&chat_id, &msg_id)
                    .await
                    .ok()
                    .flatten()
                    .is_some_and(|m| m.is_read)
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_load_older_messages_pages_backwards() {
        let (_, core) = session_core("u1", &[]).await;
        let chat = core
            .create_chat("Solo", &"u1".into(), ["u1".into()], false)
            .await
            .unwrap()
            .chat;
        for i in 0..5 {
            core.send_message(&chat.id, &"u1".into(), "Alice", &format!("m{i}"))
                .await
                .unwrap();
        }

        core.close_chat();
        assert_eq!(core.load_older_messages(2).await.unwrap(), 0);

        core.select_chat(&chat.id).await.unwrap();
        assert_eq!(core.messages().len(), 5);

        // Page size smaller than history: open with a fresh core view.
        core.close_chat();
        core.state().open_chat = Some(chat.id.clone());
        assert_eq!(core.load_older_messages(2).await.unwrap(), 2);
        assert_eq!(core.load_older_messages(2).await.unwrap(), 2);
        assert_eq!(core.load_older_messages(2).await.unwrap(), 1);
        assert_eq!(core.load_older_messages(2).await.unwrap(), 0);
        let texts: Vec<_> = core.messages().into_iter().map(|m| m.content).collect();
        assert_eq!(texts, ["m0", "m1", "m2", "m3", "m4"]);
    }

    /// Delegates to a memory store but yields before every call so
    /// concurrent operations interleave.
    struct YieldingStore(std::sync::Arc<courier_store::MemoryStore>);

    #[async_trait::async_trait]
    impl RemoteStore for YieldingStore {
        async fn get(&self, path: &StorePath) -> courier_store::Result<Option<courier_store::Record>> {
            tokio::task::yield_now().await;
            self.0.get(path).await
        }

        async fn get_all(
            &self,
            path: &StorePath,
        ) -> courier_store::Result<Vec<(String, courier_store::Record)>> {
            tokio::task::yield_now().await;
            self.0.get_all(path).await
        }

        async fn put(&self, path: &StorePath, record: courier_store::Record) -> courier_store::Result<()> {
            tokio::task::yield_now().await;
            self.0.put(path, record).await
        }

        async fn patch(&self, path: &StorePath, fields: courier_store::Record) -> courier_store::Result<()> {
            tokio::task::yield_now().await;
            self.0.patch(path, fields).await
        }

        async fn delete(&self, path: &StorePath) -> courier_store::Result<()> {
            tokio::task::yield_now().await;
            self.0.delete(path).await
        }

        async fn subscribe(&self, path: &StorePath) -> courier_store::Result<courier_store::Subscription> {
            tokio::task::yield_now().await;
            self.0.subscribe(path).await
        }
    }

    #[tokio::test]
    async fn test_overlapping_mark_as_read_decrements_once() {
        use std::sync::Arc;

        use crate::testing::seeded_store;
        use crate::{MemoryAuthProvider, SyncConfig};
        use courier_store::MemoryCredentialStore;

        let store = seeded_store(&["u1", "u2"]).await;
        let auth = Arc::new(MemoryAuthProvider::new(Arc::new(MemoryCredentialStore::new())));
        let core = ChatSyncCore::new(Arc::new(YieldingStore(store)), auth, SyncConfig::default());
        let me = core.get_user(&"u1".into()).await.unwrap();
        core.state().user = Some(me);

        let chat = core
            .create_chat("Pair", &"u1".into(), ["u2".into()], false)
            .await
            .unwrap()
            .chat;
        let mut sent = Vec::new();
        for text in ["one", "two", "three"] {
            let outcome = core.send_message(&chat.id, &"u2".into(), "Bob", text).await.unwrap();
            sent.push(outcome.into_message());
        }
        assert_eq!(core.unread_messages_count(&"u1".into()).await.unwrap(), 3);

        let (a, b) = tokio::join!(
            core.mark_as_read(&chat.id, &sent[0].id),
            core.mark_as_read(&chat.id, &sent[0].id),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(core.cached_unread(&chat.id), Some(2));
        assert_eq!(core.unread_messages_count(&"u1".into()).await.unwrap(), 2);
    }
}
