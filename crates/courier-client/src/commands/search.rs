//! Derived views: user and message search, chat filtering, unread counts.

use std::collections::HashMap;

use futures::future::join_all;
use tracing::debug;

use courier_shared::{ChatId, UserId};
use courier_store::{ChatRoom, Message, User};

use crate::config::UnreadMode;
use crate::core::ChatSyncCore;
use crate::events::SyncEvent;
use crate::Result;

fn matches(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

impl ChatSyncCore {
    /// Case-insensitive match on username, display name or email over a fresh
    /// user fetch. A blank query matches nothing.
    pub async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut users: Vec<User> = self
            .inner
            .repo
            .list_users()
            .await?
            .into_iter()
            .filter(|u| {
                matches(&u.username, &needle)
                    || matches(&u.display_name, &needle)
                    || matches(&u.email, &needle)
            })
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    /// Case-insensitive content match within one chat, oldest first. A blank
    /// query matches nothing.
    pub async fn search_messages(&self, chat_id: &ChatId, query: &str) -> Result<Vec<Message>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        self.get_chat(chat_id).await?;
        Ok(self
            .inner
            .repo
            .list_messages(chat_id)
            .await?
            .into_iter()
            .filter(|m| matches(&m.content, &needle))
            .collect())
    }

    /// Filter the cached chat list by name. A blank query returns every chat.
    pub fn filter_chats(&self, query: &str) -> Vec<ChatRoom> {
        let needle = query.trim().to_lowercase();
        let state = self.state();
        state
            .chats
            .as_slice()
            .iter()
            .filter(|chat| needle.is_empty() || matches(&chat.name, &needle))
            .cloned()
            .collect()
    }

    /// Messages not authored by `user_id` and not yet read, across every
    /// chat the user belongs to.
    ///
    /// For the session user the per-chat counts are cached and then kept
    /// current by `mark_as_read` and incoming pushes.
    pub async fn unread_messages_count(&self, user_id: &UserId) -> Result<usize> {
        let chats = self.get_user_chats(user_id).await?;
        let counts = join_all(chats.iter().map(|chat| self.count_unread(&chat.id, user_id))).await;

        let mut per_chat = HashMap::with_capacity(chats.len());
        for (chat, count) in chats.iter().zip(counts) {
            per_chat.insert(chat.id.clone(), count?);
        }
        let mut total = per_chat.values().sum();

        let cached = {
            let mut state = self.state();
            if state.user_id().as_ref() == Some(user_id) {
                let removed = &state.removed_chats;
                per_chat.retain(|chat_id, _| !removed.contains(chat_id));
                total = per_chat.values().sum();
                state.unread = per_chat;
                state.unread_tracked = true;
                true
            } else {
                false
            }
        };
        debug!(user_id = %user_id, total, cached, "Unread messages counted");
        if cached {
            self.emit(SyncEvent::UnreadChanged { total });
        }
        Ok(total)
    }

    /// Recount one chat for the session user and update the cache.
    pub async fn refresh_unread_for(&self, chat_id: &ChatId) -> Result<usize> {
        let user = self.session_user()?;
        let count = self.count_unread(chat_id, &user.id).await?;
        let total = {
            let mut state = self.state();
            if state.user_id().as_ref() != Some(&user.id) {
                return Ok(count);
            }
            state.unread.insert(chat_id.clone(), count);
            state.unread_total()
        };
        self.emit(SyncEvent::UnreadChanged { total });
        Ok(count)
    }

    async fn count_unread(&self, chat_id: &ChatId, user_id: &UserId) -> Result<usize> {
        let messages = match self.inner.config.unread_mode {
            UnreadMode::Exact => self.inner.repo.list_messages(chat_id).await?,
            UnreadMode::Window(n) => self.inner.repo.recent_messages(chat_id, n).await?,
        };
        Ok(messages
            .iter()
            .filter(|m| &m.sender_id != user_id && !m.is_read)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{core_with_users, seeded_store};
    use crate::{ChatSyncCore, SyncConfig};
    use courier_store::MemoryCredentialStore;

    #[tokio::test]
    async fn test_search_users() {
        let (_, core) = core_with_users(&["alice", "bob", "alfred"]).await;
        assert!(core.search_users("   ").await.unwrap().is_empty());

        let hits: Vec<_> = core
            .search_users("AL")
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(hits, ["alfred", "alice"]);

        let by_email = core.search_users("bob@example").await.unwrap();
        assert_eq!(by_email.len(), 1);
    }

    #[tokio::test]
    async fn test_search_messages_and_filter_chats() {
        let (_, core) = crate::testing::session_core("u1", &[]).await;
        let u1 = UserId::from("u1");
        let team = core.create_chat("Team Rocket", &u1, [u1.clone()], true).await.unwrap().chat;
        core.create_chat("Family", &u1, [u1.clone()], true).await.unwrap();

        core.send_message(&team.id, &u1, "u1", "Launch at NOON").await.unwrap();
        core.send_message(&team.id, &u1, "u1", "lunch later").await.unwrap();

        let hits = core.search_messages(&team.id, "noon").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(core.search_messages(&team.id, "").await.unwrap().is_empty());

        assert_eq!(core.filter_chats("").len(), 2);
        let filtered = core.filter_chats("rock");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, team.id);
    }

    #[tokio::test]
    async fn test_window_mode_undercounts() {
        let store = seeded_store(&["u1", "u2"]).await;
        let auth = Arc::new(crate::MemoryAuthProvider::new(Arc::new(MemoryCredentialStore::new())));
        let config = SyncConfig {
            unread_mode: UnreadMode::Window(2),
            ..SyncConfig::default()
        };
        let core = ChatSyncCore::new(store, auth, config);

        let chat = core
            .create_chat("Pair", &"u1".into(), ["u2".into()], false)
            .await
            .unwrap()
            .chat;
        for i in 0..4 {
            core.send_message(&chat.id, &"u2".into(), "Bob", &format!("m{i}"))
                .await
                .unwrap();
        }
        core.send_message(&chat.id, &"u1".into(), "Alice", "reply").await.unwrap();

        // Only the newest two are looked at, one of which is u1's own.
        assert_eq!(core.unread_messages_count(&"u1".into()).await.unwrap(), 1);
    }
}
