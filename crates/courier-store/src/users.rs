//! CRUD operations for [`User`] records.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;

use courier_shared::{ChatId, UserId};

use crate::error::Result;
use crate::models::User;
use crate::path::StorePath;
use crate::record::Record;
use crate::repository::Repository;

impl Repository {
    pub async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        self.fetch(&StorePath::user(id)?).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.fetch_all(&StorePath::users()).await
    }

    /// Create or replace a user record.
    pub async fn put_user(&self, user: &User) -> Result<()> {
        self.store_model(&StorePath::user(&user.id)?, user).await
    }

    /// Write presence. Returns `false` if the user record does not exist.
    pub async fn update_user_status(
        &self,
        id: &UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<bool> {
        let path = StorePath::user(id)?;
        if self.store().get(&path).await?.is_none() {
            return Ok(false);
        }
        let fields = fields([
            ("isOnline", json!(is_online)),
            ("lastSeen", serde_json::to_value(last_seen)?),
        ]);
        self.store().patch(&path, fields).await?;
        debug!(user_id = %id, is_online, "Presence updated");
        Ok(true)
    }

    /// Add `chat_id` to the user's membership set. Returns `false` if the user
    /// record does not exist.
    pub async fn add_chat_membership(&self, user_id: &UserId, chat_id: &ChatId) -> Result<bool> {
        self.edit_membership(user_id, |ids| {
            ids.insert(chat_id.clone());
        })
        .await
    }

    /// Remove `chat_id` from the user's membership set. Returns `false` if the
    /// user record does not exist.
    pub async fn remove_chat_membership(&self, user_id: &UserId, chat_id: &ChatId) -> Result<bool> {
        self.edit_membership(user_id, |ids| {
            ids.remove(chat_id);
        })
        .await
    }

    async fn edit_membership(
        &self,
        user_id: &UserId,
        edit: impl FnOnce(&mut std::collections::BTreeSet<ChatId>),
    ) -> Result<bool> {
        let Some(mut user) = self.get_user(user_id).await? else {
            return Ok(false);
        };
        let before = user.chat_ids.clone();
        edit(&mut user.chat_ids);
        if user.chat_ids != before {
            let path = StorePath::user(user_id)?;
            let fields = fields([("chatIds", serde_json::to_value(&user.chat_ids)?)]);
            self.store().patch(&path, fields).await?;
        }
        Ok(true)
    }
}

pub(crate) fn fields<const N: usize>(entries: [(&str, Value); N]) -> Record {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::MemoryStore;

    fn repo() -> Repository {
        Repository::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_put_and_list_users() {
        let repo = repo();
        repo.put_user(&User::new("u1", "a@x.com", "alice")).await.unwrap();
        repo.put_user(&User::new("u2", "b@x.com", "bob")).await.unwrap();

        let users = repo.list_users().await.unwrap();
        assert_eq!(users.len(), 2);
        let alice = repo.get_user(&"u1".into()).await.unwrap().unwrap();
        assert_eq!(alice.display_name, "alice");
        assert!(repo.get_user(&"u3".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_membership_edits() {
        let repo = repo();
        let uid = UserId::from("u1");
        let chat = ChatId::from("c1");
        repo.put_user(&User::new("u1", "a@x.com", "alice")).await.unwrap();

        assert!(repo.add_chat_membership(&uid, &chat).await.unwrap());
        assert!(repo.add_chat_membership(&uid, &chat).await.unwrap());
        let user = repo.get_user(&uid).await.unwrap().unwrap();
        assert_eq!(user.chat_ids.len(), 1);

        assert!(repo.remove_chat_membership(&uid, &chat).await.unwrap());
        let user = repo.get_user(&uid).await.unwrap().unwrap();
        assert!(user.chat_ids.is_empty());

        assert!(!repo.add_chat_membership(&"ghost".into(), &chat).await.unwrap());
    }

    #[tokio::test]
    async fn test_presence_requires_existing_user() {
        let repo = repo();
        let uid = UserId::from("u1");
        let seen = Utc::now();
        assert!(!repo.update_user_status(&uid, true, seen).await.unwrap());
        assert!(repo.get_user(&uid).await.unwrap().is_none());

        repo.put_user(&User::new("u1", "a@x.com", "alice")).await.unwrap();
        assert!(repo.update_user_status(&uid, true, seen).await.unwrap());
        let user = repo.get_user(&uid).await.unwrap().unwrap();
        assert!(user.is_online);
        assert_eq!(user.last_seen, seen);
    }
}
