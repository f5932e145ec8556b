//! Chat lifecycle: create, membership changes, delete, and the chat-list
//! side of reconciliation.

use futures::future::join_all;
use tracing::{debug, info, warn};

use courier_shared::{ChatId, NotFound, SyncError, UserId, ValidationError};
use courier_store::ChatRoom;

use crate::core::ChatSyncCore;
use crate::events::SyncEvent;
use crate::outcome::{ChatWrite, FanoutReport, ParticipantUpdate};
use crate::subscriptions::SubscriptionKey;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Join,
    Leave,
}

impl ChatSyncCore {
    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_chat(&self, chat_id: &ChatId) -> Result<ChatRoom> {
        self.inner
            .repo
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| NotFound::Chat(chat_id.clone()).into())
    }

    /// Chats `user_id` participates in, newest activity first.
    pub async fn get_user_chats(&self, user_id: &UserId) -> Result<Vec<ChatRoom>> {
        let mut chats: Vec<ChatRoom> = self
            .inner
            .repo
            .list_chats()
            .await?
            .into_iter()
            .filter(|chat| chat.has_participant(user_id))
            .collect();
        chats.sort_by(|a, b| {
            b.last_message_time
                .cmp(&a.last_message_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(chats)
    }

    /// Reload the session user's chat list from the store.
    pub async fn refresh_chats(&self) -> Result<usize> {
        let user = self.session_user()?;
        let chats = self.get_user_chats(&user.id).await?;
        let count = chats.len();
        self.state().chats.replace_all(chats);
        self.emit(SyncEvent::ChatsChanged);
        debug!(count, "Chat list refreshed");
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub async fn create_chat(
        &self,
        name: &str,
        created_by: &UserId,
        participant_ids: impl IntoIterator<Item = UserId>,
        is_group_chat: bool,
    ) -> Result<ChatWrite> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        let max = self.inner.config.max_chat_name_length;
        if name.chars().count() > max {
            return Err(ValidationError::NameTooLong { max }.into());
        }
        let participants: Vec<UserId> = participant_ids.into_iter().collect();
        if participants.is_empty() {
            return Err(ValidationError::NoParticipants.into());
        }

        let chat = ChatRoom::new(name, created_by.clone(), participants, is_group_chat);
        self.inner.repo.put_chat(&chat).await?;
        info!(
            chat_id = %chat.id,
            participants = chat.participant_ids.len(),
            is_group_chat,
            "Chat created"
        );

        let membership = self
            .fan_out_membership(&chat.id, chat.participant_ids.iter().cloned(), Membership::Join)
            .await;
        self.reflect_chat(chat.clone());

        Ok(ChatWrite { chat, membership })
    }

    pub async fn add_participant(&self, chat_id: &ChatId, user_id: &UserId) -> Result<ParticipantUpdate> {
        let mut chat = self.get_chat(chat_id).await?;
        if !chat.add_participant(user_id.clone()) {
            return Ok(ParticipantUpdate::Unchanged(chat));
        }
        self.inner.repo.set_participants(chat_id, &chat.participant_ids).await?;
        info!(chat_id = %chat_id, user_id = %user_id, "Participant added");

        let membership = self
            .fan_out_membership(chat_id, [user_id.clone()], Membership::Join)
            .await;
        self.reflect_chat(chat.clone());

        Ok(ParticipantUpdate::Updated(ChatWrite { chat, membership }))
    }

    /// Removing the last participant deletes the chat and its messages.
    pub async fn remove_participant(&self, chat_id: &ChatId, user_id: &UserId) -> Result<ParticipantUpdate> {
        let mut chat = self.get_chat(chat_id).await?;
        if !chat.remove_participant(user_id) {
            return Ok(ParticipantUpdate::Unchanged(chat));
        }

        if chat.participant_ids.is_empty() {
            info!(chat_id = %chat_id, "Last participant left, deleting chat");
            let membership = self.delete_chat_cascade(chat_id, [user_id.clone()]).await?;
            return Ok(ParticipantUpdate::ChatDeleted {
                chat_id: chat_id.clone(),
                membership,
            });
        }

        self.inner.repo.set_participants(chat_id, &chat.participant_ids).await?;
        info!(chat_id = %chat_id, user_id = %user_id, "Participant removed");

        let membership = self
            .fan_out_membership(chat_id, [user_id.clone()], Membership::Leave)
            .await;
        self.reflect_chat(chat.clone());

        Ok(ParticipantUpdate::Updated(ChatWrite { chat, membership }))
    }

    /// Delete a chat, its messages, and every participant's membership entry.
    pub async fn delete_chat(&self, chat_id: &ChatId) -> Result<FanoutReport> {
        let chat = self.get_chat(chat_id).await?;
        self.delete_chat_cascade(chat_id, chat.participant_ids).await
    }

    async fn delete_chat_cascade(
        &self,
        chat_id: &ChatId,
        members: impl IntoIterator<Item = UserId>,
    ) -> Result<FanoutReport> {
        self.inner.repo.delete_messages(chat_id).await?;
        let membership = self
            .fan_out_membership(chat_id, members, Membership::Leave)
            .await;
        self.inner.repo.delete_chat_record(chat_id).await?;
        info!(
            chat_id = %chat_id,
            membership_failures = membership.failed.len(),
            "Chat deleted"
        );
        self.apply_chat_removed(chat_id);
        Ok(membership)
    }

    /// Update every user's `chatIds` concurrently. Failures are logged and
    /// reported, never returned.
    async fn fan_out_membership(
        &self,
        chat_id: &ChatId,
        users: impl IntoIterator<Item = UserId>,
        direction: Membership,
    ) -> FanoutReport {
        let repo = &self.inner.repo;
        let results = join_all(users.into_iter().map(|user_id| async move {
            let result = match direction {
                Membership::Join => repo.add_chat_membership(&user_id, chat_id).await,
                Membership::Leave => repo.remove_chat_membership(&user_id, chat_id).await,
            };
            (user_id, result)
        }))
        .await;

        let mut report = FanoutReport::default();
        for (user_id, result) in results {
            match result {
                Ok(true) => report.succeeded.push(user_id),
                Ok(false) => {
                    warn!(chat_id = %chat_id, user_id = %user_id, "Membership update skipped: no user record");
                    report.failed.push((user_id.clone(), NotFound::User(user_id).into()));
                }
                Err(e) => {
                    warn!(chat_id = %chat_id, user_id = %user_id, error = %e, "Membership update failed");
                    report.failed.push((user_id, SyncError::from(e)));
                }
            }
        }
        report
    }

    /// Mirror a chat we just wrote into the local list, or drop it if the
    /// session user is no longer a member.
    fn reflect_chat(&self, chat: ChatRoom) {
        let Some(user_id) = self.local_user_id() else {
            return;
        };
        if chat.has_participant(&user_id) {
            self.apply_incoming_chat_update(chat);
        } else {
            self.apply_chat_removed(&chat.id);
        }
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Upsert a chat by id and re-sort the list.
    pub fn apply_incoming_chat_update(&self, chat: ChatRoom) {
        let chat_id = chat.id.clone();
        {
            let mut state = self.state();
            state.removed_chats.remove(&chat_id);
            state.chats.upsert(chat);
        }
        debug!(chat_id = %chat_id, "Chat upserted");
        self.emit(SyncEvent::ChatsChanged);
    }

    /// Drop a chat that was deleted or that the session user left. Closes it
    /// if it was open. Returns `false` if it was not in the list.
    pub fn apply_chat_removed(&self, chat_id: &ChatId) -> bool {
        let (removed, closed, unread_total) = {
            let mut state = self.state();
            if state.user.is_some() {
                state.removed_chats.insert(chat_id.clone());
            }
            let removed = state.chats.remove(chat_id).is_some();
            let had_unread = state.unread.remove(chat_id).unwrap_or(0) > 0;
            let closed = if state.open_chat.as_ref() == Some(chat_id) {
                state
                    .subscriptions
                    .remove(&SubscriptionKey::ChatMessages(chat_id.clone()));
                state.close_open_chat()
            } else {
                None
            };
            (removed, closed, had_unread.then(|| state.unread_total()))
        };

        if let Some(chat_id) = closed {
            self.emit(SyncEvent::ChatClosed { chat_id });
        }
        if let Some(total) = unread_total {
            self.emit(SyncEvent::UnreadChanged { total });
        }
        if removed {
            info!(chat_id = %chat_id, "Chat removed from list");
            self.emit(SyncEvent::ChatRemoved {
                chat_id: chat_id.clone(),
            });
        }
        removed
    }
}
