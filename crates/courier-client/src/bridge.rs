//! Push-stream side of the core: subscriptions, their forwarding loops, and
//! switching the open chat.
//!
//! Every live subscription is a task that drains a store
//! [`Subscription`] and feeds decoded records into the same reconciliation
//! entry points the command path uses. The tasks hold a [`WeakCore`] so an
//! orphaned stream never keeps the core alive.

use tracing::{debug, info, trace, warn};

use courier_shared::{ChatId, MessageId, UserId};
use courier_store::{from_record, ChatRoom, Message, RecordEvent, RecordEventKind, StorePath, Subscription};

use crate::core::{ChatSyncCore, WeakCore};
use crate::events::SyncEvent;
use crate::subscriptions::SubscriptionKey;
use crate::Result;

impl ChatSyncCore {
    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Stream the messages of one chat into the open view. Replaces any
    /// existing stream for the same chat.
    pub async fn subscribe_to_chat_messages(&self, chat_id: &ChatId) -> Result<()> {
        let path = StorePath::messages(chat_id)?;
        let key = SubscriptionKey::ChatMessages(chat_id.clone());
        self.state().subscriptions.remove(&key);

        let subscription = self.inner.repo.store().subscribe(&path).await?;
        let task = tokio::spawn(forward_chat_messages(
            self.downgrade(),
            key.clone(),
            chat_id.clone(),
            subscription,
        ));
        self.state().subscriptions.insert(key, task);
        debug!(chat_id = %chat_id, "Subscribed to chat messages");
        Ok(())
    }

    /// Stream every chat record, keeping the ones `user_id` belongs to.
    pub async fn subscribe_to_user_chats(&self, user_id: &UserId) -> Result<()> {
        let key = SubscriptionKey::UserChats(user_id.clone());
        self.state().subscriptions.remove(&key);

        let subscription = self.inner.repo.store().subscribe(&StorePath::chats()).await?;
        let task = tokio::spawn(forward_user_chats(
            self.downgrade(),
            key.clone(),
            user_id.clone(),
            subscription,
        ));
        self.state().subscriptions.insert(key, task);
        debug!(user_id = %user_id, "Subscribed to user chats");
        Ok(())
    }

    /// `false` if there was no such subscription.
    pub fn unsubscribe_from_chat_messages(&self, chat_id: &ChatId) -> bool {
        self.state()
            .subscriptions
            .remove(&SubscriptionKey::ChatMessages(chat_id.clone()))
    }

    pub fn unsubscribe_from_user_chats(&self, user_id: &UserId) -> bool {
        self.state()
            .subscriptions
            .remove(&SubscriptionKey::UserChats(user_id.clone()))
    }

    /// Dispose every live stream. Returns how many there were.
    pub fn unsubscribe_all(&self) -> usize {
        let disposed = self.state().subscriptions.clear();
        info!(disposed, "All subscriptions disposed");
        disposed
    }

    // ------------------------------------------------------------------
    // Open chat
    // ------------------------------------------------------------------

    /// Make `chat_id` the open chat.
    ///
    /// The previous chat's stream is disposed before the new one is opened,
    /// and the stream is live before the newest page is fetched. A page that
    /// lands after the user moved on is dropped.
    pub async fn select_chat(&self, chat_id: &ChatId) -> Result<()> {
        self.get_chat(chat_id).await?;

        let (previous, generation) = {
            let mut state = self.state();
            let previous = state.close_open_chat();
            if let Some(prev) = &previous {
                state
                    .subscriptions
                    .remove(&SubscriptionKey::ChatMessages(prev.clone()));
            }
            state.open_chat = Some(chat_id.clone());
            (previous, state.open_generation)
        };
        if let Some(prev) = previous {
            self.emit(SyncEvent::ChatClosed { chat_id: prev });
        }

        if let Err(e) = self.subscribe_to_chat_messages(chat_id).await {
            self.abandon_open(chat_id, generation);
            return Err(e);
        }
        if self.is_stale(chat_id, generation) {
            return Ok(());
        }

        let page_size = self.inner.config.page_size;
        let page = match self.inner.repo.recent_messages(chat_id, page_size).await {
            Ok(page) => page,
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Loading first page failed");
                self.abandon_open(chat_id, generation);
                return Err(e.into());
            }
        };
        let loaded = {
            let mut state = self.state();
            if state.open_generation != generation {
                None
            } else {
                Some(state.timeline.extend(page))
            }
        };
        let Some(count) = loaded else {
            debug!(chat_id = %chat_id, "Discarding page for chat no longer open");
            return Ok(());
        };

        info!(chat_id = %chat_id, count, "Chat opened");
        self.emit(SyncEvent::ChatOpened {
            chat_id: chat_id.clone(),
        });
        self.emit(SyncEvent::MessagesLoaded {
            chat_id: chat_id.clone(),
            count,
        });
        Ok(())
    }

    /// Close the open chat and drop its stream. Returns the closed chat.
    pub fn close_chat(&self) -> Option<ChatId> {
        let closed = {
            let mut state = self.state();
            let closed = state.close_open_chat();
            if let Some(chat_id) = &closed {
                state
                    .subscriptions
                    .remove(&SubscriptionKey::ChatMessages(chat_id.clone()));
            }
            closed
        };
        if let Some(chat_id) = &closed {
            debug!(chat_id = %chat_id, "Chat closed");
            self.emit(SyncEvent::ChatClosed {
                chat_id: chat_id.clone(),
            });
        }
        closed
    }

    /// Undo a half-finished `select_chat`: the chat is closed and its stream
    /// dropped, unless another selection already took over.
    fn abandon_open(&self, chat_id: &ChatId, generation: u64) {
        let mut state = self.state();
        if state.open_generation != generation {
            return;
        }
        state.close_open_chat();
        state
            .subscriptions
            .remove(&SubscriptionKey::ChatMessages(chat_id.clone()));
    }

    /// The open chat changed while we were subscribing. Drop the stream we
    /// just opened unless the chat was reopened in the meantime.
    fn is_stale(&self, chat_id: &ChatId, generation: u64) -> bool {
        let mut state = self.state();
        if state.open_generation == generation {
            return false;
        }
        if state.open_chat.as_ref() != Some(chat_id) {
            state
                .subscriptions
                .remove(&SubscriptionKey::ChatMessages(chat_id.clone()));
        }
        debug!(chat_id = %chat_id, "Chat switch superseded");
        true
    }

    /// A forwarding loop ran out of events without being disposed.
    fn subscription_lost(&self, key: &SubscriptionKey, path: &StorePath) {
        warn!(key = %key, path = %path, "Subscription stream ended");
        self.emit(SyncEvent::SubscriptionLost {
            path: path.to_string(),
        });
        self.state().subscriptions.remove(key);
    }
}

// ---------------------------------------------------------------------------
// Forwarding loops
// ---------------------------------------------------------------------------

fn decode<T: serde::de::DeserializeOwned>(path: &StorePath, event: RecordEvent) -> Option<T> {
    let record = event.record?;
    match from_record(record) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path, key = %event.key, error = %e, "Skipping undecodable record");
            None
        }
    }
}

async fn forward_chat_messages(
    weak: WeakCore,
    key: SubscriptionKey,
    chat_id: ChatId,
    mut subscription: Subscription,
) {
    let path = subscription.path().clone();
    while let Some(event) = subscription.next().await {
        let Some(core) = weak.upgrade() else {
            return;
        };
        trace!(path = %path, key = %event.key, kind = ?event.kind, "Message event");
        match event.kind {
            RecordEventKind::Removed => {
                core.apply_message_removed(&chat_id, &MessageId::from(event.key.as_str()));
            }
            RecordEventKind::Added => {
                if let Some(message) = decode::<Message>(&path, event) {
                    core.apply_incoming_message(message);
                }
            }
            RecordEventKind::Changed => {
                if let Some(message) = decode::<Message>(&path, event) {
                    core.apply_message_changed(message);
                }
            }
        }
    }

    if let Some(core) = weak.upgrade() {
        core.subscription_lost(&key, &path);
    }
}

async fn forward_user_chats(
    weak: WeakCore,
    key: SubscriptionKey,
    user_id: UserId,
    mut subscription: Subscription,
) {
    let path = subscription.path().clone();
    while let Some(event) = subscription.next().await {
        let Some(core) = weak.upgrade() else {
            return;
        };
        trace!(path = %path, key = %event.key, kind = ?event.kind, "Chat event");
        if event.kind == RecordEventKind::Removed {
            core.apply_chat_removed(&ChatId::from(event.key.as_str()));
            continue;
        }
        let Some(chat) = decode::<ChatRoom>(&path, event) else {
            continue;
        };
        if !chat.has_participant(&user_id) {
            core.apply_chat_removed(&chat.id);
            continue;
        }

        let (advanced, tracked) = {
            let state = core.state();
            let advanced = state
                .chats
                .get(&chat.id)
                .map_or(true, |cached| chat.last_message_time > cached.last_message_time);
            (advanced, state.unread_tracked)
        };
        let chat_id = chat.id.clone();
        core.apply_incoming_chat_update(chat);
        if advanced && tracked {
            if let Err(e) = core.refresh_unread_for(&chat_id).await {
                debug!(chat_id = %chat_id, error = %e, "Unread refresh skipped");
            }
        }
    }

    if let Some(core) = weak.upgrade() {
        core.subscription_lost(&key, &path);
    }
}
