//! The [`ChatSyncCore`] handle.
//!
//! Operations live in the `commands` modules and in `bridge.rs`; this file
//! holds the shared plumbing and read-only snapshots for the presentation
//! layer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use courier_shared::{ChatId, SyncError, UserId};
use courier_store::{ChatRoom, Message, RemoteStore, Repository, User};

use crate::auth::AuthProvider;
use crate::config::SyncConfig;
use crate::events::{emit_event, SyncEvent};
use crate::state::{FailedSend, SyncState};
use crate::subscriptions::SubscriptionKey;

pub(crate) struct Inner {
    pub(crate) repo: Repository,
    pub(crate) auth: Arc<dyn AuthProvider>,
    pub(crate) config: SyncConfig,
    pub(crate) state: Mutex<SyncState>,
    pub(crate) events: broadcast::Sender<SyncEvent>,
    pub(crate) session_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let task = self
            .session_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

/// Cheap-to-clone handle to the chat synchronization core of one client.
#[derive(Clone)]
pub struct ChatSyncCore {
    pub(crate) inner: Arc<Inner>,
}

/// Non-owning handle held by background tasks so they do not keep the core
/// alive.
#[derive(Clone)]
pub(crate) struct WeakCore(Weak<Inner>);

impl WeakCore {
    pub(crate) fn upgrade(&self) -> Option<ChatSyncCore> {
        self.0.upgrade().map(|inner| ChatSyncCore { inner })
    }
}

impl ChatSyncCore {
    pub fn new(store: Arc<dyn RemoteStore>, auth: Arc<dyn AuthProvider>, config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            inner: Arc::new(Inner {
                repo: Repository::new(store),
                auth,
                config,
                state: Mutex::new(SyncState::new()),
                events,
                session_task: Mutex::new(None),
            }),
        }
    }

    /// Receive [`SyncEvent`]s from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn repository(&self) -> &Repository {
        &self.inner.repo
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.inner.auth
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    /// Lock the local state. A panic while holding the lock cannot leave the
    /// collections half-updated, so poisoning is ignored.
    pub(crate) fn state(&self) -> MutexGuard<'_, SyncState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        emit_event(&self.inner.events, event);
    }

    pub(crate) fn downgrade(&self) -> WeakCore {
        WeakCore(Arc::downgrade(&self.inner))
    }

    pub(crate) fn session_user(&self) -> Result<User, SyncError> {
        self.state().user.clone().ok_or(SyncError::NoSession)
    }

    pub(crate) fn local_user_id(&self) -> Option<UserId> {
        self.state().user_id()
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// The session user, as last written by the core.
    pub fn current_user(&self) -> Option<User> {
        self.state().user.clone()
    }

    /// The session user's chats, newest activity first.
    pub fn chats(&self) -> Vec<ChatRoom> {
        self.state().chats.as_slice().to_vec()
    }

    pub fn cached_chat(&self, chat_id: &ChatId) -> Option<ChatRoom> {
        self.state().chats.get(chat_id).cloned()
    }

    pub fn open_chat(&self) -> Option<ChatId> {
        self.state().open_chat.clone()
    }

    /// Messages of the open chat, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.state().timeline.as_slice().to_vec()
    }

    pub fn failed_sends(&self) -> Vec<FailedSend> {
        self.state().failed_sends.values().cloned().collect()
    }

    /// Last computed unread total for the session user.
    pub fn unread_total(&self) -> usize {
        self.state().unread_total()
    }

    pub fn cached_unread(&self, chat_id: &ChatId) -> Option<usize> {
        self.state().unread.get(chat_id).copied()
    }

    pub fn is_subscribed(&self, key: &SubscriptionKey) -> bool {
        self.state().subscriptions.contains(key)
    }

    pub fn active_subscriptions(&self) -> Vec<SubscriptionKey> {
        self.state().subscriptions.keys().cloned().collect()
    }
}
