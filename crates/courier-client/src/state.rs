//! Session state owned by [`ChatSyncCore`](crate::ChatSyncCore).
//!
//! The whole struct sits behind one `std::sync::Mutex`. Every mutation of
//! the local view goes through it and the guard is never held across an
//! `.await`.

use std::collections::{BTreeMap, HashMap, HashSet};

use courier_shared::{ChatId, MessageId, SyncError, UserId};
use courier_store::User;

use crate::reconcile::{ChatList, MessageTimeline};
use crate::subscriptions::SubscriptionManager;

/// A compose-buffer send that failed and can be retried.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedSend {
    pub token: u64,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub content: String,
    pub error: SyncError,
}

#[derive(Default)]
pub struct SyncState {
    /// The signed-in user. `None` outside a session.
    pub user: Option<User>,

    pub chats: ChatList,

    pub open_chat: Option<ChatId>,

    /// Messages of `open_chat`.
    pub timeline: MessageTimeline,

    /// Bumped whenever the open chat changes so late fetches can tell they
    /// are stale.
    pub open_generation: u64,

    pub draft: String,

    pub failed_sends: BTreeMap<u64, FailedSend>,

    pub next_send_token: u64,

    /// Unread count per chat for the session user.
    pub unread: HashMap<ChatId, usize>,

    /// `true` once `unread` has been computed for this session.
    pub unread_tracked: bool,

    /// Messages already deducted from `unread`. A second mark for the same
    /// id leaves the count alone.
    pub read_marked: HashSet<MessageId>,

    /// Chats removed by a push during this session. A snapshot fetched
    /// before the removal must not bring them back.
    pub removed_chats: HashSet<ChatId>,

    pub subscriptions: SubscriptionManager,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id.clone())
    }

    pub fn unread_total(&self) -> usize {
        self.unread.values().sum()
    }

    /// Forget the open chat and its messages.
    pub fn close_open_chat(&mut self) -> Option<ChatId> {
        let closed = self.open_chat.take();
        self.timeline.clear();
        self.open_generation += 1;
        closed
    }

    /// Drop everything tied to the session, disposing every subscription.
    /// Returns how many subscriptions were live.
    pub fn reset(&mut self) -> usize {
        let disposed = self.subscriptions.clear();
        self.user = None;
        self.chats.clear();
        self.close_open_chat();
        self.draft.clear();
        self.failed_sends.clear();
        self.unread.clear();
        self.unread_tracked = false;
        self.read_marked.clear();
        self.removed_chats.clear();
        disposed
    }
}
