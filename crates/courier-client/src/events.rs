//! Notifications from the sync core to the presentation layer.
//!
//! Events only say *what* changed; the adapter re-reads the relevant
//! snapshot (`chats()`, `messages()`, ...) from the core.

use tokio::sync::broadcast;

use courier_shared::{ChatId, MessageId, SyncError, UserId};

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    SessionStarted { user_id: UserId },
    SessionEnded,
    /// The chat list was reloaded, upserted or re-sorted.
    ChatsChanged,
    ChatRemoved { chat_id: ChatId },
    ChatOpened { chat_id: ChatId },
    ChatClosed { chat_id: ChatId },
    /// A page of history landed in the open chat.
    MessagesLoaded { chat_id: ChatId, count: usize },
    MessageAdded { chat_id: ChatId, message_id: MessageId },
    MessageRemoved { chat_id: ChatId, message_id: MessageId },
    UnreadChanged { total: usize },
    /// A compose-buffer send failed; `token` identifies it for retry or discard.
    SendFailed { token: u64, chat_id: ChatId, error: SyncError },
    /// A chat's live stream ended without being unsubscribed.
    SubscriptionLost { path: String },
}

impl SyncEvent {
    /// Stable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::SessionStarted { .. } => "session-started",
            SyncEvent::SessionEnded => "session-ended",
            SyncEvent::ChatsChanged => "chats-changed",
            SyncEvent::ChatRemoved { .. } => "chat-removed",
            SyncEvent::ChatOpened { .. } => "chat-opened",
            SyncEvent::ChatClosed { .. } => "chat-closed",
            SyncEvent::MessagesLoaded { .. } => "messages-loaded",
            SyncEvent::MessageAdded { .. } => "message-added",
            SyncEvent::MessageRemoved { .. } => "message-removed",
            SyncEvent::UnreadChanged { .. } => "unread-changed",
            SyncEvent::SendFailed { .. } => "send-failed",
            SyncEvent::SubscriptionLost { .. } => "subscription-lost",
        }
    }
}

/// Publish without caring whether anyone listens.
pub(crate) fn emit_event(tx: &broadcast::Sender<SyncEvent>, event: SyncEvent) {
    let name = event.name();
    if tx.send(event).is_err() {
        tracing::trace!(event = name, "No event listeners");
    }
}
