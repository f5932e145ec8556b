//! Results of writes that span more than one remote record.
//!
//! The backend has no multi-key transactions, so a write can land partly.
//! These types report exactly which parts did.

use courier_shared::{ChatId, SyncError, UserId};
use courier_store::{ChatRoom, Message};

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Message and chat summary both written.
    Delivered(Message),
    /// The message is persisted but the chat summary write failed.
    PartialFailure {
        written: Message,
        summary_error: SyncError,
    },
}

impl SendOutcome {
    pub fn message(&self) -> &Message {
        match self {
            SendOutcome::Delivered(message) => message,
            SendOutcome::PartialFailure { written, .. } => written,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            SendOutcome::Delivered(message) => message,
            SendOutcome::PartialFailure { written, .. } => written,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered(_))
    }
}

/// Per-user results of a best-effort membership fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanoutReport {
    pub succeeded: Vec<UserId>,
    pub failed: Vec<(UserId, SyncError)>,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_users(&self) -> impl Iterator<Item = &UserId> {
        self.failed.iter().map(|(user, _)| user)
    }
}

/// A created chat plus the membership fan-out that followed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatWrite {
    pub chat: ChatRoom,
    pub membership: FanoutReport,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParticipantUpdate {
    /// Participants changed and were written.
    Updated(ChatWrite),
    /// The user was already in (or already absent from) the chat.
    Unchanged(ChatRoom),
    /// The last participant left, so the chat and its messages are gone.
    ChatDeleted {
        chat_id: ChatId,
        membership: FanoutReport,
    },
}
