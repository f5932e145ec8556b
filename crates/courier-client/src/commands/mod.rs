//! [`ChatSyncCore`](crate::ChatSyncCore) operations.
//!
//! Each sub-module adds an `impl ChatSyncCore` block for one domain. The
//! push-stream side lives in `crate::bridge`.

pub mod chats;
pub mod compose;
pub mod messaging;
pub mod search;
pub mod session;
pub mod users;
