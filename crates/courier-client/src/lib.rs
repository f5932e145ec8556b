//! Chat synchronization core for the Courier desktop client.
//!
//! [`ChatSyncCore`] keeps a local view (chat list, open chat, unread counts,
//! compose buffer) consistent with a realtime [`RemoteStore`](courier_store::RemoteStore)
//! in the presence of push notifications and the client's own writes. The
//! presentation layer reads snapshots from the core and listens for
//! [`SyncEvent`]s to know when to re-read.

pub mod auth;
mod bridge;
pub mod commands;
pub mod config;
mod core;
pub mod events;
pub mod outcome;
pub mod reconcile;
mod state;
pub mod subscriptions;

use tracing_subscriber::{fmt, EnvFilter};

pub use crate::auth::{AuthProvider, MemoryAuthProvider, SessionState};
pub use crate::config::{SyncConfig, UnreadMode};
pub use crate::core::ChatSyncCore;
pub use crate::events::SyncEvent;
pub use crate::outcome::{ChatWrite, FanoutReport, ParticipantUpdate, SendOutcome};
pub use crate::reconcile::{ChatList, MessageTimeline};
pub use crate::state::FailedSend;
pub use crate::subscriptions::SubscriptionKey;
pub use courier_shared::{ErrorKind, SyncError};

pub type Result<T> = std::result::Result<T, SyncError>;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to debug
/// output for this crate. Returns `false` if a global subscriber was already
/// set.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("courier_client=debug,courier_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok()
}
