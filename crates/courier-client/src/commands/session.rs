//! Starting and ending the core session, and following the auth provider's
//! session stream.

use std::sync::PoisonError;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use courier_store::User;

use crate::auth::SessionState;
use crate::core::ChatSyncCore;
use crate::events::SyncEvent;
use crate::Result;

impl ChatSyncCore {
    /// Begin a session for `user`.
    ///
    /// Creates the user record on first sign-in, marks the user online,
    /// subscribes to their chats, loads the chat list and computes unread
    /// counts. Any previous session state is dropped first.
    pub async fn start_session(&self, user: User) -> Result<()> {
        let repo = &self.inner.repo;
        let mut session_user = match repo.get_user(&user.id).await? {
            Some(existing) => existing,
            None => {
                repo.put_user(&user).await?;
                info!(user_id = %user.id, "User record created");
                user
            }
        };

        let now = Utc::now();
        repo.update_user_status(&session_user.id, true, now).await?;
        session_user.is_online = true;
        session_user.last_seen = now;

        let user_id = session_user.id.clone();
        let disposed = {
            let mut state = self.state();
            let disposed = state.reset();
            state.user = Some(session_user);
            disposed
        };
        if disposed > 0 {
            debug!(disposed, "Previous session subscriptions disposed");
        }
        info!(user_id = %user_id, "Session started");
        self.emit(SyncEvent::SessionStarted {
            user_id: user_id.clone(),
        });

        // Subscribe first so nothing written during the load is missed.
        self.subscribe_to_user_chats(&user_id).await?;
        let mut chats = self.get_user_chats(&user_id).await?;
        let loaded = {
            let mut state = self.state();
            // A removal pushed while the snapshot was in flight wins.
            chats.retain(|chat| !state.removed_chats.contains(&chat.id));
            state.chats.merge(chats)
        };
        debug!(user_id = %user_id, loaded, "Chat list loaded");
        self.emit(SyncEvent::ChatsChanged);

        self.unread_messages_count(&user_id).await?;
        Ok(())
    }

    /// End the current session. Presence is cleared best-effort; every
    /// subscription is disposed and local state is wiped. Returns `false` if
    /// there was no session.
    pub async fn end_session(&self) -> bool {
        let Some(user) = self.current_user() else {
            return false;
        };

        if let Err(e) = self.update_user_status(&user.id, false).await {
            warn!(user_id = %user.id, error = %e, "Failed to clear presence");
        }

        let disposed = self.state().reset();
        info!(user_id = %user.id, disposed, "Session ended");
        self.emit(SyncEvent::SessionEnded);
        true
    }

    /// Follow an auth session stream: start a session on sign-in, end it on
    /// sign-out. Replaces any stream attached earlier.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach_session(&self, mut session: watch::Receiver<SessionState>) {
        let weak = self.downgrade();
        let task = tokio::spawn(async move {
            loop {
                let current = session.borrow_and_update().clone();
                let Some(core) = weak.upgrade() else {
                    break;
                };
                core.sync_with_session(current).await;
                drop(core);

                if session.changed().await.is_err() {
                    debug!("Session stream closed");
                    break;
                }
            }
        });

        let previous = self
            .inner
            .session_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn sync_with_session(&self, session: SessionState) {
        match session {
            SessionState::Authenticated(user) => {
                let same_user = self.local_user_id().as_ref() == Some(&user.id);
                if same_user {
                    // Profile edits re-publish the session; keep the
                    // presence fields we own.
                    let mut state = self.state();
                    if let Some(current) = state.user.as_mut() {
                        current.display_name = user.display_name;
                        current.photo_url = user.photo_url;
                    }
                    return;
                }
                let user_id = user.id.clone();
                if let Err(e) = self.start_session(user).await {
                    warn!(user_id = %user_id, error = %e, "Failed to start session");
                }
            }
            SessionState::Unauthenticated => {
                self.end_session().await;
            }
        }
    }
}
