//! User records, presence and profile edits.

use chrono::Utc;
use tracing::{debug, info};

use courier_shared::{AuthError, NotFound, SyncError, UserId};
use courier_store::User;

use crate::core::ChatSyncCore;
use crate::Result;

impl ChatSyncCore {
    pub async fn get_user(&self, user_id: &UserId) -> Result<User> {
        self.inner
            .repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| NotFound::User(user_id.clone()).into())
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.inner.repo.list_users().await?)
    }

    /// Write a user record as-is, replacing any existing one.
    pub async fn create_user(&self, user: &User) -> Result<()> {
        self.inner.repo.put_user(user).await?;
        info!(user_id = %user.id, "User record written");
        Ok(())
    }

    /// Replace a user record. Refreshes the cached session user when it is
    /// the one being written.
    pub async fn update_user(&self, user: &User) -> Result<()> {
        self.inner.repo.put_user(user).await?;
        self.refresh_session_user(user);
        debug!(user_id = %user.id, "User record updated");
        Ok(())
    }

    /// Set presence and stamp `lastSeen` with the current time.
    pub async fn update_user_status(&self, user_id: &UserId, is_online: bool) -> Result<()> {
        let now = Utc::now();
        if !self.inner.repo.update_user_status(user_id, is_online, now).await? {
            return Err(NotFound::User(user_id.clone()).into());
        }
        let mut state = self.state();
        if let Some(user) = state.user.as_mut().filter(|u| &u.id == user_id) {
            user.is_online = is_online;
            user.last_seen = now;
        }
        Ok(())
    }

    /// Push a profile edit to the identity provider, then mirror the display
    /// name and photo into the user record.
    pub async fn update_profile(&self, profile: &User) -> Result<User> {
        if !self.inner.auth.update_profile(profile).await? {
            return Err(SyncError::Auth(AuthError::Backend(
                "profile update was not accepted".into(),
            )));
        }

        let mut user = match self.inner.repo.get_user(&profile.id).await? {
            Some(existing) => existing,
            None => profile.clone(),
        };
        user.display_name = profile.display_name.clone();
        user.photo_url = profile.photo_url.clone();
        self.inner.repo.put_user(&user).await?;

        self.refresh_session_user(&user);
        info!(user_id = %user.id, "Profile updated");
        Ok(user)
    }

    fn refresh_session_user(&self, user: &User) {
        let mut state = self.state();
        if let Some(current) = state.user.as_mut().filter(|u| u.id == user.id) {
            *current = user.clone();
        }
    }
}
