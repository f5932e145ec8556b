//! Authentication contract consumed by the sync core.
//!
//! The provider owns identity; the core only reacts to the
//! [`SessionState`] values it publishes on a watch channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use courier_shared::constants::{AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, REMEMBER_ME_KEY, USER_ID_KEY};
use courier_shared::validation::{check_registration, is_valid_email};
use courier_shared::{AuthError, UserId};
use courier_store::{CredentialStore, User};

/// Failed logins per email before the provider starts refusing.
const MAX_FAILED_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated(User),
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            SessionState::Unauthenticated => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    async fn login(&self, email: &str, password: &str) -> Result<User, AuthError>;

    async fn register(&self, email: &str, username: &str, password: &str) -> Result<User, AuthError>;

    /// `false` if there was no session to end.
    async fn logout(&self) -> Result<bool, AuthError>;

    async fn reset_password(&self, email: &str) -> Result<bool, AuthError>;

    fn is_authenticated(&self) -> bool;

    fn current_user(&self) -> Option<User>;

    /// Push display name and photo to the identity backend.
    async fn update_profile(&self, user: &User) -> Result<bool, AuthError>;

    /// Session transitions, starting with the current state.
    fn session(&self) -> watch::Receiver<SessionState>;
}

// ---------------------------------------------------------------------------
// In-memory provider
// ---------------------------------------------------------------------------

struct Account {
    user: User,
    password: String,
    failed_attempts: u32,
}

#[derive(Default)]
struct Accounts {
    /// Keyed by lowercased email.
    by_email: HashMap<String, Account>,
    /// Issued identity token -> lowercased email.
    tokens: HashMap<String, String>,
}

/// Local identity provider. Persists the session token, user id and
/// "remember me" email through a [`CredentialStore`].
pub struct MemoryAuthProvider {
    accounts: Mutex<Accounts>,
    credentials: Arc<dyn CredentialStore>,
    session: watch::Sender<SessionState>,
    remember_me: AtomicBool,
}

impl MemoryAuthProvider {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        let (session, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            accounts: Mutex::new(Accounts::default()),
            credentials,
            session,
            remember_me: AtomicBool::new(false),
        }
    }

    /// Keep the email of the next successful login for the login form.
    pub fn set_remember_me(&self, remember: bool) {
        self.remember_me.store(remember, Ordering::Relaxed);
    }

    /// Email saved by a remembered login.
    pub fn remembered_email(&self) -> Result<Option<String>, AuthError> {
        self.credentials.get(REMEMBER_ME_KEY).map_err(backend)
    }

    /// Resume the session whose token is in the credential store.
    pub fn restore(&self) -> Result<Option<User>, AuthError> {
        let Some(token) = self.credentials.get(AUTH_TOKEN_KEY).map_err(backend)? else {
            return Ok(None);
        };
        let user = {
            let accounts = self.lock()?;
            accounts
                .tokens
                .get(&token)
                .and_then(|email| accounts.by_email.get(email))
                .map(|account| account.user.clone())
        };
        match user {
            Some(user) => {
                info!(user_id = %user.id, "Session restored");
                self.session.send_replace(SessionState::Authenticated(user.clone()));
                Ok(Some(user))
            }
            None => {
                debug!("Stored token is no longer valid");
                self.clear_credentials()?;
                Ok(None)
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Accounts>, AuthError> {
        self.accounts
            .lock()
            .map_err(|_| AuthError::Backend("account table poisoned".into()))
    }

    fn sign_in(&self, email: &str, user: User) -> Result<User, AuthError> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let refresh = uuid::Uuid::new_v4().simple().to_string();
        self.lock()?.tokens.insert(token.clone(), email.to_lowercase());

        self.credentials.set(AUTH_TOKEN_KEY, &token).map_err(backend)?;
        self.credentials.set(REFRESH_TOKEN_KEY, &refresh).map_err(backend)?;
        self.credentials.set(USER_ID_KEY, user.id.as_str()).map_err(backend)?;
        if self.remember_me.load(Ordering::Relaxed) {
            self.credentials.set(REMEMBER_ME_KEY, email).map_err(backend)?;
        } else {
            self.credentials.remove(REMEMBER_ME_KEY).map_err(backend)?;
        }

        self.session.send_replace(SessionState::Authenticated(user.clone()));
        info!(user_id = %user.id, "Signed in");
        Ok(user)
    }

    fn clear_credentials(&self) -> Result<(), AuthError> {
        for key in [AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_ID_KEY] {
            self.credentials.remove(key).map_err(backend)?;
        }
        Ok(())
    }
}

fn backend(err: impl std::fmt::Display) -> AuthError {
    AuthError::Backend(err.to_string())
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        if email.trim().is_empty() {
            return Err(AuthError::MissingField("email"));
        }
        if password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }
        let key = email.trim().to_lowercase();

        let user = {
            let mut accounts = self.lock()?;
            let account = accounts
                .by_email
                .get_mut(&key)
                .ok_or_else(|| AuthError::from_backend_code("EMAIL_NOT_FOUND"))?;
            if account.failed_attempts >= MAX_FAILED_ATTEMPTS {
                return Err(AuthError::from_backend_code("TOO_MANY_ATTEMPTS_TRY_LATER"));
            }
            if account.password != password {
                account.failed_attempts += 1;
                warn!(attempts = account.failed_attempts, "Login rejected");
                return Err(AuthError::from_backend_code("INVALID_PASSWORD"));
            }
            account.failed_attempts = 0;
            account.user.clone()
        };

        self.sign_in(&key, user)
    }

    async fn register(&self, email: &str, username: &str, password: &str) -> Result<User, AuthError> {
        check_registration(email, username, password)?;
        let key = email.trim().to_lowercase();

        let user = {
            let mut accounts = self.lock()?;
            if accounts.by_email.contains_key(&key) {
                return Err(AuthError::from_backend_code("EMAIL_EXISTS"));
            }
            let id = UserId::from(uuid::Uuid::new_v4().simple().to_string());
            let user = User::new(id, email.trim(), username);
            accounts.by_email.insert(
                key.clone(),
                Account {
                    user: user.clone(),
                    password: password.to_string(),
                    failed_attempts: 0,
                },
            );
            user
        };

        info!(user_id = %user.id, "Account registered");
        self.sign_in(&key, user)
    }

    async fn logout(&self) -> Result<bool, AuthError> {
        if !self.session.borrow().is_authenticated() {
            return Ok(false);
        }
        if let Some(token) = self.credentials.get(AUTH_TOKEN_KEY).map_err(backend)? {
            self.lock()?.tokens.remove(&token);
        }
        self.clear_credentials()?;
        self.session.send_replace(SessionState::Unauthenticated);
        info!("Signed out");
        Ok(true)
    }

    async fn reset_password(&self, email: &str) -> Result<bool, AuthError> {
        if !is_valid_email(email.trim()) {
            return Err(AuthError::InvalidEmail);
        }
        let accounts = self.lock()?;
        if !accounts.by_email.contains_key(&email.trim().to_lowercase()) {
            return Err(AuthError::from_backend_code("EMAIL_NOT_FOUND"));
        }
        debug!("Password reset requested");
        Ok(true)
    }

    fn is_authenticated(&self) -> bool {
        self.session.borrow().is_authenticated()
    }

    fn current_user(&self) -> Option<User> {
        self.session.borrow().user().cloned()
    }

    async fn update_profile(&self, user: &User) -> Result<bool, AuthError> {
        let current = self.current_user().ok_or(AuthError::NotAuthenticated)?;
        if current.id != user.id {
            return Err(AuthError::NotAuthenticated);
        }
        let updated = {
            let mut accounts = self.lock()?;
            let account = accounts
                .by_email
                .values_mut()
                .find(|a| a.user.id == user.id)
                .ok_or(AuthError::UserNotFound)?;
            account.user.display_name = user.display_name.clone();
            account.user.photo_url = user.photo_url.clone();
            account.user.clone()
        };
        self.session.send_replace(SessionState::Authenticated(updated));
        Ok(true)
    }

    fn session(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }
}
