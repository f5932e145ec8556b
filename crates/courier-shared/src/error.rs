use thiserror::Error;

use crate::types::{ChatId, MessageId, UserId};

/// Top-level error surfaced by the sync core.
///
/// The variant split is stable so a presentation layer can pick wording per
/// [`ErrorKind`] without parsing messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFound),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("No active session")]
    NoSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Remote,
    Permission,
    Auth,
    NoSession,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::NotFound(_) => ErrorKind::NotFound,
            SyncError::Remote(_) => ErrorKind::Remote,
            SyncError::Permission(_) => ErrorKind::Permission,
            SyncError::Auth(_) => ErrorKind::Auth,
            SyncError::NoSession => ErrorKind::NoSession,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Chat name must not be empty")]
    EmptyName,

    #[error("Chat name exceeds {max} characters")]
    NameTooLong { max: usize },

    #[error("A chat needs at least one participant")]
    NoParticipants,

    #[error("User {user} is not a participant of chat {chat}")]
    NotParticipant { user: UserId, chat: ChatId },

    #[error("Message content must not be empty")]
    EmptyContent,

    #[error("No chat is open")]
    NoChatSelected,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    #[error("chat {0}")]
    Chat(ChatId),

    #[error("message {0}")]
    Message(MessageId),

    #[error("user {0}")]
    User(UserId),

    #[error("pending send {0}")]
    PendingSend(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An account with this email already exists")]
    EmailExists,

    #[error("Password is too weak")]
    WeakPassword,

    #[error("Too many attempts, try again later")]
    TooManyAttempts,

    #[error("No account for this email")]
    UserNotFound,

    #[error("Malformed email address")]
    InvalidEmail,

    #[error("Username must be 3-20 letters, digits or underscores")]
    InvalidUsername,

    #[error("Required field is empty: {0}")]
    MissingField(&'static str),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Backend error: {0}")]
    Backend(String),
}

impl AuthError {
    /// Map an identity-backend error code to a stable kind.
    ///
    /// Codes may carry a trailing explanation (`"WEAK_PASSWORD : Password
    /// should be at least 6 characters"`), so only the leading token is
    /// matched.
    pub fn from_backend_code(code: &str) -> Self {
        let token = code
            .split(|c: char| c == ':' || c.is_whitespace())
            .next()
            .unwrap_or_default();

        match token {
            "EMAIL_EXISTS" => AuthError::EmailExists,
            "WEAK_PASSWORD" => AuthError::WeakPassword,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::TooManyAttempts,
            "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => AuthError::InvalidCredentials,
            "EMAIL_NOT_FOUND" => AuthError::UserNotFound,
            "INVALID_EMAIL" => AuthError::InvalidEmail,
            _ => AuthError::Backend(code.to_string()),
        }
    }
}
