/// Application name
pub const APP_NAME: &str = "Courier";

/// Maximum message length in characters; longer content is truncated
pub const MAX_MESSAGE_LENGTH: usize = 1000;

/// Maximum chat name length in characters
pub const MAX_CHAT_NAME_LENGTH: usize = 50;

/// Username bounds (characters)
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 20;

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Number of messages loaded when a chat is opened
pub const DEFAULT_MESSAGE_PAGE_SIZE: usize = 50;

/// Per-chat window used by the legacy unread approximation
pub const LEGACY_UNREAD_WINDOW: usize = 100;

/// Capacity of the sync event broadcast channel
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Remote store root collections
pub const USERS_PATH: &str = "users";
pub const CHATS_PATH: &str = "chats";
pub const MESSAGES_PATH: &str = "messages";

/// Credential store keys
pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_ID_KEY: &str = "user_id";
pub const REMEMBER_ME_KEY: &str = "remember_me";
