//! Sync core configuration loaded from environment variables.
//!
//! Every setting has a default, so an embedder can start with zero
//! configuration.

use courier_shared::constants::{
    DEFAULT_EVENT_BUFFER, DEFAULT_MESSAGE_PAGE_SIZE, LEGACY_UNREAD_WINDOW, MAX_CHAT_NAME_LENGTH,
    MAX_MESSAGE_LENGTH,
};

/// How `unread_messages_count` counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadMode {
    /// Scan every message of every chat.
    Exact,
    /// Only look at the newest `n` messages per chat. Undercounts once a
    /// chat has more than `n` unread messages.
    Window(usize),
}

impl UnreadMode {
    /// The fixed per-chat window older clients counted with.
    pub fn legacy() -> Self {
        Self::Window(LEGACY_UNREAD_WINDOW)
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Messages fetched when a chat is opened and per older-history page.
    /// Env: `COURIER_PAGE_SIZE`
    /// Default: `50`
    pub page_size: usize,

    /// Outgoing content is cut to this many characters.
    /// Env: `COURIER_MAX_MESSAGE_LEN`
    /// Default: `1000`
    pub max_message_length: usize,

    /// Env: `COURIER_MAX_CHAT_NAME_LEN`
    /// Default: `50`
    pub max_chat_name_length: usize,

    /// Env: `COURIER_UNREAD_WINDOW` (`0` or unset = exact, `legacy` =
    /// [`UnreadMode::legacy`])
    /// Default: [`UnreadMode::Exact`]
    pub unread_mode: UnreadMode,

    /// Capacity of the [`SyncEvent`](crate::events::SyncEvent) broadcast channel.
    /// Env: `COURIER_EVENT_BUFFER`
    /// Default: `256`
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_MESSAGE_PAGE_SIZE,
            max_message_length: MAX_MESSAGE_LENGTH,
            max_chat_name_length: MAX_CHAT_NAME_LENGTH,
            unread_mode: UnreadMode::Exact,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(n) = positive(&lookup, "COURIER_PAGE_SIZE") {
            config.page_size = n;
        }
        if let Some(n) = positive(&lookup, "COURIER_MAX_MESSAGE_LEN") {
            config.max_message_length = n;
        }
        if let Some(n) = positive(&lookup, "COURIER_MAX_CHAT_NAME_LEN") {
            config.max_chat_name_length = n;
        }
        if let Some(n) = positive(&lookup, "COURIER_EVENT_BUFFER") {
            config.event_buffer = n;
        }

        if let Some(raw) = lookup("COURIER_UNREAD_WINDOW") {
            match raw.trim().parse::<usize>() {
                _ if raw.trim().eq_ignore_ascii_case("legacy") => {
                    config.unread_mode = UnreadMode::legacy();
                }
                Ok(0) => config.unread_mode = UnreadMode::Exact,
                Ok(n) => config.unread_mode = UnreadMode::Window(n),
                Err(_) => {
                    tracing::warn!(value = %raw, "Invalid COURIER_UNREAD_WINDOW, using exact count");
                }
            }
        }

        config
    }
}

fn positive(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<usize> {
    let raw = lookup(name)?;
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(var = name, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> SyncConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_map(&[]);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.max_message_length, 1000);
        assert_eq!(config.max_chat_name_length, 50);
        assert_eq!(config.unread_mode, UnreadMode::Exact);
        assert_eq!(config.event_buffer, 256);
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("COURIER_PAGE_SIZE", "20"),
            ("COURIER_MAX_MESSAGE_LEN", " 500 "),
            ("COURIER_UNREAD_WINDOW", "100"),
        ]);
        assert_eq!(config.page_size, 20);
        assert_eq!(config.max_message_length, 500);
        assert_eq!(config.unread_mode, UnreadMode::Window(100));
    }

    #[test]
    fn test_legacy_unread_window() {
        let config = from_map(&[("COURIER_UNREAD_WINDOW", "Legacy")]);
        assert_eq!(config.unread_mode, UnreadMode::Window(100));
        assert_eq!(UnreadMode::legacy(), UnreadMode::Window(100));
    }

    #[test]
    fn test_invalid_values_ignored() {
        let config = from_map(&[
            ("COURIER_PAGE_SIZE", "0"),
            ("COURIER_EVENT_BUFFER", "lots"),
            ("COURIER_UNREAD_WINDOW", "-1"),
        ]);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.event_buffer, 256);
        assert_eq!(config.unread_mode, UnreadMode::Exact);
    }
}
