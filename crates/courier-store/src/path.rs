//! Slash-separated key paths into the remote store.
//!
//! Layout:
//! - `users/{user_id}`
//! - `chats/{chat_id}`
//! - `messages/{chat_id}/{message_id}`

use std::fmt;

use courier_shared::constants::{CHATS_PATH, MESSAGES_PATH, USERS_PATH};
use courier_shared::{ChatId, MessageId, UserId};

use crate::error::{Result, StoreError};

const RESERVED: &[char] = &['/', '.', '#', '$', '[', ']'];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// Parse `a/b/c`; leading and trailing slashes are ignored.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let mut out = Self { segments: Vec::new() };
        for segment in trimmed.split('/') {
            out = out.child(segment)?;
        }
        Ok(out)
    }

    /// Append one segment, rejecting empty or reserved-character segments.
    pub fn child(&self, segment: &str) -> Result<Self> {
        if segment.is_empty() || segment.contains(RESERVED) {
            return Err(StoreError::InvalidPath(format!("{self}/{segment}")));
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    pub fn users() -> Self {
        Self::root(USERS_PATH)
    }

    pub fn user(id: &UserId) -> Result<Self> {
        Self::users().child(id.as_str())
    }

    pub fn chats() -> Self {
        Self::root(CHATS_PATH)
    }

    pub fn chat(id: &ChatId) -> Result<Self> {
        Self::chats().child(id.as_str())
    }

    pub fn messages(chat_id: &ChatId) -> Result<Self> {
        Self::root(MESSAGES_PATH).child(chat_id.as_str())
    }

    pub fn message(chat_id: &ChatId, id: &MessageId) -> Result<Self> {
        Self::messages(chat_id)?.child(id.as_str())
    }

    fn root(name: &str) -> Self {
        Self {
            segments: vec![name.to_string()],
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment.
    pub fn key(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// `true` if `self` equals `other` or is one of its ancestors.
    pub fn contains(&self, other: &StorePath) -> bool {
        other.segments.len() >= self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}
