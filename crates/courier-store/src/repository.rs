//! Typed access to the remote store.
//!
//! [`Repository`] wraps an `Arc<dyn RemoteStore>` and exposes CRUD helpers
//! for every domain model. The helpers are split by model across
//! `users.rs`, `chats.rs` and `messages.rs`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::path::StorePath;
use crate::record::{from_record, to_record};
use crate::remote::RemoteStore;

#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn RemoteStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// The underlying store, for subscriptions and raw access.
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub(crate) async fn fetch<T: DeserializeOwned>(&self, path: &StorePath) -> Result<Option<T>> {
        match self.store.get(path).await? {
            Some(record) => Ok(Some(from_record(record)?)),
            None => Ok(None),
        }
    }

    /// Decode every child under `path`. Records that fail to decode are
    /// logged and skipped so one bad entry does not hide the rest.
    pub(crate) async fn fetch_all<T: DeserializeOwned>(&self, path: &StorePath) -> Result<Vec<T>> {
        let records = self.store.get_all(path).await?;
        let mut out = Vec::with_capacity(records.len());
        for (key, record) in records {
            match from_record(record) {
                Ok(value) => out.push(value),
                Err(e) => warn!(path = %path, key = %key, error = %e, "Skipping undecodable record"),
            }
        }
        Ok(out)
    }

    pub(crate) async fn store_model<T: Serialize>(&self, path: &StorePath, value: &T) -> Result<()> {
        self.store.put(path, to_record(value)?).await
    }
}
