//! The remote realtime store contract.
//!
//! Implementations talk to a key-path database that supports point reads,
//! point writes, recursive deletes, and push subscriptions that fire for
//! every change to a direct child of the subscribed path.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::path::StorePath;
use crate::record::{Record, RecordEvent};

#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Read one record. `Ok(None)` if nothing is stored at `path`.
    async fn get(&self, path: &StorePath) -> Result<Option<Record>>;

    /// Read every child record under `path`, ordered by key.
    async fn get_all(&self, path: &StorePath) -> Result<Vec<(String, Record)>>;

    /// Replace the record at `path`.
    async fn put(&self, path: &StorePath, record: Record) -> Result<()>;

    /// Merge top-level fields into the record at `path`. A `null` value
    /// removes the field.
    async fn patch(&self, path: &StorePath, fields: Record) -> Result<()>;

    /// Remove `path` and everything below it.
    async fn delete(&self, path: &StorePath) -> Result<()>;

    /// Start receiving child events for `path`. Dropping the returned
    /// [`Subscription`] ends the stream.
    async fn subscribe(&self, path: &StorePath) -> Result<Subscription>;
}

/// A live push stream for one path.
#[derive(Debug)]
pub struct Subscription {
    path: StorePath,
    events: mpsc::UnboundedReceiver<RecordEvent>,
}

impl Subscription {
    pub fn new(path: StorePath, events: mpsc::UnboundedReceiver<RecordEvent>) -> Self {
        Self { path, events }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Wait for the next event. `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<RecordEvent> {
        self.events.recv().await
    }
}
