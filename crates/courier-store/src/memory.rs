//! In-process [`RemoteStore`] backed by a JSON tree.
//!
//! Behaves like the hosted backend for everything the sync core relies on:
//! records live at slash paths, deletes are recursive and prune empty
//! parents, and subscribers get one event per changed direct child. Faults
//! can be injected per path prefix to exercise failure handling.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::path::StorePath;
use crate::record::{Record, RecordEvent, RecordEventKind};
use crate::remote::{RemoteStore, Subscription};

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    Read,
    Write,
    Subscribe,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Unavailable,
    PermissionDenied,
}

/// A failure rule matched against every operation under `prefix`.
#[derive(Debug, Clone)]
pub struct Fault {
    op: FaultOp,
    prefix: StorePath,
    kind: FaultKind,
    remaining: Option<usize>,
}

impl Fault {
    pub fn on_writes(prefix: StorePath) -> Self {
        Self::new(FaultOp::Write, prefix)
    }

    pub fn on_reads(prefix: StorePath) -> Self {
        Self::new(FaultOp::Read, prefix)
    }

    pub fn on_subscribe(prefix: StorePath) -> Self {
        Self::new(FaultOp::Subscribe, prefix)
    }

    pub fn on_any(prefix: StorePath) -> Self {
        Self::new(FaultOp::Any, prefix)
    }

    fn new(op: FaultOp, prefix: StorePath) -> Self {
        Self {
            op,
            prefix,
            kind: FaultKind::Unavailable,
            remaining: None,
        }
    }

    /// Fail with a permission error instead of an availability error.
    pub fn denied(mut self) -> Self {
        self.kind = FaultKind::PermissionDenied;
        self
    }

    /// Only fire `n` times, then disarm.
    pub fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    fn matches(&self, op: FaultOp, path: &StorePath) -> bool {
        (self.op == FaultOp::Any || self.op == op) && self.prefix.contains(path)
    }

    fn to_error(&self, path: &StorePath) -> StoreError {
        match self.kind {
            FaultKind::Unavailable => StoreError::Unavailable(format!("injected fault at {path}")),
            FaultKind::PermissionDenied => StoreError::PermissionDenied(path.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

type Watchers = HashMap<StorePath, Vec<mpsc::UnboundedSender<RecordEvent>>>;

#[derive(Default)]
struct Inner {
    root: Record,
    watchers: Watchers,
    faults: Vec<Fault>,
}

impl Inner {
    fn check_fault(&mut self, op: FaultOp, path: &StorePath) -> Result<()> {
        let Some(idx) = self.faults.iter().position(|f| f.matches(op, path)) else {
            return Ok(());
        };
        let fault = &mut self.faults[idx];
        let err = fault.to_error(path);
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.faults.remove(idx);
            }
        }
        debug!(path = %path, op = ?op, error = %err, "Injected store fault");
        Err(err)
    }
}

/// Thread-safe in-memory realtime store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_fault(&self, fault: Fault) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.faults.push(fault);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.faults.clear();
        }
    }

    /// Number of live subscriptions on exactly `path`.
    pub fn subscriber_count(&self, path: &StorePath) -> usize {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .watchers
                    .get(path)
                    .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Successful writes (put, patch, delete) since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    fn read<T>(&self, path: &StorePath, f: impl FnOnce(&Record) -> T) -> Result<T> {
        let mut inner = self.lock()?;
        inner.check_fault(FaultOp::Read, path)?;
        Ok(f(&inner.root))
    }

    /// Apply a mutation and notify every subscriber whose children changed.
    fn write(&self, path: &StorePath, mutate: impl FnOnce(&mut Record)) -> Result<()> {
        let mut inner = self.lock()?;
        inner.check_fault(FaultOp::Write, path)?;

        let watched: Vec<StorePath> = inner
            .watchers
            .keys()
            .filter(|w| w.contains(path) || path.contains(w))
            .cloned()
            .collect();
        let before: Vec<_> = watched
            .iter()
            .map(|w| children_of(&inner.root, w))
            .collect();

        mutate(&mut inner.root);
        self.writes.fetch_add(1, Ordering::Relaxed);
        trace!(path = %path, "Store write applied");

        for (watch_path, before) in watched.into_iter().zip(before) {
            let after = children_of(&inner.root, &watch_path);
            let events = diff_children(&before, &after);
            if events.is_empty() {
                continue;
            }
            if let Some(senders) = inner.watchers.get_mut(&watch_path) {
                senders.retain(|tx| events.iter().all(|ev| tx.send(ev.clone()).is_ok()));
            }
        }
        inner.watchers.retain(|_, senders| !senders.is_empty());

        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Record>> {
        self.read(path, |root| {
            node(root, path).and_then(Value::as_object).cloned()
        })
    }

    async fn get_all(&self, path: &StorePath) -> Result<Vec<(String, Record)>> {
        self.read(path, |root| children_of(root, path).into_iter().collect())
    }

    async fn put(&self, path: &StorePath, record: Record) -> Result<()> {
        self.write(path, |root| {
            if record.is_empty() {
                remove_at(root, path.segments());
            } else {
                *node_mut(root, path) = Value::Object(record);
            }
        })
    }

    async fn patch(&self, path: &StorePath, fields: Record) -> Result<()> {
        self.write(path, |root| {
            let target = node_mut(root, path);
            if !target.is_object() {
                *target = Value::Object(Record::new());
            }
            let now_empty = match target {
                Value::Object(map) => {
                    for (key, value) in fields {
                        if value.is_null() {
                            map.remove(&key);
                        } else {
                            map.insert(key, value);
                        }
                    }
                    map.is_empty()
                }
                _ => false,
            };
            if now_empty {
                remove_at(root, path.segments());
            }
        })
    }

    async fn delete(&self, path: &StorePath) -> Result<()> {
        self.write(path, |root| remove_at(root, path.segments()))
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription> {
        let mut inner = self.lock()?;
        inner.check_fault(FaultOp::Subscribe, path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.watchers.entry(path.clone()).or_default().push(tx);
        debug!(path = %path, "Subscription opened");
        Ok(Subscription::new(path.clone(), rx))
    }
}

// ---------------------------------------------------------------------------
// Tree helpers
// ---------------------------------------------------------------------------

fn node<'a>(root: &'a Record, path: &StorePath) -> Option<&'a Value> {
    let (first, rest) = path.segments().split_first()?;
    let mut current = root.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Walk to `path`, creating (or overwriting non-object) intermediate nodes.
fn node_mut<'a>(root: &'a mut Record, path: &StorePath) -> &'a mut Value {
    let segments = path.segments();
    let mut map = root;
    for segment in &segments[..segments.len() - 1] {
        let entry = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Record::new()));
        if !entry.is_object() {
            *entry = Value::Object(Record::new());
        }
        map = match entry {
            Value::Object(child) => child,
            _ => unreachable!("entry was just made an object"),
        };
    }
    map.entry(path.key().to_string()).or_insert(Value::Null)
}

/// Remove the node at `segments`, pruning parents left empty.
fn remove_at(map: &mut Record, segments: &[String]) {
    match segments {
        [] => {}
        [last] => {
            map.remove(last);
        }
        [first, rest @ ..] => {
            if let Some(Value::Object(child)) = map.get_mut(first) {
                remove_at(child, rest);
                if child.is_empty() {
                    map.remove(first);
                }
            }
        }
    }
}

fn children_of(root: &Record, path: &StorePath) -> BTreeMap<String, Record> {
    node(root, path)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(key, value)| value.as_object().map(|obj| (key.clone(), obj.clone())))
                .collect()
        })
        .unwrap_or_default()
}

fn diff_children(
    before: &BTreeMap<String, Record>,
    after: &BTreeMap<String, Record>,
) -> Vec<RecordEvent> {
    let mut events = Vec::new();
    for (key, record) in after {
        let kind = match before.get(key) {
            None => RecordEventKind::Added,
            Some(old) if old != record => RecordEventKind::Changed,
            Some(_) => continue,
        };
        events.push(RecordEvent {
            key: key.clone(),
            kind,
            record: Some(record.clone()),
        });
    }
    for key in before.keys().filter(|k| !after.contains_key(*k)) {
        events.push(RecordEvent {
            key: key.clone(),
            kind: RecordEventKind::Removed,
            record: None,
        });
    }
    events
}
