//! In-memory signaling store
//!
//! A complete in-process implementation of [`SignalingStore`], used by the
//! test harness and by same-process topologies (e.g. negotiating between
//! two transports inside one binary). Delivery semantics deliberately match
//! the hosted stores this crate abstracts over: subscriptions replay
//! current contents as `Added`, and deliveries are at-least-once hints, not
//! exactly-once events.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;
use crate::store::{
    ChangeKind, CollectionPath, DocumentChange, DocumentPath, SignalingStore, Subscription,
};

struct DocEntry {
    value: Value,
    /// Append order within the store; replay on subscribe follows it.
    seq: u64,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<String, DocEntry>,
    doc_subs: HashMap<String, Vec<(u64, mpsc::UnboundedSender<Value>)>>,
    coll_subs: HashMap<String, Vec<(u64, mpsc::UnboundedSender<DocumentChange>)>>,
    next_sub: u64,
    next_seq: u64,
}

impl Inner {
    fn notify(&mut self, path: &DocumentPath, value: &Value, kind: ChangeKind) {
        if let Some(sinks) = self.doc_subs.get_mut(path.as_str()) {
            sinks.retain(|(_, sink)| sink.send(value.clone()).is_ok());
        }
        if let Some(sinks) = self.coll_subs.get_mut(path.parent().as_str()) {
            sinks.retain(|(_, sink)| {
                sink.send(DocumentChange {
                    kind,
                    path: path.clone(),
                    value: value.clone(),
                })
                .is_ok()
            });
        }
    }

    /// Documents directly inside `collection`, in append order
    fn collection_members(&self, collection: &CollectionPath) -> Vec<(DocumentPath, Value, u64)> {
        let prefix = format!("{}/", collection.as_str());
        let mut members: Vec<_> = self
            .documents
            .iter()
            .filter(|(path, _)| {
                path.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains('/'))
            })
            .map(|(path, entry)| {
                (
                    collection.doc(&path[prefix.len()..]),
                    entry.value.clone(),
                    entry.seq,
                )
            })
            .collect();
        members.sort_by_key(|(_, _, seq)| *seq);
        members
    }
}

/// In-process [`SignalingStore`] implementation
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-deliver every document of `collection` to current subscribers as
    /// `Added`, simulating the at-least-once delivery of a real backend.
    /// Test-facing: consumers must already tolerate this.
    pub fn replay_collection(&self, collection: &CollectionPath) {
        let mut inner = self.inner.lock();
        let members = inner.collection_members(collection);
        debug!(
            collection = %collection,
            count = members.len(),
            "replaying collection to subscribers"
        );
        if let Some(sinks) = inner.coll_subs.get_mut(collection.as_str()) {
            for (path, value, _) in members {
                sinks.retain(|(_, sink)| {
                    sink.send(DocumentChange {
                        kind: ChangeKind::Added,
                        path: path.clone(),
                        value: value.clone(),
                    })
                    .is_ok()
                });
            }
        }
    }

    /// Re-deliver the current value of `path` to document subscribers,
    /// simulating a duplicate change notification.
    pub fn replay_document(&self, path: &DocumentPath) {
        let mut inner = self.inner.lock();
        let Some(value) = inner.documents.get(path.as_str()).map(|e| e.value.clone()) else {
            return;
        };
        if let Some(sinks) = inner.doc_subs.get_mut(path.as_str()) {
            sinks.retain(|(_, sink)| sink.send(value.clone()).is_ok());
        }
    }

    /// Paths of all documents currently in the store, in append order
    pub fn document_paths(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut paths: Vec<_> = inner
            .documents
            .iter()
            .map(|(path, entry)| (entry.seq, path.clone()))
            .collect();
        paths.sort();
        paths.into_iter().map(|(_, path)| path).collect()
    }

    fn write(&self, path: &DocumentPath, value: Value, merge: bool) {
        let mut inner = self.inner.lock();
        let (value, kind) = match inner.documents.get(path.as_str()) {
            Some(existing) if merge => {
                let mut merged = existing.value.clone();
                merge_into(&mut merged, value);
                (merged, ChangeKind::Modified)
            }
            Some(_) => (value, ChangeKind::Modified),
            None => (value, ChangeKind::Added),
        };
        let seq = match inner.documents.get(path.as_str()) {
            Some(existing) => existing.seq,
            None => {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                seq
            }
        };
        inner.documents.insert(
            path.as_str().to_string(),
            DocEntry {
                value: value.clone(),
                seq,
            },
        );
        inner.notify(path, &value, kind);
    }
}

/// Shallow merge: top-level fields of `partial` replace fields of `base`
fn merge_into(base: &mut Value, partial: Value) {
    match (base, partial) {
        (Value::Object(base), Value::Object(partial)) => {
            for (key, value) in partial {
                base.insert(key, value);
            }
        }
        (base, partial) => *base = partial,
    }
}

#[async_trait]
impl SignalingStore for MemoryStore {
    async fn create_document(
        &self,
        collection: &CollectionPath,
        value: Value,
    ) -> Result<DocumentPath> {
        let path = collection.doc(uuid::Uuid::new_v4().simple().to_string());
        debug!(path = %path, "creating document");
        self.write(&path, value, false);
        Ok(path)
    }

    async fn set_document(&self, path: &DocumentPath, value: Value) -> Result<()> {
        debug!(path = %path, "setting document");
        self.write(path, value, false);
        Ok(())
    }

    async fn update_document(&self, path: &DocumentPath, partial: Value) -> Result<()> {
        debug!(path = %path, "updating document");
        self.write(path, partial, true);
        Ok(())
    }

    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Value>> {
        let inner = self.inner.lock();
        Ok(inner.documents.get(path.as_str()).map(|e| e.value.clone()))
    }

    async fn subscribe_document(
        &self,
        path: &DocumentPath,
        sink: mpsc::UnboundedSender<Value>,
    ) -> Result<Subscription> {
        let mut inner = self.inner.lock();
        let id = inner.next_sub;
        inner.next_sub += 1;

        // Replay the current value so a late subscriber misses nothing.
        if let Some(entry) = inner.documents.get(path.as_str()) {
            let _ = sink.send(entry.value.clone());
        }
        inner
            .doc_subs
            .entry(path.as_str().to_string())
            .or_default()
            .push((id, sink));

        let store = self.inner.clone();
        let key = path.as_str().to_string();
        Ok(Subscription::new(move || {
            let mut inner = store.lock();
            if let Some(sinks) = inner.doc_subs.get_mut(&key) {
                sinks.retain(|(sub_id, _)| *sub_id != id);
            }
        }))
    }

    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
        sink: mpsc::UnboundedSender<DocumentChange>,
    ) -> Result<Subscription> {
        let mut inner = self.inner.lock();
        let id = inner.next_sub;
        inner.next_sub += 1;

        for (doc_path, value, _) in inner.collection_members(path) {
            let _ = sink.send(DocumentChange {
                kind: ChangeKind::Added,
                path: doc_path,
                value,
            });
        }
        inner
            .coll_subs
            .entry(path.as_str().to_string())
            .or_default()
            .push((id, sink));

        let store = self.inner.clone();
        let key = path.as_str().to_string();
        Ok(Subscription::new(move || {
            let mut inner = store.lock();
            if let Some(sinks) = inner.coll_subs.get_mut(&key) {
                sinks.retain(|(sub_id, _)| *sub_id != id);
            }
        }))
    }
}
