//! The signaling store capability
//!
//! The negotiation core never talks to a concrete document database; it
//! talks to [`SignalingStore`], a small capability trait modeled on the
//! store it must interoperate with: documents are JSON values addressed by
//! alternating `collection/document` path segments, collections support
//! appending documents with generated ids, and both documents and
//! collections support realtime change subscriptions.
//!
//! Subscription callbacks are *idempotent triggers*, not exactly-once
//! events: a change may be delivered more than once, and implementations
//! replay current contents on subscription so late subscribers miss
//! nothing. Consumers must tolerate both.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Path to a collection of documents (odd number of segments, e.g.
/// `rooms` or `rooms/abc/requests`).
///
/// Paths are built by alternating [`CollectionPath::doc`] and
/// [`DocumentPath::collection`], which makes an invalid segment count
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// A top-level collection
    pub fn root(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Path to a document inside this collection
    pub fn doc(&self, id: impl AsRef<str>) -> DocumentPath {
        DocumentPath(format!("{}/{}", self.0, id.as_ref()))
    }

    /// The raw slash-separated path
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path to a single document (even number of segments, e.g.
/// `rooms/abc` or `rooms/abc/players/p1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath(String);

impl DocumentPath {
    /// Path to a sub-collection nested under this document
    pub fn collection(&self, name: impl AsRef<str>) -> CollectionPath {
        CollectionPath(format!("{}/{}", self.0, name.as_ref()))
    }

    /// The document id (the final path segment)
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Path of the collection this document lives in
    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(self.0.clone()),
        }
    }

    /// The raw slash-separated path
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happened to a document within a watched collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Document appeared in the collection (or was replayed on subscribe)
    Added,
    /// Document value changed
    Modified,
    /// Document was removed
    Removed,
}

/// One entry of a collection change set
#[derive(Debug, Clone)]
pub struct DocumentChange {
    /// What happened
    pub kind: ChangeKind,
    /// Full path of the affected document
    pub path: DocumentPath,
    /// Document value at the time of the change
    pub value: Value,
}

/// Handle for an active change subscription
///
/// Cancels the subscription when dropped or when [`Subscription::cancel`]
/// is called explicitly. After cancellation the associated sink receives
/// no further deliveries.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a cancellation action into a handle
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel the subscription now
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Asynchronous document store used as the negotiation relay
///
/// All operations may complete in any order relative to local computation.
/// Implementations must deliver document values as they are at notification
/// time; consumers treat every delivery as a hint to re-examine state, never
/// as an exactly-once event.
#[async_trait]
pub trait SignalingStore: Send + Sync {
    /// Append a new document with a generated id to `collection`
    async fn create_document(
        &self,
        collection: &CollectionPath,
        value: Value,
    ) -> Result<DocumentPath>;

    /// Overwrite the document at `path` with `value`
    async fn set_document(&self, path: &DocumentPath, value: Value) -> Result<()>;

    /// Shallow-merge `partial` into the document at `path`, creating it if
    /// absent. Top-level fields of `partial` replace fields of the same
    /// name; other fields are preserved.
    async fn update_document(&self, path: &DocumentPath, partial: Value) -> Result<()>;

    /// Read the document at `path`, if present
    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Value>>;

    /// Watch a single document; the current value (if any) is replayed
    /// immediately, then every subsequent write is delivered.
    async fn subscribe_document(
        &self,
        path: &DocumentPath,
        sink: mpsc::UnboundedSender<Value>,
    ) -> Result<Subscription>;

    /// Watch a collection; existing documents are replayed as
    /// [`ChangeKind::Added`] in append order, then every subsequent change
    /// is delivered.
    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
        sink: mpsc::UnboundedSender<DocumentChange>,
    ) -> Result<Subscription>;
}
