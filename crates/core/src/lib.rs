//! Core abstractions for peerlink
//!
//! This crate holds the pieces of peerlink that are independent of any
//! particular connection transport:
//!
//! - **Signaling store capability** ([`SignalingStore`]): an asynchronous
//!   document store with change subscriptions, used as the relay medium for
//!   connection negotiation. Implementations adapt a concrete backend
//!   (a hosted document database, an in-process store, ...) to this trait.
//! - **In-memory store** ([`MemoryStore`]): a complete in-process
//!   implementation used by tests and same-process topologies.
//! - **Local identity** ([`IdentityStore`]): the persisted random identity
//!   string a participant presents when joining a room.
//!
//! Transport crates build the actual negotiation protocol on top of these
//! capabilities.

#![warn(clippy::all)]

pub mod error;
pub mod identity;
pub mod memory;
pub mod store;

pub use error::{Error, Result};
pub use identity::{generate_identity, IdentityStore, IDENTITY_LEN};
pub use memory::MemoryStore;
pub use store::{
    ChangeKind, CollectionPath, DocumentChange, DocumentPath, SignalingStore, Subscription,
};
