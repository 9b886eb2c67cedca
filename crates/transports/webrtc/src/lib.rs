//! WebRTC connection negotiation over a document-store signaling relay
//!
//! This crate bootstraps direct peer-to-peer data channels between
//! participants who cannot yet talk directly, by relaying session
//! descriptions and trickled ICE candidates through an asynchronous
//! document store. It covers two topologies: the one-to-one **call** (one
//! shared negotiation document) and the **room**, where a single host
//! negotiates independently with an arbitrary number of joining peers,
//! each under its own isolated sub-tree.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  ConnectionCoordinator                                    │
//! │  ├─ call: one PeerSession per side                        │
//! │  └─ room: RoomHost with one PeerSession per joiner        │
//! │       PeerSession                                         │
//! │       ├─ DescriptionExchange (offer/answer handshake)     │
//! │       ├─ CandidateRelay (trickle ICE, gated + buffered)   │
//! │       └─ PeerTransport + DataChannel (webrtc adapter)     │
//! │            ↕ events                 ↕ documents           │
//! │       transport callbacks      SignalingStore             │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use peerlink_core::MemoryStore;
//! use peerlink_webrtc::{ConnectionCoordinator, NegotiationConfig, RtcTransportFactory};
//!
//! # async fn example() -> peerlink_webrtc::Result<()> {
//! let config = NegotiationConfig::default();
//! let coordinator = ConnectionCoordinator::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(RtcTransportFactory::new(config.clone())),
//!     config,
//!     "local-identity",
//! )?;
//!
//! let (call_id, session) = coordinator.create_call().await?;
//! // hand `call_id` to the other party out of band; once they answer and
//! // the channel opens, `session.send("hello")` reaches them directly.
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod negotiation;
pub mod session;
pub mod signaling;
pub mod transport;

// Re-exports for the public API
pub use config::{NegotiationConfig, TurnServerConfig, DEFAULT_CHANNEL_LABEL};
pub use coordinator::{ConnectionCoordinator, RoomHost};
pub use error::{Error, Result};
pub use session::{PeerSession, SessionRole, SessionState};
pub use signaling::{CandidateRecord, SdpKind, SessionDescription};
pub use transport::rtc::{RtcTransport, RtcTransportFactory};
pub use transport::{
    DataChannel, PeerTransport, PeerTransportFactory, TransportEvent, TransportEventReceiver,
    TransportEventSender,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
