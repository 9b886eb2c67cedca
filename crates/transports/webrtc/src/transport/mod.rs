//! The peer transport capability
//!
//! The negotiation core consumes the point-to-point connection primitive
//! through [`PeerTransport`]: an object that can produce local
//! descriptions, accept remote descriptions and candidates, and carry data
//! channels. Asynchronous discoveries (local candidates, inbound channels,
//! channel lifecycle, messages) arrive on a single [`TransportEvent`]
//! stream handed to the transport at construction, so the session state
//! machine composes them by message passing instead of nested callbacks.
//!
//! [`rtc::RtcTransport`] is the production implementation over the
//! `webrtc` crate; the test suite ships a scripted mock.

pub mod rtc;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::signaling::{CandidateRecord, SessionDescription};
use crate::Result;

/// Sender half of a transport's event stream
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half of a transport's event stream
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Asynchronous notifications from a transport to its owning session
pub enum TransportEvent {
    /// A local network candidate was discovered and should be relayed
    LocalCandidate(CandidateRecord),

    /// The remote side created a data channel toward us
    InboundChannel(Arc<dyn DataChannel>),

    /// A data channel (created or received) reported open
    ChannelOpen {
        /// Label of the channel that opened
        label: String,
    },

    /// An application message arrived on a data channel
    ChannelMessage {
        /// Opaque message payload
        text: String,
    },

    /// A data channel reported closed
    ChannelClosed {
        /// Label of the channel that closed
        label: String,
    },

    /// The underlying connection closed or failed
    Closed,
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::LocalCandidate(record) => {
                f.debug_tuple("LocalCandidate").field(record).finish()
            }
            TransportEvent::InboundChannel(channel) => f
                .debug_tuple("InboundChannel")
                .field(&channel.label())
                .finish(),
            TransportEvent::ChannelOpen { label } => {
                f.debug_struct("ChannelOpen").field("label", label).finish()
            }
            TransportEvent::ChannelMessage { text } => f
                .debug_struct("ChannelMessage")
                .field("len", &text.len())
                .finish(),
            TransportEvent::ChannelClosed { label } => f
                .debug_struct("ChannelClosed")
                .field("label", label)
                .finish(),
            TransportEvent::Closed => f.write_str("Closed"),
        }
    }
}

/// A bidirectional application-message channel owned by one session
#[async_trait]
pub trait DataChannel: Send + Sync {
    /// The channel label
    fn label(&self) -> &str;

    /// Send an application-level text payload
    async fn send_text(&self, text: &str) -> Result<()>;
}

/// The connection primitive consumed by the negotiation core
///
/// One transport instance backs exactly one [`crate::PeerSession`]; it is
/// never shared. Descriptions returned by `create_offer`/`create_answer`
/// are already committed as the local description.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Produce and commit a local offer
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Apply `offer` as the remote description, then produce and commit a
    /// local answer
    async fn create_answer(&self, offer: &SessionDescription) -> Result<SessionDescription>;

    /// Apply a remote description (the counterpart's answer)
    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<()>;

    /// Whether a remote description has been applied
    async fn has_remote_description(&self) -> bool;

    /// Apply a remote candidate. Only valid once a remote description is
    /// set; callers are responsible for buffering until then.
    async fn add_remote_candidate(&self, record: &CandidateRecord) -> Result<()>;

    /// Create the outbound data channel
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>>;

    /// Tear down the connection
    async fn close(&self) -> Result<()>;
}

/// Creates one transport per peer session
///
/// The coordinator spawns a fresh transport for every negotiation (one per
/// joining peer in the room topology); `events` is the session's event
/// sink.
#[async_trait]
pub trait PeerTransportFactory: Send + Sync {
    /// Create a transport wired to `events`
    async fn create_transport(&self, events: TransportEventSender)
        -> Result<Arc<dyn PeerTransport>>;
}
