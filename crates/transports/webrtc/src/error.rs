//! Error types for WebRTC negotiation

/// Result type alias using the negotiation Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating and running peer sessions
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A negotiation document referenced by id does not exist or carries
    /// no offer (e.g. joining an unknown room or call)
    #[error("Negotiation not found: {0}")]
    NegotiationNotFound(String),

    /// Operation attempted outside its valid session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The signaling store operation failed
    #[error("Signaling relay unavailable: {0}")]
    RelayUnavailable(String),

    /// The transport rejected a remote candidate
    #[error("Candidate apply failed: {0}")]
    CandidateApplyFailed(String),

    /// Peer not found in the room
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// Data channel error
    #[error("Data channel error: {0}")]
    DataChannelError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not occur in normal operation)
    #[error("Internal error: {0}")]
    InternalError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<peerlink_core::Error> for Error {
    fn from(err: peerlink_core::Error) -> Self {
        Error::RelayUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl Error {
    /// Check if this error should surface to the user (explicit lookup or
    /// usage failures, as opposed to degraded negotiation)
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Error::NegotiationNotFound(_) | Error::InvalidState(_) | Error::InvalidConfig(_)
        )
    }

    /// Check if this error is tolerated within a running session (the
    /// session continues, degraded)
    pub fn is_tolerated(&self) -> bool {
        matches!(self, Error::CandidateApplyFailed(_))
    }
}
