//! Configuration types for WebRTC negotiation

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default data channel label, matching the deployed wire behavior
pub const DEFAULT_CHANNEL_LABEL: &str = "sendDataChannel";

/// Main configuration for peer negotiation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// ICE candidate pool size passed to the transport (default: 10)
    pub ice_candidate_pool_size: u8,

    /// Label used for the outbound data channel
    pub channel_label: String,

    /// Optional negotiation deadline. A session that has not reached
    /// `Open` within this duration transitions to the terminal `Failed`
    /// state and releases its subscriptions. `None` (the default) waits
    /// indefinitely, matching human-paced signaling.
    pub negotiation_timeout: Option<Duration>,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun1.l.google.com:19302".to_string(),
                "stun:stun2.l.google.com:19302".to_string(),
            ],
            turn_servers: Vec::new(),
            ice_candidate_pool_size: 10,
            channel_label: DEFAULT_CHANNEL_LABEL.to_string(),
            negotiation_timeout: None,
        }
    }
}

impl NegotiationConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if no STUN server is configured, a TURN
    /// server is missing credentials, or the channel label is empty.
    pub fn validate(&self) -> Result<()> {
        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one STUN server is required".to_string(),
            ));
        }

        for turn in &self.turn_servers {
            if turn.url.is_empty() {
                return Err(Error::InvalidConfig(
                    "TURN server URL cannot be empty".to_string(),
                ));
            }
            if turn.username.is_empty() || turn.credential.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "TURN server {} requires username and credential",
                    turn.url
                )));
            }
        }

        if self.channel_label.is_empty() {
            return Err(Error::InvalidConfig(
                "data channel label cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
