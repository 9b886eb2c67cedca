//! Signaling document shapes
//!
//! Field names are part of the deployed wire format and must not change:
//! descriptions serialize as `{"type", "sdp"}`, candidates pass through the
//! transport's native `{"candidate", "sdpMid", "sdpMLineIndex",
//! "usernameFragment"}` shape, and join requests carry `{"offer",
//! "playerID"}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Which half of the handshake a description belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// The initiating side's description
    Offer,
    /// The responding side's description
    Answer,
}

/// One side's session description, produced by the transport and published
/// once per negotiation direction. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Description kind
    #[serde(rename = "type")]
    pub kind: SdpKind,

    /// Opaque session string (SDP); never interpreted by this crate
    pub sdp: String,
}

impl SessionDescription {
    /// An offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// An answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// One discovered network path, in the transport's native JSON shape,
/// passed through opaquely. Appended to a candidate collection, never
/// mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// The candidate string
    pub candidate: String,

    /// SDP media stream identification
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,

    /// SDP media line index
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,

    /// ICE username fragment
    #[serde(rename = "usernameFragment", default)]
    pub username_fragment: Option<String>,
}

/// The shared document of a one-to-one call negotiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDocument {
    /// Call identifier (same as the document id)
    pub id: String,

    /// Published by the initiating side, never overwritten
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,

    /// Published at most once, by the responding side only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
}

/// A join request appended to a room's request collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// The joiner's offer
    pub offer: SessionDescription,

    /// The joiner's identity; keys the per-joiner negotiation sub-tree
    #[serde(rename = "playerID")]
    pub player_id: String,
}

/// The host's answer, appended to a joiner's response collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinResponse {
    /// The host's answer for this joiner
    pub answer: SessionDescription,
}

/// Extract the `answer` field of a document value, if present.
///
/// Used on call documents and join responses alike; both publish the
/// answer under the same field name.
pub fn answer_field(value: &Value) -> Result<Option<SessionDescription>> {
    match value.get("answer") {
        Some(answer) if !answer.is_null() => {
            let desc = serde_json::from_value(answer.clone())
                .map_err(|e| Error::SerializationError(format!("malformed answer: {}", e)))?;
            Ok(Some(desc))
        }
        _ => Ok(None),
    }
}

/// Extract the `offer` field of a document value, if present.
pub fn offer_field(value: &Value) -> Result<Option<SessionDescription>> {
    match value.get("offer") {
        Some(offer) if !offer.is_null() => {
            let desc = serde_json::from_value(offer.clone())
                .map_err(|e| Error::SerializationError(format!("malformed offer: {}", e)))?;
            Ok(Some(desc))
        }
        _ => Ok(None),
    }
}
