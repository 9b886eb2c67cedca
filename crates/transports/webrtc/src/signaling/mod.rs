//! Relay-visible document model and path layout
//!
//! Everything the negotiation core reads from or writes to the signaling
//! store lives here: the JSON document shapes (with wire field names pinned
//! for interoperability with existing deployments) and the path layout of
//! call and room negotiations.

pub mod documents;
pub mod paths;

pub use documents::{
    CallDocument, CandidateRecord, JoinRequest, JoinResponse, SdpKind, SessionDescription,
};
pub use paths::{CallPaths, JoinerPaths, RoomPaths};
