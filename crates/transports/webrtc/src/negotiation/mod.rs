//! The negotiation protocol
//!
//! Two independent concurrent activities per session, coupled only by the
//! description gate: [`description::DescriptionExchange`] drives the
//! offer/answer handshake, [`candidates::CandidateRelay`] trickles
//! candidates both ways. The gate enforces the one ordering rule of the
//! protocol: no remote candidate is applied before the remote description.

pub mod candidates;
pub mod description;

pub use candidates::CandidateRelay;
pub use description::{
    AnswerPublication, DescriptionExchange, DescriptionGate, OfferPublication,
};
