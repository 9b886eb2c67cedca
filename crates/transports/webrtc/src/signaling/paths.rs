//! Path layout of negotiation documents in the store
//!
//! Call topology:
//!
//! ```text
//! calls/{callId}                      { id, offer?, answer? }
//! calls/{callId}/offerCandidates      candidate records, offerer -> answerer
//! calls/{callId}/answerCandidates     candidate records, answerer -> offerer
//! ```
//!
//! Room topology fans one room out into independent per-joiner sub-trees;
//! a joiner only ever touches its own sub-tree, so cross-joiner isolation
//! holds by path construction:
//!
//! ```text
//! rooms/{roomId}                                       (existence marker)
//! rooms/{roomId}/requests                              { offer, playerID }
//! rooms/{roomId}/players/{playerID}/responses          { answer }
//! rooms/{roomId}/players/{playerID}/offerCandidates    joiner -> host
//! rooms/{roomId}/players/{playerID}/answerCandidates   host -> joiner
//! ```

use peerlink_core::{CollectionPath, DocumentPath};

const CALLS: &str = "calls";
const ROOMS: &str = "rooms";
const REQUESTS: &str = "requests";
const PLAYERS: &str = "players";
const RESPONSES: &str = "responses";
const OFFER_CANDIDATES: &str = "offerCandidates";
const ANSWER_CANDIDATES: &str = "answerCandidates";

/// Paths of a one-to-one call negotiation
#[derive(Debug, Clone)]
pub struct CallPaths {
    /// The shared call document
    pub document: DocumentPath,
}

impl CallPaths {
    /// The top-level call collection
    pub fn collection() -> CollectionPath {
        CollectionPath::root(CALLS)
    }

    /// Paths for the call with the given id
    pub fn new(call_id: &str) -> Self {
        Self {
            document: Self::collection().doc(call_id),
        }
    }

    /// Candidates published by the offering side
    pub fn offer_candidates(&self) -> CollectionPath {
        self.document.collection(OFFER_CANDIDATES)
    }

    /// Candidates published by the answering side
    pub fn answer_candidates(&self) -> CollectionPath {
        self.document.collection(ANSWER_CANDIDATES)
    }
}

/// Paths of a room negotiation
#[derive(Debug, Clone)]
pub struct RoomPaths {
    /// The room document (existence marker joiners probe)
    pub document: DocumentPath,
}

impl RoomPaths {
    /// The top-level room collection
    pub fn collection() -> CollectionPath {
        CollectionPath::root(ROOMS)
    }

    /// Paths for the room with the given id
    pub fn new(room_id: &str) -> Self {
        Self {
            document: Self::collection().doc(room_id),
        }
    }

    /// Join requests, watched once by the host
    pub fn requests(&self) -> CollectionPath {
        self.document.collection(REQUESTS)
    }

    /// The per-joiner sub-tree for one player identity
    pub fn player(&self, player_id: &str) -> JoinerPaths {
        JoinerPaths {
            document: self.document.collection(PLAYERS).doc(player_id),
        }
    }
}

/// Paths of one joiner's negotiation sub-tree within a room
#[derive(Debug, Clone)]
pub struct JoinerPaths {
    /// The per-joiner document root
    pub document: DocumentPath,
}

impl JoinerPaths {
    /// Host answers for this joiner
    pub fn responses(&self) -> CollectionPath {
        self.document.collection(RESPONSES)
    }

    /// Candidates published by the joiner (the offering side)
    pub fn offer_candidates(&self) -> CollectionPath {
        self.document.collection(OFFER_CANDIDATES)
    }

    /// Candidates published by the host (the answering side)
    pub fn answer_candidates(&self) -> CollectionPath {
        self.document.collection(ANSWER_CANDIDATES)
    }
}
