//! Topology management
//!
//! [`ConnectionCoordinator`] is the entry point for both negotiation
//! shapes: the one-to-one call (one shared document, one session per side)
//! and the room (the host watches a join-request collection and runs one
//! independent session per joining peer, keyed by joiner identity). No
//! state is global: every session lives under the coordinator or room-host
//! instance that created it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use peerlink_core::{
    ChangeKind, IdentityStore, SignalingStore, Subscription,
};
use serde_json::json;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::NegotiationConfig;
use crate::negotiation::{AnswerPublication, OfferPublication};
use crate::session::{NegotiationDirection, PeerSession, SessionRole, SessionParams, SessionState};
use crate::signaling::documents::offer_field;
use crate::signaling::{CallPaths, JoinRequest, RoomPaths};
use crate::transport::PeerTransportFactory;
use crate::{Error, Result};

/// Orchestrates peer sessions against one store and transport factory
pub struct ConnectionCoordinator {
    store: Arc<dyn SignalingStore>,
    factory: Arc<dyn PeerTransportFactory>,
    config: NegotiationConfig,
    identity: String,
}

impl ConnectionCoordinator {
    /// Coordinator with an explicit local identity
    pub fn new(
        store: Arc<dyn SignalingStore>,
        factory: Arc<dyn PeerTransportFactory>,
        config: NegotiationConfig,
        identity: impl Into<String>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            factory,
            config,
            identity: identity.into(),
        })
    }

    /// Coordinator using the identity persisted in the per-user state
    /// directory, generating it on first use.
    pub async fn with_persisted_identity(
        store: Arc<dyn SignalingStore>,
        factory: Arc<dyn PeerTransportFactory>,
        config: NegotiationConfig,
    ) -> Result<Self> {
        let identity = IdentityStore::default_location()
            .map_err(|e| Error::InternalError(e.to_string()))?
            .load_or_generate()
            .await
            .map_err(|e| Error::InternalError(e.to_string()))?;
        Self::new(store, factory, config, identity)
    }

    /// The local identity presented in join requests
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Start a one-to-one call. Returns the call id to hand to the other
    /// party and the host session, which waits for them to answer.
    pub async fn create_call(&self) -> Result<(String, Arc<PeerSession>)> {
        let path = self
            .store
            .create_document(&CallPaths::collection(), json!({}))
            .await?;
        let call_id = path.id().to_string();
        let paths = CallPaths::new(&call_id);
        info!(call = %call_id, "created call");

        let session = PeerSession::start(
            self.store.clone(),
            self.factory.clone(),
            &self.config,
            SessionParams {
                role: SessionRole::Host,
                remote_id: call_id.clone(),
                direction: NegotiationDirection::Offer(OfferPublication::CallDocument {
                    path: paths.document.clone(),
                    call_id: call_id.clone(),
                }),
                outbound_candidates: paths.offer_candidates(),
                inbound_candidates: paths.answer_candidates(),
            },
        )
        .await?;

        Ok((call_id, session))
    }

    /// Answer an existing call by id
    ///
    /// # Errors
    ///
    /// Returns `NegotiationNotFound` (and creates no session) if no call
    /// document exists under `call_id` or it carries no offer.
    pub async fn join_call(&self, call_id: &str) -> Result<Arc<PeerSession>> {
        let paths = CallPaths::new(call_id);
        let document = self
            .store
            .get_document(&paths.document)
            .await?
            .ok_or_else(|| Error::NegotiationNotFound(format!("no such call: {}", call_id)))?;
        let offer = offer_field(&document)?.ok_or_else(|| {
            Error::NegotiationNotFound(format!("call {} has no offer", call_id))
        })?;
        info!(call = %call_id, "answering call");

        PeerSession::start(
            self.store.clone(),
            self.factory.clone(),
            &self.config,
            SessionParams {
                role: SessionRole::Joiner,
                remote_id: call_id.to_string(),
                direction: NegotiationDirection::Answer {
                    offer,
                    publication: AnswerPublication::CallDocument {
                        path: paths.document.clone(),
                    },
                },
                outbound_candidates: paths.answer_candidates(),
                inbound_candidates: paths.offer_candidates(),
            },
        )
        .await
    }

    /// Create a room and start accepting joiners
    pub async fn create_room(&self) -> Result<Arc<RoomHost>> {
        let path = self
            .store
            .create_document(&RoomPaths::collection(), json!({}))
            .await?;
        let room_id = path.id().to_string();
        info!(room = %room_id, "created room");

        RoomHost::start(
            room_id,
            self.store.clone(),
            self.factory.clone(),
            self.config.clone(),
        )
        .await
    }

    /// Join an existing room by id. The returned session negotiates
    /// against this joiner's own sub-tree only.
    ///
    /// # Errors
    ///
    /// Returns `NegotiationNotFound` (and creates no session) if no room
    /// document exists under `room_id`.
    pub async fn join_room(&self, room_id: &str) -> Result<Arc<PeerSession>> {
        let paths = RoomPaths::new(room_id);
        self.store
            .get_document(&paths.document)
            .await?
            .ok_or_else(|| Error::NegotiationNotFound(format!("no such room: {}", room_id)))?;

        let joiner = paths.player(&self.identity);
        info!(room = %room_id, player = %self.identity, "joining room");

        PeerSession::start(
            self.store.clone(),
            self.factory.clone(),
            &self.config,
            SessionParams {
                role: SessionRole::Joiner,
                remote_id: room_id.to_string(),
                direction: NegotiationDirection::Offer(OfferPublication::JoinRequest {
                    requests: paths.requests(),
                    responses: joiner.responses(),
                    player_id: self.identity.clone(),
                }),
                outbound_candidates: joiner.offer_candidates(),
                inbound_candidates: joiner.answer_candidates(),
            },
        )
        .await
    }
}

/// The hosting side of a room: one answerer session per joiner
pub struct RoomHost {
    room_id: String,
    sessions: Arc<RwLock<HashMap<String, Arc<PeerSession>>>>,
    subscription: Mutex<Option<Subscription>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl RoomHost {
    async fn start(
        room_id: String,
        store: Arc<dyn SignalingStore>,
        factory: Arc<dyn PeerTransportFactory>,
        config: NegotiationConfig,
    ) -> Result<Arc<Self>> {
        let paths = RoomPaths::new(&room_id);
        let sessions = Arc::new(RwLock::new(HashMap::new()));

        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = store.subscribe_collection(&paths.requests(), tx).await?;

        let accept_task = tokio::spawn(Self::accept_loop(
            room_id.clone(),
            paths,
            store,
            factory,
            config,
            sessions.clone(),
            rx,
        ));

        Ok(Arc::new(Self {
            room_id,
            sessions,
            subscription: Mutex::new(Some(subscription)),
            accept_task: Mutex::new(Some(accept_task)),
        }))
    }

    /// Spawn an answerer session for every new join request
    async fn accept_loop(
        room_id: String,
        paths: RoomPaths,
        store: Arc<dyn SignalingStore>,
        factory: Arc<dyn PeerTransportFactory>,
        config: NegotiationConfig,
        sessions: Arc<RwLock<HashMap<String, Arc<PeerSession>>>>,
        mut requests: mpsc::UnboundedReceiver<peerlink_core::DocumentChange>,
    ) {
        while let Some(change) = requests.recv().await {
            if change.kind != ChangeKind::Added {
                continue;
            }
            // Entries without an offer or identity are not join requests.
            let request: JoinRequest = match serde_json::from_value(change.value) {
                Ok(request) => request,
                Err(_) => {
                    debug!(room = %room_id, path = %change.path, "ignoring malformed join request");
                    continue;
                }
            };

            // Replayed or duplicated requests for a known joiner must not
            // spawn a second session.
            if sessions.read().await.contains_key(&request.player_id) {
                debug!(
                    room = %room_id,
                    player = %request.player_id,
                    "ignoring duplicate join request"
                );
                continue;
            }

            info!(room = %room_id, player = %request.player_id, "join request received");
            let joiner = paths.player(&request.player_id);
            let result = PeerSession::start(
                store.clone(),
                factory.clone(),
                &config,
                SessionParams {
                    role: SessionRole::Host,
                    remote_id: request.player_id.clone(),
                    direction: NegotiationDirection::Answer {
                        offer: request.offer,
                        publication: AnswerPublication::JoinResponse {
                            responses: joiner.responses(),
                        },
                    },
                    outbound_candidates: joiner.answer_candidates(),
                    inbound_candidates: joiner.offer_candidates(),
                },
            )
            .await;

            match result {
                Ok(session) => {
                    sessions
                        .write()
                        .await
                        .insert(request.player_id.clone(), session);
                }
                // One joiner failing must not affect the others.
                Err(e) => warn!(
                    room = %room_id,
                    player = %request.player_id,
                    "failed to start session for joiner: {}",
                    e
                ),
            }
        }
    }

    /// The room identifier joiners use
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// The session negotiated with one joiner, if any
    pub async fn session(&self, player_id: &str) -> Option<Arc<PeerSession>> {
        self.sessions.read().await.get(player_id).cloned()
    }

    /// All joiner sessions, keyed by identity
    pub async fn sessions(&self) -> Vec<(String, Arc<PeerSession>)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(player_id, session)| (player_id.clone(), session.clone()))
            .collect()
    }

    /// Number of joiner sessions (any state)
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Send to one joiner
    ///
    /// # Errors
    ///
    /// Returns `PeerNotFound` if no session exists for `player_id`;
    /// `InvalidState` if that session is not open.
    pub async fn send_to(&self, player_id: &str, text: &str) -> Result<()> {
        let session = self
            .session(player_id)
            .await
            .ok_or_else(|| Error::PeerNotFound(player_id.to_string()))?;
        session.send(text).await
    }

    /// Fan a message out to every currently open session. Sessions still
    /// negotiating are skipped, not queued. Returns how many sessions the
    /// message reached.
    pub async fn broadcast(&self, text: &str) -> usize {
        let sessions = self.sessions().await;
        let mut reached = 0;
        for (player_id, session) in sessions {
            if session.state() != SessionState::Open {
                debug!(player = %player_id, "skipping non-open session in broadcast");
                continue;
            }
            match session.send(text).await {
                Ok(()) => reached += 1,
                Err(e) => warn!(player = %player_id, "broadcast send failed: {}", e),
            }
        }
        reached
    }

    /// Stop accepting joiners and close every session
    pub async fn close(&self) {
        debug!(room = %self.room_id, "closing room");
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.cancel();
        }
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
        let sessions: Vec<Arc<PeerSession>> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in sessions {
            session.close().await;
        }
    }
}

impl Drop for RoomHost {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
    }
}
