//! Peer session lifecycle
//!
//! A [`PeerSession`] couples one transport, one candidate relay and one
//! description exchange into a single negotiated session with a uniform
//! surface: observable state, inbound messages, `send`, `close`. Exactly
//! one session exists per remote party; the session exclusively owns its
//! transport and data channel.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use peerlink_core::{CollectionPath, SignalingStore, Subscription};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::NegotiationConfig;
use crate::negotiation::{
    AnswerPublication, CandidateRelay, DescriptionExchange, DescriptionGate, OfferPublication,
};
use crate::signaling::SessionDescription;
use crate::transport::{
    DataChannel, PeerTransport, PeerTransportFactory, TransportEvent, TransportEventReceiver,
};
use crate::{Error, Result};

/// Session lifecycle state
///
/// `Negotiating` spans from the start of description exchange until the
/// data channel reports open; `Open` is the only state in which sending is
/// permitted. `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session exists but negotiation has not started
    Created,
    /// Description/candidate exchange in progress
    Negotiating,
    /// Data channel open; messages flow
    Open,
    /// Torn down, by the remote side or explicitly
    Closed,
    /// Negotiation deadline elapsed before the session opened
    Failed,
}

impl SessionState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// Which side of the topology this session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Created the call or room
    Host,
    /// Joined an existing call or room
    Joiner,
}

/// Which way this session's handshake runs
pub(crate) enum NegotiationDirection {
    /// This side publishes the offer and waits for an answer
    Offer(OfferPublication),
    /// This side answers a received offer
    Answer {
        offer: SessionDescription,
        publication: AnswerPublication,
    },
}

/// Everything needed to start one session
pub(crate) struct SessionParams {
    pub role: SessionRole,
    pub remote_id: String,
    pub direction: NegotiationDirection,
    pub outbound_candidates: CollectionPath,
    pub inbound_candidates: CollectionPath,
}

/// State shared between the session handle and its background tasks
struct Shared {
    session_id: String,
    remote_id: String,
    state: watch::Sender<SessionState>,
    channel: RwLock<Option<Arc<dyn DataChannel>>>,
    messages: mpsc::UnboundedSender<String>,
    relay: CandidateRelay,
    gate: DescriptionGate,
    transport: Arc<dyn PeerTransport>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Shared {
    fn set_state(&self, new: SessionState) {
        self.state.send_if_modified(|current| {
            if *current == new || current.is_terminal() {
                return false;
            }
            debug!(
                session = %self.session_id,
                "session state transition: {:?} -> {:?}",
                *current,
                new
            );
            *current = new;
            true
        });
    }

    /// Release subscriptions and the transport. Idempotent.
    async fn teardown(&self) {
        let subscriptions: Vec<Subscription> = self.subscriptions.lock().drain(..).collect();
        for subscription in subscriptions {
            subscription.cancel();
        }
        if let Err(e) = self.transport.close().await {
            warn!(session = %self.session_id, "error closing transport: {}", e);
        }
    }
}

/// One negotiated peer-to-peer session
pub struct PeerSession {
    role: SessionRole,
    shared: Arc<Shared>,
    messages_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("role", &self.role)
            .field("session_id", &self.shared.session_id)
            .finish_non_exhaustive()
    }
}

impl PeerSession {
    /// Create the transport, start candidate relay and description
    /// exchange, and return the running session.
    pub(crate) async fn start(
        store: Arc<dyn SignalingStore>,
        factory: Arc<dyn PeerTransportFactory>,
        config: &NegotiationConfig,
        params: SessionParams,
    ) -> Result<Arc<Self>> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let transport = factory.create_transport(event_tx).await?;

        let gate = DescriptionGate::new();
        let relay = CandidateRelay::new(
            store.clone(),
            transport.clone(),
            gate.clone(),
            params.outbound_candidates,
            params.inbound_candidates,
        );
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Created);

        let shared = Arc::new(Shared {
            session_id: uuid::Uuid::new_v4().to_string(),
            remote_id: params.remote_id,
            state: state_tx,
            channel: RwLock::new(None),
            messages: messages_tx,
            relay,
            gate,
            transport,
            subscriptions: Mutex::new(Vec::new()),
        });

        info!(
            session = %shared.session_id,
            remote = %shared.remote_id,
            role = ?params.role,
            "starting peer session"
        );

        let event_task = tokio::spawn(Self::event_loop(shared.clone(), event_rx));

        if let Err(e) = Self::negotiate(&shared, store, config, params.direction).await {
            event_task.abort();
            shared.set_state(SessionState::Closed);
            shared.teardown().await;
            return Err(e);
        }

        let session = Arc::new(Self {
            role: params.role,
            shared: shared.clone(),
            messages_rx: Mutex::new(Some(messages_rx)),
            tasks: Mutex::new(vec![event_task]),
        });

        if let Some(deadline) = config.negotiation_timeout {
            session
                .tasks
                .lock()
                .push(tokio::spawn(Self::watchdog(shared, deadline)));
        }

        Ok(session)
    }

    /// Outbound channel, relay subscription, then the handshake
    async fn negotiate(
        shared: &Arc<Shared>,
        store: Arc<dyn SignalingStore>,
        config: &NegotiationConfig,
        direction: NegotiationDirection,
    ) -> Result<()> {
        // The outbound channel is created before any description so the
        // description advertises it.
        let channel = shared
            .transport
            .create_data_channel(&config.channel_label)
            .await?;
        *shared.channel.write().await = Some(channel);

        shared.set_state(SessionState::Negotiating);

        let relay_subscription = shared.relay.start().await?;
        shared.subscriptions.lock().push(relay_subscription);

        let exchange = DescriptionExchange::new(
            store,
            shared.transport.clone(),
            shared.gate.clone(),
        );
        match direction {
            NegotiationDirection::Offer(publication) => {
                let subscription = exchange.run_as_offerer(publication).await?;
                shared.subscriptions.lock().push(subscription);
            }
            NegotiationDirection::Answer {
                offer,
                publication,
            } => {
                exchange.run_as_answerer(offer, publication).await?;
            }
        }
        Ok(())
    }

    async fn event_loop(shared: Arc<Shared>, mut events: TransportEventReceiver) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::LocalCandidate(record) => {
                    if let Err(e) = shared.relay.publish_local(&record).await {
                        warn!(
                            session = %shared.session_id,
                            "failed to publish local candidate: {}",
                            e
                        );
                    }
                }
                TransportEvent::InboundChannel(channel) => {
                    let mut slot = shared.channel.write().await;
                    if slot.is_none() {
                        debug!(
                            session = %shared.session_id,
                            label = channel.label(),
                            "adopting inbound data channel"
                        );
                        *slot = Some(channel);
                    }
                }
                TransportEvent::ChannelOpen { label } => {
                    debug!(session = %shared.session_id, label, "data channel open");
                    shared.set_state(SessionState::Open);
                }
                TransportEvent::ChannelMessage { text } => {
                    let _ = shared.messages.send(text);
                }
                TransportEvent::ChannelClosed { .. } | TransportEvent::Closed => {
                    shared.set_state(SessionState::Closed);
                    shared.teardown().await;
                    break;
                }
            }
        }
    }

    /// Move a session still negotiating at the deadline to `Failed`
    async fn watchdog(shared: Arc<Shared>, deadline: Duration) {
        tokio::time::sleep(deadline).await;
        let state = *shared.state.borrow();
        if matches!(state, SessionState::Created | SessionState::Negotiating) {
            warn!(
                session = %shared.session_id,
                "negotiation did not complete within {:?}",
                deadline
            );
            shared.set_state(SessionState::Failed);
            shared.teardown().await;
        }
    }

    /// Unique id of this session instance
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Identity of the remote party (call id, or joiner identity for a
    /// room host's sessions)
    pub fn remote_id(&self) -> &str {
        &self.shared.remote_id
    }

    /// Which side of the topology this session is
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Watch lifecycle state transitions
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Take the inbound message stream. Yields each received application
    /// message once; returns `None` if already taken.
    pub fn take_messages(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.messages_rx.lock().take()
    }

    /// Send an application-level text payload
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the session is `Open`.
    pub async fn send(&self, text: &str) -> Result<()> {
        let state = self.state();
        if state != SessionState::Open {
            return Err(Error::InvalidState(format!(
                "cannot send while {:?}",
                state
            )));
        }
        let channel = self.shared.channel.read().await.clone();
        match channel {
            Some(channel) => channel.send_text(text).await,
            None => Err(Error::InvalidState("no data channel attached".to_string())),
        }
    }

    /// Tear the session down. Terminal and idempotent.
    pub async fn close(&self) {
        debug!(session = %self.shared.session_id, "closing peer session");
        self.shared.set_state(SessionState::Closed);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.shared.teardown().await;
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
