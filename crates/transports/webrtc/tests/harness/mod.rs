//! Negotiation test harness
//!
//! Provides a scripted [`MockTransport`] standing in for the WebRTC
//! primitive: descriptions and candidates are synthetic, every applied
//! remote description/candidate is recorded for assertions, and channel
//! lifecycle is driven manually by the tests. Combined with the in-memory
//! store this exercises the full negotiation core without any network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use peerlink_webrtc::{
    CandidateRecord, DataChannel, Error, NegotiationConfig, PeerSession, PeerTransport,
    PeerTransportFactory, Result, SessionDescription, SessionState, TransportEvent,
    TransportEventSender,
};

/// How long harness waits may block before a test is considered stuck
pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> NegotiationConfig {
    NegotiationConfig::default()
}

/// Scripted transport: produces synthetic descriptions, records everything
/// applied to it, and routes channel sends to a linked peer transport's
/// event stream.
pub struct MockTransport {
    name: String,
    events: TransportEventSender,
    local_description: Mutex<Option<SessionDescription>>,
    remote_description: Mutex<Option<SessionDescription>>,
    remote_set_count: AtomicUsize,
    applied_candidates: Mutex<Vec<CandidateRecord>>,
    early_candidate_errors: AtomicUsize,
    channel_label: Mutex<Option<String>>,
    peer_sink: Arc<Mutex<Option<TransportEventSender>>>,
    closed: AtomicBool,
}

impl MockTransport {
    fn new(name: String, events: TransportEventSender) -> Self {
        Self {
            name,
            events,
            local_description: Mutex::new(None),
            remote_description: Mutex::new(None),
            remote_set_count: AtomicUsize::new(0),
            applied_candidates: Mutex::new(Vec::new()),
            early_candidate_errors: AtomicUsize::new(0),
            channel_label: Mutex::new(None),
            peer_sink: Arc::new(Mutex::new(None)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The description this transport committed locally
    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local_description.lock().clone()
    }

    /// The description applied as remote, if any
    pub fn remote_description_snapshot(&self) -> Option<SessionDescription> {
        self.remote_description.lock().clone()
    }

    /// How many times a remote description was applied (must stay 1 under
    /// duplicate notifications)
    pub fn remote_set_count(&self) -> usize {
        self.remote_set_count.load(Ordering::SeqCst)
    }

    /// Every candidate successfully applied, in order
    pub fn applied_candidates(&self) -> Vec<CandidateRecord> {
        self.applied_candidates.lock().clone()
    }

    /// How many candidates arrived before a remote description was set
    /// (must stay 0 with buffering in place)
    pub fn early_candidate_errors(&self) -> usize {
        self.early_candidate_errors.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn sink(&self) -> TransportEventSender {
        self.events.clone()
    }

    /// Simulate the transport discovering a local network path
    pub fn discover_candidate(&self, tag: &str) {
        let _ = self.events.send(TransportEvent::LocalCandidate(candidate(tag)));
    }

    /// Simulate the data channel reporting open
    pub fn open_channel(&self) {
        let label = self
            .channel_label
            .lock()
            .clone()
            .unwrap_or_else(|| "sendDataChannel".to_string());
        let _ = self.events.send(TransportEvent::ChannelOpen { label });
    }

    /// Simulate the data channel reporting closed
    pub fn close_channel(&self) {
        let label = self
            .channel_label
            .lock()
            .clone()
            .unwrap_or_else(|| "sendDataChannel".to_string());
        let _ = self.events.send(TransportEvent::ChannelClosed { label });
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let desc = SessionDescription::offer(format!("v=0 mock-offer {}", self.name));
        *self.local_description.lock() = Some(desc.clone());
        Ok(desc)
    }

    async fn create_answer(&self, offer: &SessionDescription) -> Result<SessionDescription> {
        *self.remote_description.lock() = Some(offer.clone());
        self.remote_set_count.fetch_add(1, Ordering::SeqCst);
        let desc = SessionDescription::answer(format!("v=0 mock-answer {}", self.name));
        *self.local_description.lock() = Some(desc.clone());
        Ok(desc)
    }

    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<()> {
        *self.remote_description.lock() = Some(desc.clone());
        self.remote_set_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.remote_description.lock().is_some()
    }

    async fn add_remote_candidate(&self, record: &CandidateRecord) -> Result<()> {
        if self.remote_description.lock().is_none() {
            // A strict transport rejects candidates before the remote
            // description; the relay must never let this happen.
            self.early_candidate_errors.fetch_add(1, Ordering::SeqCst);
            return Err(Error::CandidateApplyFailed(
                "remote description not set".to_string(),
            ));
        }
        self.applied_candidates.lock().push(record.clone());
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        *self.channel_label.lock() = Some(label.to_string());
        Ok(Arc::new(MockChannel {
            label: label.to_string(),
            peer_sink: self.peer_sink.clone(),
            unsent: Mutex::new(Vec::new()),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Channel whose sends surface as `ChannelMessage` events on the linked
/// peer's transport
struct MockChannel {
    label: String,
    peer_sink: Arc<Mutex<Option<TransportEventSender>>>,
    unsent: Mutex<Vec<String>>,
}

#[async_trait]
impl DataChannel for MockChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        let sink = self.peer_sink.lock().clone();
        match sink {
            Some(sink) => {
                let _ = sink.send(TransportEvent::ChannelMessage {
                    text: text.to_string(),
                });
                Ok(())
            }
            None => {
                self.unsent.lock().push(text.to_string());
                Ok(())
            }
        }
    }
}

/// Factory shared by every coordinator in a test; created transports are
/// retained in creation order for inspection.
#[derive(Default)]
pub struct MockTransportFactory {
    created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.created.lock().len()
    }

    /// The `index`-th transport created (creation order)
    pub fn transport(&self, index: usize) -> Arc<MockTransport> {
        self.created.lock()[index].clone()
    }

    /// Poll until `count` transports exist
    pub async fn wait_for_transports(&self, count: usize) {
        wait_until(WAIT, || self.count() >= count).await;
    }
}

#[async_trait]
impl PeerTransportFactory for MockTransportFactory {
    async fn create_transport(
        &self,
        events: TransportEventSender,
    ) -> Result<Arc<dyn PeerTransport>> {
        let mut created = self.created.lock();
        let transport = Arc::new(MockTransport::new(format!("t{}", created.len()), events));
        created.push(transport.clone());
        Ok(transport)
    }
}

/// Wire two transports' channels together and report both channels open,
/// as the fabric would once a direct path is established.
pub fn link_and_open(a: &Arc<MockTransport>, b: &Arc<MockTransport>) {
    *a.peer_sink.lock() = Some(b.sink());
    *b.peer_sink.lock() = Some(a.sink());
    a.open_channel();
    b.open_channel();
}

/// A synthetic candidate record
pub fn candidate(tag: &str) -> CandidateRecord {
    CandidateRecord {
        candidate: format!("candidate:{} 1 udp 2122260223 192.0.2.1 54321 typ host", tag),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

/// Wait until a session reaches `target`, panicking after the harness
/// timeout.
pub async fn wait_for_state(session: &PeerSession, target: SessionState) {
    let mut states = session.state_changes();
    let outcome = tokio::time::timeout(WAIT, async {
        loop {
            if *states.borrow_and_update() == target {
                return;
            }
            if states.changed().await.is_err() {
                panic!("state channel closed before reaching {:?}", target);
            }
        }
    })
    .await;
    if outcome.is_err() {
        panic!(
            "session did not reach {:?} within {:?} (still {:?})",
            target,
            WAIT,
            session.state()
        );
    }
}

/// Receive one message or panic after the harness timeout
pub async fn recv_message(rx: &mut tokio::sync::mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("message stream closed")
}

/// Wait until the room host has a session for `player_id`
pub async fn wait_for_room_session(
    room: &peerlink_webrtc::RoomHost,
    player_id: &str,
) -> Arc<PeerSession> {
    let outcome = tokio::time::timeout(WAIT, async {
        loop {
            if let Some(session) = room.session(player_id).await {
                return session;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    match outcome {
        Ok(session) => session,
        Err(_) => panic!("no room session for {:?} within {:?}", player_id, WAIT),
    }
}

/// Poll `predicate` until it holds or the timeout elapses
pub async fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) {
    let outcome = tokio::time::timeout(timeout, async {
        loop {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if outcome.is_err() {
        panic!("condition not reached within {:?}", timeout);
    }
}
