//! Trickle-ICE candidate relay
//!
//! One relay per session. Locally discovered candidates are appended to the
//! session's outbound collection the moment the transport reports them;
//! remotely published candidates are applied to the transport, buffered
//! until the remote description is set so none is applied early or lost.

use std::collections::HashSet;
use std::sync::Arc;

use peerlink_core::{ChangeKind, CollectionPath, DocumentChange, SignalingStore, Subscription};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::negotiation::DescriptionGate;
use crate::signaling::CandidateRecord;
use crate::transport::PeerTransport;
use crate::Result;

/// Relays candidates between the store and one transport
pub struct CandidateRelay {
    store: Arc<dyn SignalingStore>,
    transport: Arc<dyn PeerTransport>,
    gate: DescriptionGate,
    outbound: CollectionPath,
    inbound: CollectionPath,
}

impl CandidateRelay {
    /// Relay scoped to one session's candidate collections
    pub fn new(
        store: Arc<dyn SignalingStore>,
        transport: Arc<dyn PeerTransport>,
        gate: DescriptionGate,
        outbound: CollectionPath,
        inbound: CollectionPath,
    ) -> Self {
        Self {
            store,
            transport,
            gate,
            outbound,
            inbound,
        }
    }

    /// Append a locally discovered candidate to the outbound collection
    pub async fn publish_local(&self, record: &CandidateRecord) -> Result<()> {
        debug!(collection = %self.outbound, "publishing local candidate");
        self.store
            .create_document(&self.outbound, serde_json::to_value(record)?)
            .await?;
        Ok(())
    }

    /// Subscribe to the counterpart's candidates and start applying them.
    ///
    /// Runs until the returned subscription is dropped. Entries are applied
    /// at most once (keyed by document id) and only after the description
    /// gate opens; earlier arrivals are buffered and flushed in order.
    pub async fn start(&self) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.store.subscribe_collection(&self.inbound, tx).await?;

        tokio::spawn(Self::apply_loop(
            self.transport.clone(),
            self.gate.clone(),
            rx,
        ));

        Ok(subscription)
    }

    async fn apply_loop(
        transport: Arc<dyn PeerTransport>,
        gate: DescriptionGate,
        mut changes: mpsc::UnboundedReceiver<DocumentChange>,
    ) {
        let mut seen: HashSet<String> = HashSet::new();
        let mut pending: Vec<CandidateRecord> = Vec::new();
        let mut open = gate.is_open();

        loop {
            tokio::select! {
                _ = gate.opened(), if !open => {
                    open = true;
                    for record in pending.drain(..) {
                        Self::apply(&transport, &record).await;
                    }
                }
                change = changes.recv() => {
                    let Some(change) = change else { break };
                    if change.kind != ChangeKind::Added {
                        continue;
                    }
                    if !seen.insert(change.path.id().to_string()) {
                        debug!(path = %change.path, "ignoring replayed candidate");
                        continue;
                    }
                    // Entries without a candidate payload are skipped, as
                    // the deployed readers do.
                    if change.value.get("candidate").is_none() {
                        continue;
                    }
                    let record: CandidateRecord = match serde_json::from_value(change.value) {
                        Ok(record) => record,
                        Err(e) => {
                            warn!(path = %change.path, "ignoring malformed candidate: {}", e);
                            continue;
                        }
                    };
                    if open {
                        Self::apply(&transport, &record).await;
                    } else {
                        debug!(path = %change.path, "buffering candidate until remote description is set");
                        pending.push(record);
                    }
                }
            }
        }
    }

    /// Apply one candidate; failures are observed, never retried, and do
    /// not abort the session.
    async fn apply(transport: &Arc<dyn PeerTransport>, record: &CandidateRecord) {
        match transport.add_remote_candidate(record).await {
            Ok(()) => debug!("Applied remote candidate"),
            Err(e) => warn!("Candidate apply failed: {}", e),
        }
    }
}
