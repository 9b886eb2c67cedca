//! Offer/answer description exchange
//!
//! Drives exactly one handshake per session. The offerer publishes its
//! description and waits (indefinitely, bounded only by the caller's
//! cancellation) for the counterpart's answer; the answerer applies the
//! received offer and publishes its answer exactly once, by merge-update
//! or append so the offer field is never overwritten.

use std::sync::Arc;

use peerlink_core::{CollectionPath, DocumentPath, SignalingStore, Subscription};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::signaling::documents::{answer_field, CallDocument, JoinRequest, JoinResponse};
use crate::signaling::SessionDescription;
use crate::transport::PeerTransport;
use crate::Result;

/// Opens once the session's remote description has been applied
///
/// Shared between the description exchange (which opens it) and the
/// candidate relay (which buffers remote candidates until it opens).
#[derive(Clone)]
pub struct DescriptionGate {
    state: Arc<watch::Sender<bool>>,
}

impl DescriptionGate {
    /// A closed gate
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Mark the remote description as applied
    pub fn open(&self) {
        self.state.send_replace(true);
    }

    /// Whether the remote description has been applied
    pub fn is_open(&self) -> bool {
        *self.state.borrow()
    }

    /// Wait until the gate opens
    pub async fn opened(&self) {
        let mut rx = self.state.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for DescriptionGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Where an offerer publishes its offer and watches for the answer
#[derive(Debug, Clone)]
pub enum OfferPublication {
    /// Call topology: offer and answer are fields of one shared document
    CallDocument {
        /// The shared call document
        path: DocumentPath,
        /// Call identifier stored in the document
        call_id: String,
    },
    /// Room topology: the offer is appended as a join request, the answer
    /// arrives in the joiner's own response collection
    JoinRequest {
        /// The room's join-request collection
        requests: CollectionPath,
        /// This joiner's response collection
        responses: CollectionPath,
        /// This joiner's identity
        player_id: String,
    },
}

/// Where an answerer publishes its answer
#[derive(Debug, Clone)]
pub enum AnswerPublication {
    /// Call topology: merge the answer field into the shared document
    CallDocument {
        /// The shared call document
        path: DocumentPath,
    },
    /// Room topology: append the answer to the joiner's response collection
    JoinResponse {
        /// The joiner's response collection
        responses: CollectionPath,
    },
}

/// Drives one offer/answer handshake against the store
pub struct DescriptionExchange {
    store: Arc<dyn SignalingStore>,
    transport: Arc<dyn PeerTransport>,
    gate: DescriptionGate,
}

impl DescriptionExchange {
    /// Exchange for one session
    pub fn new(
        store: Arc<dyn SignalingStore>,
        transport: Arc<dyn PeerTransport>,
        gate: DescriptionGate,
    ) -> Self {
        Self {
            store,
            transport,
            gate,
        }
    }

    /// Create and publish the local offer, then watch for the answer.
    ///
    /// Returns once the offer is published; answer application continues in
    /// the background until the returned subscription is dropped. Duplicate
    /// answer notifications are ignored once a remote description is set.
    pub async fn run_as_offerer(&self, publication: OfferPublication) -> Result<Subscription> {
        let offer = self.transport.create_offer().await?;
        debug!("Created local offer");

        let (tx, rx) = mpsc::unbounded_channel::<Value>();
        let subscription = match &publication {
            OfferPublication::CallDocument { path, call_id } => {
                let document = CallDocument {
                    id: call_id.clone(),
                    offer: Some(offer),
                    answer: None,
                };
                self.store
                    .set_document(path, serde_json::to_value(&document)?)
                    .await?;

                self.store.subscribe_document(path, tx).await?
            }
            OfferPublication::JoinRequest {
                requests,
                responses,
                player_id,
            } => {
                let request = JoinRequest {
                    offer,
                    player_id: player_id.clone(),
                };
                self.store
                    .create_document(requests, serde_json::to_value(&request)?)
                    .await?;

                // Response entries carry the same `answer` field shape as a
                // call document, so one applier handles both.
                let (change_tx, mut change_rx) = mpsc::unbounded_channel();
                let value_tx = tx;
                tokio::spawn(async move {
                    while let Some(change) = change_rx.recv().await {
                        let change: peerlink_core::DocumentChange = change;
                        if value_tx.send(change.value).is_err() {
                            break;
                        }
                    }
                });
                self.store.subscribe_collection(responses, change_tx).await?
            }
        };

        tokio::spawn(Self::apply_answers(
            self.transport.clone(),
            self.gate.clone(),
            rx,
        ));

        Ok(subscription)
    }

    /// Observe answer-bearing values until one is applied
    async fn apply_answers(
        transport: Arc<dyn PeerTransport>,
        gate: DescriptionGate,
        mut values: mpsc::UnboundedReceiver<Value>,
    ) {
        while let Some(value) = values.recv().await {
            let answer = match answer_field(&value) {
                Ok(Some(answer)) => answer,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Ignoring malformed answer document: {}", e);
                    continue;
                }
            };

            // Change notifications are at-least-once; never re-apply once a
            // remote description is set.
            if transport.has_remote_description().await {
                debug!("Remote description already set, ignoring duplicate answer");
                continue;
            }

            match transport.set_remote_description(&answer).await {
                Ok(()) => {
                    debug!("Applied remote answer");
                    gate.open();
                    break;
                }
                Err(e) => warn!("Failed to apply remote answer: {}", e),
            }
        }
    }

    /// Apply the received offer, create the local answer, and publish it.
    ///
    /// The candidate gate opens as soon as the offer has been applied, i.e.
    /// before the answer is published.
    pub async fn run_as_answerer(
        &self,
        offer: SessionDescription,
        publication: AnswerPublication,
    ) -> Result<()> {
        let answer = self.transport.create_answer(&offer).await?;
        self.gate.open();
        debug!("Applied remote offer, created local answer");

        match publication {
            AnswerPublication::CallDocument { path } => {
                // Merge-update: the offer field must survive.
                self.store
                    .update_document(
                        &path,
                        serde_json::to_value(&CallDocument {
                            id: path.id().to_string(),
                            offer: None,
                            answer: Some(answer),
                        })?,
                    )
                    .await?;
            }
            AnswerPublication::JoinResponse { responses } => {
                self.store
                    .create_document(&responses, serde_json::to_value(&JoinResponse { answer })?)
                    .await?;
            }
        }

        Ok(())
    }
}
