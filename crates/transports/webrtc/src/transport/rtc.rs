//! Production transport over the `webrtc` crate
//!
//! Wraps an `RTCPeerConnection` behind the [`PeerTransport`] capability:
//! trickle-ICE discoveries, inbound channels and channel lifecycle are
//! forwarded onto the session's event stream, and remote descriptions and
//! candidates are applied to the underlying connection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use webrtc::api::APIBuilder;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::config::NegotiationConfig;
use crate::signaling::{CandidateRecord, SdpKind, SessionDescription};
use crate::transport::{
    DataChannel, PeerTransport, PeerTransportFactory, TransportEvent, TransportEventSender,
};
use crate::{Error, Result};

/// [`PeerTransportFactory`] producing [`RtcTransport`] instances
#[derive(Debug, Clone)]
pub struct RtcTransportFactory {
    config: NegotiationConfig,
}

impl RtcTransportFactory {
    /// Factory using the given ICE configuration
    pub fn new(config: NegotiationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PeerTransportFactory for RtcTransportFactory {
    async fn create_transport(
        &self,
        events: TransportEventSender,
    ) -> Result<Arc<dyn PeerTransport>> {
        let transport = RtcTransport::new(&self.config, events).await?;
        Ok(Arc::new(transport))
    }
}

/// [`PeerTransport`] over a `webrtc` crate `RTCPeerConnection`
pub struct RtcTransport {
    peer_connection: Arc<RTCPeerConnection>,
    events: TransportEventSender,
}

impl RtcTransport {
    /// Create a connection and wire its callbacks to `events`
    pub async fn new(config: &NegotiationConfig, events: TransportEventSender) -> Result<Self> {
        let api = APIBuilder::new().build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ice_candidate_pool_size: config.ice_candidate_pool_size,
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::WebRtcError(format!("Failed to create peer connection: {}", e))
        })?);

        // Local candidate discoveries feed the relay through the event
        // stream. A `None` candidate marks the end of gathering.
        let candidate_events = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            match candidate {
                Some(candidate) => match candidate.to_json() {
                    Ok(init) => {
                        let _ = candidate_events.send(TransportEvent::LocalCandidate(
                            CandidateRecord {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                                username_fragment: init.username_fragment,
                            },
                        ));
                    }
                    Err(e) => warn!("Failed to serialize local candidate: {}", e),
                },
                None => debug!("ICE candidate gathering completed"),
            }
            Box::pin(async {})
        }));

        let inbound_events = events.clone();
        peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            debug!("Inbound data channel: {}", dc.label());
            let channel = RtcDataChannel::attach(dc, inbound_events.clone());
            let _ = inbound_events.send(TransportEvent::InboundChannel(channel));
            Box::pin(async {})
        }));

        let state_events = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                debug!("Peer connection state changed to {:?}", state);
                match state {
                    RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Closed => {
                        let _ = state_events.send(TransportEvent::Closed);
                    }
                    _ => {}
                }
                Box::pin(async {})
            },
        ));

        Ok(Self {
            peer_connection,
            events,
        })
    }

    async fn committed_local_description(&self) -> Result<SessionDescription> {
        let local = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::SdpError("No local description after commit".to_string()))?;
        let kind = match local.sdp_type {
            RTCSdpType::Offer => SdpKind::Offer,
            RTCSdpType::Answer => SdpKind::Answer,
            other => {
                return Err(Error::SdpError(format!(
                    "Unexpected local description type: {:?}",
                    other
                )))
            }
        };
        Ok(SessionDescription {
            kind,
            sdp: local.sdp,
        })
    }
}

fn to_rtc_description(desc: &SessionDescription) -> Result<RTCSessionDescription> {
    match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp.clone()),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp.clone()),
    }
    .map_err(|e| Error::SdpError(format!("Failed to parse description: {}", e)))
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        self.committed_local_description().await
    }

    async fn create_answer(&self, offer: &SessionDescription) -> Result<SessionDescription> {
        self.peer_connection
            .set_remote_description(to_rtc_description(offer)?)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        self.committed_local_description().await
    }

    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc_description(desc)?)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn has_remote_description(&self) -> bool {
        self.peer_connection.remote_description().await.is_some()
    }

    async fn add_remote_candidate(&self, record: &CandidateRecord) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: record.candidate.clone(),
            sdp_mid: record.sdp_mid.clone(),
            sdp_mline_index: record.sdp_mline_index,
            username_fragment: record.username_fragment.clone(),
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::CandidateApplyFailed(e.to_string()))
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        let dc = self
            .peer_connection
            .create_data_channel(label, None)
            .await
            .map_err(|e| Error::DataChannelError(format!("Failed to create channel: {}", e)))?;
        Ok(RtcDataChannel::attach(dc, self.events.clone()))
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::WebRtcError(format!("Failed to close connection: {}", e)))
    }
}

/// [`DataChannel`] over a `webrtc` crate `RTCDataChannel`
struct RtcDataChannel {
    label: String,
    inner: Arc<RTCDataChannel>,
}

impl RtcDataChannel {
    /// Wrap a channel and forward its lifecycle onto `events`
    fn attach(dc: Arc<RTCDataChannel>, events: TransportEventSender) -> Arc<dyn DataChannel> {
        let label = dc.label().to_string();

        let open_events = events.clone();
        let open_label = label.clone();
        dc.on_open(Box::new(move || {
            debug!("Data channel open: {}", open_label);
            let _ = open_events.send(TransportEvent::ChannelOpen {
                label: open_label.clone(),
            });
            Box::pin(async {})
        }));

        let message_events = events.clone();
        dc.on_message(Box::new(move |msg| {
            // Payloads are opaque text; binary frames are decoded lossily
            // rather than dropped.
            let text = String::from_utf8_lossy(&msg.data).to_string();
            let _ = message_events.send(TransportEvent::ChannelMessage { text });
            Box::pin(async {})
        }));

        let close_events = events;
        let close_label = label.clone();
        dc.on_close(Box::new(move || {
            debug!("Data channel closed: {}", close_label);
            let _ = close_events.send(TransportEvent::ChannelClosed {
                label: close_label.clone(),
            });
            Box::pin(async {})
        }));

        Arc::new(Self { label, inner: dc })
    }
}

#[async_trait]
impl DataChannel for RtcDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.inner
            .send_text(text.to_string())
            .await
            .map(|_| ())
            .map_err(|e| Error::DataChannelError(format!("Failed to send: {}", e)))
    }
}
