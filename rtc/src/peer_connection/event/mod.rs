use std::collections::VecDeque;
use std::sync::Mutex;

use crate::peer_connection::event::data_channel_event::RTCDataChannelEvent;
use crate::peer_connection::event::ice_event::RTCIceCandidateEvent;
use crate::peer_connection::state::ice_connection_state::RTCIceConnectionState;
use crate::peer_connection::state::ice_gathering_state::RTCIceGatheringState;
use crate::peer_connection::state::peer_connection_state::RTCPeerConnectionState;
use crate::peer_connection::state::signaling_state::RTCSignalingState;
use crate::rtp_transceiver::RTCRtpTransceiverId;

pub mod data_channel_event;
pub mod ice_event;
pub mod transport_event;

pub use transport_event::RTCTransportEvent;

/// RTCPeerConnectionEvent is what a peer connection tells the application.
///
/// Events are produced while a task runs and delivered on the operation
/// thread once the task released the connection state, so a handler may
/// call back into the peer connection.
#[allow(clippy::enum_variant_names)]
#[derive(Default, Debug, Clone, PartialEq)]
pub enum RTCPeerConnectionEvent {
    #[default]
    OnNegotiationNeededEvent,
    OnIceCandidateEvent(RTCIceCandidateEvent),
    OnSignalingStateChangeEvent(RTCSignalingState),
    OnIceConnectionStateChangeEvent(RTCIceConnectionState),
    OnIceGatheringStateChangeEvent(RTCIceGatheringState),
    OnConnectionStateChangeEvent(RTCPeerConnectionState),

    // The Peer-to-peer data API extends the RTCPeerConnection interface as described below.
    OnDataChannel(RTCDataChannelEvent),

    // The RTP media API extends the RTCPeerConnection interface as described below.
    OnTransceiverAdded(RTCRtpTransceiverId),
}

pub type RTCPeerConnectionEventHandler = Box<dyn FnMut(RTCPeerConnectionEvent) + Send>;

/// EventDispatcher hands events to the registered handler, or keeps them
/// for `poll_event` while there is none.
#[derive(Default)]
pub(crate) struct EventDispatcher {
    handler: Mutex<Option<RTCPeerConnectionEventHandler>>,
    buffered: Mutex<VecDeque<RTCPeerConnectionEvent>>,
}

impl EventDispatcher {
    pub(crate) fn set_handler(&self, handler: Option<RTCPeerConnectionEventHandler>) {
        let mut guard = match self.handler.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = handler;
    }

    pub(crate) fn dispatch(&self, events: Vec<RTCPeerConnectionEvent>) {
        if events.is_empty() {
            return;
        }

        let mut handler = match self.handler.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handler) = handler.as_mut() {
            for event in events {
                handler(event);
            }
        } else {
            drop(handler);
            let mut buffered = match self.buffered.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            buffered.extend(events);
        }
    }

    pub(crate) fn poll(&self) -> Option<RTCPeerConnectionEvent> {
        let mut buffered = match self.buffered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buffered.pop_front()
    }
}
