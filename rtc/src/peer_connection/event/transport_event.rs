use bytes::BytesMut;
use datachannel::payload::PayloadProtocolIdentifier;

use crate::peer_connection::state::ice_gathering_state::RTCIceGatheringState;
use crate::peer_connection::transport::dtls::state::RTCDtlsTransportState;
use crate::peer_connection::transport::ice::RTCIceComponent;
use crate::peer_connection::transport::ice::state::RTCIceTransportState;

/// RTCTransportEvent is a notification from the ICE, DTLS or SCTP layer.
///
/// Collaborators post them through
/// [`RTCTransportEventSender`](crate::peer_connection::RTCTransportEventSender);
/// each one is applied as a task on the operation queue, ordered with the
/// application's own calls.
#[derive(Debug, Clone, PartialEq)]
pub enum RTCTransportEvent {
    // ICE
    OnCandidate {
        session_id: u32,
        candidate: String,
    },
    OnConnectionStateChange {
        session_id: u32,
        component: RTCIceComponent,
        state: RTCIceTransportState,
    },
    OnGatheringStateChange {
        session_id: u32,
        component: RTCIceComponent,
        state: RTCIceGatheringState,
    },

    // DTLS
    OnDtlsStateChange {
        session_id: u32,
        component: RTCIceComponent,
        state: RTCDtlsTransportState,
    },
    OnKeySet {
        session_id: u32,
        component: RTCIceComponent,
    },
    OnDtlsRoleChange {
        session_id: u32,
        component: RTCIceComponent,
        is_client: bool,
    },
    OnRemoteCertificate {
        session_id: u32,
        component: RTCIceComponent,
        der: Vec<u8>,
    },

    // SCTP
    OnAssociationEstablished,
    OnAssociationClosed,
    OnStreamReset {
        stream_id: u16,
    },
    OnMessage {
        stream_id: u16,
        ppi: PayloadProtocolIdentifier,
        payload: BytesMut,
    },
    /// `bytes` of user data on `stream_id` left the SCTP send buffer
    OnSendComplete {
        stream_id: u16,
        bytes: usize,
    },
}
