use std::time::SystemTime;

use crate::peer_connection::transport::bin::RTCReceiveState;
use crate::peer_connection::transport::dtls::role::RTCDtlsRole;
use crate::peer_connection::transport::dtls::state::RTCDtlsTransportState;
use crate::peer_connection::transport::ice::state::RTCIceTransportState;
use crate::peer_connection::transport::stream::RTCTransportStream;
use crate::stats::{RTCStats, RTCStatsId, RTCStatsType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCTransportStats {
    pub stats: RTCStats,

    pub session_id: u32,
    pub ice_state: RTCIceTransportState,
    /// RTCP component state, absent under rtcp-mux
    pub rtcp_ice_state: Option<RTCIceTransportState>,
    pub dtls_state: RTCDtlsTransportState,
    pub dtls_role: RTCDtlsRole,
    pub rtcp_mux: bool,
    pub srtp_key_set: bool,
    /// outgoing RTP is held back until ICE connects and keys are derived
    pub rtp_send_blocked: bool,
    pub rtcp_send_blocked: bool,
    /// what happens to an incoming packet right now
    pub receive_state: RTCReceiveState,
}

pub(crate) fn transport_stats_id(session_id: u32) -> RTCStatsId {
    format!("RTCTransport_{session_id}")
}

impl RTCTransportStats {
    pub(crate) fn new(timestamp: SystemTime, stream: &RTCTransportStream) -> Self {
        Self {
            stats: RTCStats::new(
                timestamp,
                RTCStatsType::Transport,
                transport_stats_id(stream.session_id),
            ),
            session_id: stream.session_id,
            ice_state: stream.rtp_ice.state,
            rtcp_ice_state: if stream.rtcp_mux {
                None
            } else {
                Some(stream.rtcp_ice.state)
            },
            dtls_state: stream.rtp_dtls.state(),
            dtls_role: stream.rtp_dtls.role(),
            rtcp_mux: stream.rtcp_mux,
            srtp_key_set: stream.rtp_dtls.key_set(),
            rtp_send_blocked: stream.send_bin.rtp_blocked(),
            rtcp_send_blocked: stream.send_bin.rtcp_blocked(),
            receive_state: stream.receive_bin.effective_state(),
        }
    }
}
