use std::time::SystemTime;

use crate::rtp_transceiver::codec::{RtpCodecKind, SSRC};
use crate::rtp_transceiver::direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverId};
use crate::stats::transport::transport_stats_id;
use crate::stats::{RTCStats, RTCStatsId, RTCStatsType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCTransceiverStats {
    pub stats: RTCStats,

    pub transceiver_id: RTCRtpTransceiverId,
    pub kind: RtpCodecKind,
    pub mid: Option<String>,
    pub direction: RTCRtpTransceiverDirection,
    pub current_direction: RTCRtpTransceiverDirection,
    pub ssrc: SSRC,
    pub rtx_ssrc: Option<SSRC>,
    pub remote_ssrcs: Vec<SSRC>,
    pub stopped: bool,
    pub transport_id: Option<RTCStatsId>,
}

impl RTCTransceiverStats {
    pub(crate) fn new(timestamp: SystemTime, t: &RTCRtpTransceiver) -> Self {
        Self {
            stats: RTCStats::new(
                timestamp,
                RTCStatsType::Transceiver,
                format!("RTCTransceiver_{}", t.id),
            ),
            transceiver_id: t.id,
            kind: t.kind,
            mid: t.mid.clone(),
            direction: t.direction,
            current_direction: t.current_direction,
            ssrc: t.ssrc,
            rtx_ssrc: t.rtx_ssrc,
            remote_ssrcs: t.remote_ssrcs.clone(),
            stopped: t.stopped,
            transport_id: t.session_id.map(transport_stats_id),
        }
    }
}
