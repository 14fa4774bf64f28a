use std::time::SystemTime;

use crate::peer_connection::state::signaling_state::RTCSignalingState;
use crate::stats::{RTCStats, RTCStatsType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCPeerConnectionStats {
    pub stats: RTCStats,

    pub data_channels_opened: u32,
    pub data_channels_closed: u32,
    pub signaling_state: String,
}

impl RTCPeerConnectionStats {
    pub(crate) fn new(
        timestamp: SystemTime,
        data_channels_opened: u32,
        data_channels_closed: u32,
        signaling_state: RTCSignalingState,
    ) -> Self {
        Self {
            stats: RTCStats::new(
                timestamp,
                RTCStatsType::PeerConnection,
                "RTCPeerConnection".to_owned(),
            ),
            data_channels_opened,
            data_channels_closed,
            signaling_state: signaling_state.to_string(),
        }
    }
}
