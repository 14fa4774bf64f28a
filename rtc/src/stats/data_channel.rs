use std::time::SystemTime;

use crate::data_channel::internal::RTCDataChannelInternal;
use crate::data_channel::state::RTCDataChannelState;
use crate::data_channel::{RTCDataChannelHandle, RTCDataChannelId};
use crate::stats::{RTCStats, RTCStatsType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCDataChannelStats {
    pub stats: RTCStats,

    pub handle: RTCDataChannelHandle,
    pub label: String,
    pub protocol: String,
    pub data_channel_identifier: Option<RTCDataChannelId>,
    pub state: RTCDataChannelState,
    pub messages_sent: u32,
    pub bytes_sent: u64,
    pub messages_received: u32,
    pub bytes_received: u64,
}

impl RTCDataChannelStats {
    pub(crate) fn new(timestamp: SystemTime, dc: &RTCDataChannelInternal) -> Self {
        let (messages_sent, bytes_sent, messages_received, bytes_received) =
            match &dc.data_channel {
                Some(data_channel) => (
                    data_channel.messages_sent() as u32,
                    data_channel.bytes_sent() as u64,
                    data_channel.messages_received() as u32,
                    data_channel.bytes_received() as u64,
                ),
                None => (0, 0, 0, 0),
            };

        Self {
            stats: RTCStats::new(
                timestamp,
                RTCStatsType::DataChannel,
                format!("RTCDataChannel_{}", dc.handle),
            ),
            handle: dc.handle,
            label: dc.label.clone(),
            protocol: dc.protocol.clone(),
            data_channel_identifier: dc.id,
            state: dc.ready_state(),
            messages_sent,
            bytes_sent,
            messages_received,
            bytes_received,
        }
    }
}
